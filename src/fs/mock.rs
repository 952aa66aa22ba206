// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum MockEntry {
    File,
    Dir,
}

/// In-memory filesystem holding empty files and their parent directories.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; parent directories are created implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.entries.lock().unwrap();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            entries.insert(ancestor.to_path_buf(), MockEntry::Dir);
        }
        entries.insert(path, MockEntry::File);
    }

    pub fn with_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let fs = Self::new();
        for file in files {
            fs.add_file(file);
        }
        fs
    }
}

impl FileSystem for MockFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        let entries = self.entries.lock().unwrap();
        matches!(entries.get(path), Some(MockEntry::File))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let entries = self.entries.lock().unwrap();
        matches!(entries.get(path), Some(MockEntry::Dir))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_dir(path) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_create_parent_dirs() {
        let fs = MockFileSystem::with_files(["/images/a.ndz", "/images/sub/b.ndz"]);
        assert!(fs.is_file(Path::new("/images/a.ndz")));
        assert!(fs.is_dir(Path::new("/images")));
        assert!(fs.is_dir(Path::new("/images/sub")));
        assert!(!fs.is_file(Path::new("/images")));

        let listing = fs.read_dir(Path::new("/images")).unwrap();
        assert_eq!(
            listing,
            vec![PathBuf::from("/images/a.ndz"), PathBuf::from("/images/sub")]
        );
        assert!(fs.read_dir(Path::new("/nowhere")).is_err());
    }
}
