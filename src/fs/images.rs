// src/fs/images.rs

//! Locating image artifacts on the local image repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::ImageSpec;
use crate::errors::{NightcheckError, Result};
use crate::fs::FileSystem;

/// An image to check, with its artifact located on disk.
///
/// `path` is `None` for images that are only checked, never loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub name: String,
    pub path: Option<PathBuf>,
    pub markers: Vec<String>,
}

impl ResolvedImage {
    /// An image whose artifact is not looked up.
    pub fn unlocated(spec: &ImageSpec) -> Self {
        Self {
            name: spec.name.clone(),
            path: None,
            markers: spec.markers.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageRepo {
    fs: Arc<dyn FileSystem>,
    search_path: Vec<PathBuf>,
}

impl ImageRepo {
    pub fn new(fs: Arc<dyn FileSystem>, search_path: Vec<PathBuf>) -> Self {
        Self { fs, search_path }
    }

    /// First of `<dir>/<name>` or `<dir>/<name>.ndz` found along the search
    /// path.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let candidates = [name.to_string(), format!("{name}.ndz")];
        for dir in &self.search_path {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if self.fs.is_file(&path) {
                    debug!(image = %name, path = %path.display(), "image located");
                    return Some(self.fs.canonicalize(&path).unwrap_or(path));
                }
            }
        }
        None
    }

    /// Locate every image, failing on the first one that is missing.
    pub fn resolve_all(&self, images: &[ImageSpec]) -> Result<Vec<ResolvedImage>> {
        images
            .iter()
            .map(|spec| {
                let path = self.locate(&spec.name).ok_or_else(|| {
                    NightcheckError::ImageNotFound(format!(
                        "'{}' not found in {}; available: [{}]",
                        spec.name,
                        self.search_path_display(),
                        self.available().join(", ")
                    ))
                })?;
                Ok(ResolvedImage {
                    name: spec.name.clone(),
                    path: Some(path),
                    markers: spec.markers.clone(),
                })
            })
            .collect()
    }

    /// Image names found along the search path, for diagnostics.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .search_path
            .iter()
            .filter(|dir| self.fs.is_dir(dir))
            .filter_map(|dir| self.fs.read_dir(dir).ok())
            .flatten()
            .filter(|p| self.fs.is_file(p))
            .filter_map(|p| file_stem(&p))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn search_path_display(&self) -> String {
        self.search_path
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn file_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    Some(name.strip_suffix(".ndz").unwrap_or(name).to_string())
}
