#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use nightcheck::config::{ConfigFile, ImageSpec, RawConfigFile};
use nightcheck::engine::{Nightly, NightlySettings, PipelineOptions};
use nightcheck::exec::Collaborators;
use nightcheck::fs::ImageRepo;
use nightcheck::fs::mock::MockFileSystem;
use nightcheck::nodes::Selection;
use nightcheck::types::NodeId;

use crate::fake_testbed::FakeTestbed;

/// Directory holding the images of [`ConfigFileBuilder`] configs.
pub const IMAGE_DIR: &str = "/images";

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with short timeouts, a single `u18` image and
/// `/images` as the search path.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.testbed.name = "testbed".to_string();
        config.testbed.principal = "nightly".to_string();
        config.testbed.nodes = "1-3".to_string();
        config.timeouts.power = "1s".to_string();
        config.timeouts.power_check_delay = "10ms".to_string();
        config.timeouts.load = "2s".to_string();
        config.timeouts.wait_ssh = "1s".to_string();
        config.timeouts.check_image = "1s".to_string();
        config.timeouts.status = "100ms".to_string();
        config.networking.ssh_backoff = "100ms".to_string();
        config.image = vec![ImageSpec::new("u18", &["ubuntu-18", "u18"])];
        config.images.search_path = vec![PathBuf::from(IMAGE_DIR)];
        config.mail.to = vec!["ops@example.org".to_string()];
        config.mail.dev_to = vec!["dev@example.org".to_string()];
        Self { config }
    }

    pub fn with_nodes(mut self, nodes: &str) -> Self {
        self.config.testbed.nodes = nodes.to_string();
        self
    }

    pub fn with_image(mut self, name: &str, markers: &[&str]) -> Self {
        self.config.image.push(ImageSpec::new(name, markers));
        self
    }

    pub fn with_images(mut self, images: Vec<ImageSpec>) -> Self {
        self.config.image = images;
        self
    }

    pub fn with_dev_to(mut self, dev_to: &[&str]) -> Self {
        self.config.mail.dev_to = dev_to.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Image repository where every image of `cfg` exists as `<name>.ndz`.
pub fn image_repo_for(cfg: &ConfigFile) -> ImageRepo {
    let fs = MockFileSystem::with_files(
        cfg.images
            .iter()
            .map(|image| format!("{IMAGE_DIR}/{}.ndz", image.name)),
    );
    ImageRepo::new(Arc::new(fs), cfg.image_search_path.clone())
}

/// Nightly run over `nodes`, backed by `testbed` and an image repository
/// holding every configured image.
pub fn nightly(
    cfg: &ConfigFile,
    nodes: &[NodeId],
    options: PipelineOptions,
    testbed: &Arc<FakeTestbed>,
) -> Nightly {
    let selection: Selection = nodes.iter().copied().collect();
    Nightly::new(
        selection,
        NightlySettings::from_config(cfg, options),
        Collaborators::from_shared(Arc::clone(testbed)),
        image_repo_for(cfg),
    )
}
