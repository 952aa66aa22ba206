// src/config/mod.rs

//! Configuration loading and validation for nightcheck.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and parse durations into a typed `ConfigFile` (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CommandsSection, ConfigFile, ImageSpec, MailSection, Networking, RawConfigFile, RunSection,
    TestbedSection, Timeouts,
};
