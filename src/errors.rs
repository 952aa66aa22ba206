// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Per-node failures never show up here: collaborators return
//! `anyhow::Result` and the phase runner turns those into a [`Reason`].
//! The variants below are the conditions that stop a whole run.
//!
//! [`Reason`]: crate::types::Reason

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NightcheckError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Misformed node selection: {0}")]
    MisformedRange(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Lease query failed: {0}")]
    LeaseQuery(String),

    #[error("Phase '{phase}' aborted: {excluded} node(s) failed in a non tolerant phase")]
    PhaseAborted { phase: String, excluded: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NightcheckError>;
