// src/exec/mod.rs

//! Access to the testbed.
//!
//! - [`backend`] defines the collaborator traits the engine depends on
//!   (lease, power, image loading, ssh, status dashboard, mail) and the
//!   `Collaborators` bundle handed to a run.
//! - [`process`] runs shell commands with `tokio::process::Command`.
//! - [`shell`] implements every collaborator by running configurable command
//!   templates; this is what the `nightcheck` binary uses.

pub mod backend;
pub mod process;
pub mod shell;

pub use backend::{
    BoxFuture, Collaborators, ImageDeployer, Lease, LeaseService, LeaseWindow, MailTransport,
    PowerControl, ReachabilityProbe, RemoteCommand, StatusPublisher,
};
pub use shell::ShellBackend;
