// src/exec/backend.rs

//! Pluggable collaborator abstraction.
//!
//! The nightly engine never talks to the testbed directly; it goes through
//! the traits below. Production code uses the command-backed implementation
//! in [`shell`]; tests provide scripted fakes that record calls and can fail
//! or hang on chosen nodes.
//!
//! All operations return `anyhow::Result`: the engine only cares whether an
//! operation succeeded, and classifies anything else per phase.
//!
//! [`shell`]: super::shell

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::nodes::NodeRef;
use crate::report::MailMessage;
use crate::types::{NodeId, PowerMode};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A lease as returned by the reservation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub principal: String,
    pub window: Option<LeaseWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl fmt::Display for LeaseWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Reservation service.
pub trait LeaseService: Send + Sync {
    /// The lease active right now on `resource`, if any.
    fn active_lease<'a>(&'a self, resource: &'a str) -> BoxFuture<'a, anyhow::Result<Option<Lease>>>;
}

/// Node power control.
pub trait PowerControl: Send + Sync {
    /// Send `mode` to the node, wait `check_delay`, then check the node is in
    /// the expected power state. A failed check is an error.
    fn send_action<'a>(
        &'a self,
        node: &'a NodeRef,
        mode: PowerMode,
        check_delay: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Switch every given node off, without checking.
    fn power_off_all<'a>(&'a self, nodes: &'a [NodeRef]) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// OS image deployment service (multicast loader).
pub trait ImageDeployer: Send + Sync {
    /// Load `image` on all `nodes` at once; returns one result per node.
    /// Nodes missing from the returned list are considered not done.
    fn load<'a>(
        &'a self,
        nodes: &'a [NodeRef],
        image: &'a Path,
        bandwidth: u32,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<Vec<(NodeId, anyhow::Result<()>)>>>;
}

/// Ssh reachability probe.
pub trait ReachabilityProbe: Send + Sync {
    /// Resolve once the node answers over ssh; retry every `backoff`, give up
    /// with an error after `timeout`.
    fn wait_for<'a>(
        &'a self,
        node: &'a NodeRef,
        backoff: Duration,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Remote command execution on a node.
pub trait RemoteCommand: Send + Sync {
    /// Run `command` on the node and return its exit status.
    fn run<'a>(&'a self, node: &'a NodeRef, command: &'a str) -> BoxFuture<'a, anyhow::Result<i32>>;
}

/// Status dashboard publishing.
pub trait StatusPublisher: Send + Sync {
    fn set_attribute<'a>(
        &'a self,
        node: NodeId,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Outgoing mail.
pub trait MailTransport: Send + Sync {
    fn send<'a>(&'a self, message: &'a MailMessage) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// All external collaborators of a run, shareable across spawned tasks.
#[derive(Clone)]
pub struct Collaborators {
    pub lease: Arc<dyn LeaseService>,
    pub power: Arc<dyn PowerControl>,
    pub deployer: Arc<dyn ImageDeployer>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub remote: Arc<dyn RemoteCommand>,
    pub status: Arc<dyn StatusPublisher>,
    pub mail: Arc<dyn MailTransport>,
}

impl Collaborators {
    /// Use a single object implementing every collaborator trait.
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: LeaseService
            + PowerControl
            + ImageDeployer
            + ReachabilityProbe
            + RemoteCommand
            + StatusPublisher
            + MailTransport
            + 'static,
    {
        Self {
            lease: backend.clone(),
            power: backend.clone(),
            deployer: backend.clone(),
            probe: backend.clone(),
            remote: backend.clone(),
            status: backend.clone(),
            mail: backend,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
