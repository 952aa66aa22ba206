use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;

use nightcheck::exec::{
    BoxFuture, ImageDeployer, Lease, LeaseService, MailTransport, PowerControl, ReachabilityProbe,
    RemoteCommand, StatusPublisher,
};
use nightcheck::nodes::NodeRef;
use nightcheck::report::MailMessage;
use nightcheck::types::{NodeId, PowerMode};

/// One collaborator call, as recorded by [`FakeTestbed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    LeaseQuery,
    Power { node: NodeId, mode: PowerMode },
    PowerOffAll(Vec<NodeId>),
    Load { nodes: Vec<NodeId>, image: PathBuf },
    WaitFor(NodeId),
    Remote { node: NodeId, command: String },
    SetAttribute { node: NodeId, key: String, value: String },
    Mail { to: Vec<String>, subject: String },
}

/// Scripted misbehaviour of one node for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misbehaviour {
    /// Return an error.
    Fail,
    /// Never complete.
    Hang,
}

#[derive(Debug, Clone)]
enum LeaseScript {
    Nobody,
    Held(String),
    Broken,
}

/// A fake testbed implementing every collaborator trait.
///
/// - records every call, in order
/// - succeeds by default: nodes power as asked, load, answer ssh, and
///   carry the right image (remote commands exit 0)
/// - misbehaves per node as scripted with the builder methods
pub struct FakeTestbed {
    lease: LeaseScript,
    power: HashMap<(NodeId, PowerMode), Misbehaviour>,
    load_failures: HashSet<NodeId>,
    load_hangs: bool,
    probe: HashMap<NodeId, Misbehaviour>,
    remote: HashMap<NodeId, Misbehaviour>,
    remote_status: HashMap<NodeId, i32>,
    status_fails: bool,
    status_hangs: bool,
    mail_fails: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeTestbed {
    /// Testbed leased to `principal`.
    pub fn leased_to(principal: &str) -> Self {
        Self::with_lease(LeaseScript::Held(principal.to_string()))
    }

    /// Testbed with no active lease.
    pub fn unleased() -> Self {
        Self::with_lease(LeaseScript::Nobody)
    }

    /// Testbed whose lease service is unreachable.
    pub fn broken_lease_service() -> Self {
        Self::with_lease(LeaseScript::Broken)
    }

    fn with_lease(lease: LeaseScript) -> Self {
        Self {
            lease,
            power: HashMap::new(),
            load_failures: HashSet::new(),
            load_hangs: false,
            probe: HashMap::new(),
            remote: HashMap::new(),
            remote_status: HashMap::new(),
            status_fails: false,
            status_hangs: false,
            mail_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn power(mut self, node: NodeId, mode: PowerMode, how: Misbehaviour) -> Self {
        self.power.insert((node, mode), how);
        self
    }

    pub fn load_fails(mut self, node: NodeId) -> Self {
        self.load_failures.insert(node);
        self
    }

    /// The whole multicast load never completes.
    pub fn load_hangs(mut self) -> Self {
        self.load_hangs = true;
        self
    }

    pub fn probe(mut self, node: NodeId, how: Misbehaviour) -> Self {
        self.probe.insert(node, how);
        self
    }

    pub fn remote(mut self, node: NodeId, how: Misbehaviour) -> Self {
        self.remote.insert(node, how);
        self
    }

    /// Exit status of the image marker check on `node`.
    pub fn remote_status(mut self, node: NodeId, status: i32) -> Self {
        self.remote_status.insert(node, status);
        self
    }

    pub fn status_fails(mut self) -> Self {
        self.status_fails = true;
        self
    }

    /// Status notifications are recorded, then never answer.
    pub fn status_hangs(mut self) -> Self {
        self.status_hangs = true;
        self
    }

    pub fn mail_fails(mut self) -> Self {
        self.mail_fails = true;
        self
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Nodes that received a power action of `mode`, sorted.
    pub fn power_calls(&self, mode: PowerMode) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Power { node, mode: m } if m == mode => Some(node),
                _ => None,
            })
            .collect();
        nodes.sort();
        nodes
    }

    /// Nodes probed for ssh reachability, sorted, duplicates kept.
    pub fn probed(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WaitFor(node) => Some(node),
                _ => None,
            })
            .collect();
        nodes.sort();
        nodes
    }

    /// Nodes a remote command ran on, sorted, duplicates kept.
    pub fn remote_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Remote { node, .. } => Some(node),
                _ => None,
            })
            .collect();
        nodes.sort();
        nodes
    }

    /// Node lists handed to the image loader, one entry per load.
    pub fn loads(&self) -> Vec<Vec<NodeId>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Load { nodes, .. } => Some(nodes),
                _ => None,
            })
            .collect()
    }

    pub fn mails(&self) -> Vec<(Vec<String>, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Mail { to, subject } => Some((to, subject)),
                _ => None,
            })
            .collect()
    }

    /// Node lists handed to the final power-off.
    pub fn off_all(&self) -> Vec<Vec<NodeId>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PowerOffAll(nodes) => Some(nodes),
                _ => None,
            })
            .collect()
    }

    /// Calls other than the lease query.
    pub fn touched(&self) -> bool {
        self.calls().iter().any(|c| *c != Call::LeaseQuery)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

async fn misbehave(how: Option<Misbehaviour>, what: &str) -> anyhow::Result<()> {
    match how {
        None => Ok(()),
        Some(Misbehaviour::Fail) => Err(anyhow!("{what} failed")),
        Some(Misbehaviour::Hang) => std::future::pending().await,
    }
}

impl LeaseService for FakeTestbed {
    fn active_lease<'a>(&'a self, _resource: &'a str) -> BoxFuture<'a, anyhow::Result<Option<Lease>>> {
        Box::pin(async move {
            self.record(Call::LeaseQuery);
            match &self.lease {
                LeaseScript::Nobody => Ok(None),
                LeaseScript::Held(principal) => Ok(Some(Lease {
                    principal: principal.clone(),
                    window: None,
                })),
                LeaseScript::Broken => Err(anyhow!("lease service unreachable")),
            }
        })
    }
}

impl PowerControl for FakeTestbed {
    fn send_action<'a>(
        &'a self,
        node: &'a NodeRef,
        mode: PowerMode,
        _check_delay: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(Call::Power { node: node.id, mode });
            misbehave(self.power.get(&(node.id, mode)).copied(), &format!("power {mode} on {node}"))
                .await
        })
    }

    fn power_off_all<'a>(&'a self, nodes: &'a [NodeRef]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(Call::PowerOffAll(nodes.iter().map(|n| n.id).collect()));
            Ok(())
        })
    }
}

impl ImageDeployer for FakeTestbed {
    fn load<'a>(
        &'a self,
        nodes: &'a [NodeRef],
        image: &'a Path,
        _bandwidth: u32,
        _timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<Vec<(NodeId, anyhow::Result<()>)>>> {
        Box::pin(async move {
            self.record(Call::Load {
                nodes: nodes.iter().map(|n| n.id).collect(),
                image: image.to_path_buf(),
            });
            if self.load_hangs {
                std::future::pending::<()>().await;
            }
            Ok(nodes
                .iter()
                .map(|n| {
                    let res = if self.load_failures.contains(&n.id) {
                        Err(anyhow!("{n} did not load"))
                    } else {
                        Ok(())
                    };
                    (n.id, res)
                })
                .collect())
        })
    }
}

impl ReachabilityProbe for FakeTestbed {
    fn wait_for<'a>(
        &'a self,
        node: &'a NodeRef,
        _backoff: Duration,
        _timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(Call::WaitFor(node.id));
            misbehave(self.probe.get(&node.id).copied(), &format!("ssh to {node}")).await
        })
    }
}

impl RemoteCommand for FakeTestbed {
    fn run<'a>(&'a self, node: &'a NodeRef, command: &'a str) -> BoxFuture<'a, anyhow::Result<i32>> {
        Box::pin(async move {
            self.record(Call::Remote {
                node: node.id,
                command: command.to_string(),
            });
            misbehave(self.remote.get(&node.id).copied(), &format!("ssh to {node}")).await?;
            Ok(self.remote_status.get(&node.id).copied().unwrap_or(0))
        })
    }
}

impl StatusPublisher for FakeTestbed {
    fn set_attribute<'a>(
        &'a self,
        node: NodeId,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(Call::SetAttribute {
                node,
                key: key.to_string(),
                value: value.to_string(),
            });
            if self.status_hangs {
                std::future::pending::<()>().await;
            }
            if self.status_fails {
                return Err(anyhow!("status dashboard unavailable"));
            }
            Ok(())
        })
    }
}

impl MailTransport for FakeTestbed {
    fn send<'a>(&'a self, message: &'a MailMessage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(Call::Mail {
                to: message.to.clone(),
                subject: message.subject.clone(),
            });
            if self.mail_fails {
                return Err(anyhow!("smtp relay refused the message"));
            }
            Ok(())
        })
    }
}
