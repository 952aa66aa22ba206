// src/engine/runner.rs

//! Phase runner: fan an operation out to every active node, fan the results
//! back in under the phase deadline, classify, exclude.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::engine::classifier::classify;
use crate::engine::context::PhaseContext;
use crate::engine::phase::{Phase, PhaseKind};
use crate::errors::{NightcheckError, Result};
use crate::exec::Collaborators;
use crate::nodes::{Exclusion, NodeOutcome, NodePool};
use crate::types::{NodeId, Reason};

/// Status attribute flipped when a node is excluded.
const AVAILABLE_ATTRIBUTE: &str = "available";
const UNAVAILABLE_VALUE: &str = "ko";

/// Knobs handed to the per-node operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    pub bandwidth: u32,
    pub ssh_backoff: Duration,
    pub power_check_delay: Duration,
    /// Bound on the best-effort status notifications of one phase.
    pub status_timeout: Duration,
}

impl RunnerSettings {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            bandwidth: cfg.networking.bandwidth,
            ssh_backoff: cfg.networking.ssh_backoff,
            power_check_delay: cfg.timeouts.power_check_delay,
            status_timeout: cfg.timeouts.status,
        }
    }
}

/// What one phase did to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub phase: String,
    /// Nodes the operation was dispatched to.
    pub dispatched: Vec<NodeId>,
    /// Nodes excluded by this phase, with their reason.
    pub excluded: Vec<(NodeId, Reason)>,
}

impl PhaseSummary {
    fn skipped(phase: &Phase) -> Self {
        Self {
            phase: phase.name.clone(),
            dispatched: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Number of nodes still active once the phase is over.
    pub fn survivors(&self) -> usize {
        self.dispatched.len() - self.excluded.len()
    }
}

pub struct PhaseRunner {
    backends: Collaborators,
    settings: RunnerSettings,
}

impl PhaseRunner {
    pub fn new(backends: Collaborators, settings: RunnerSettings) -> Self {
        Self { backends, settings }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Run one phase against the pool's active nodes.
    ///
    /// Per-node failures never fail the phase: they exclude the node. The
    /// pool is only mutated once every outcome has been collected.
    pub async fn run_phase(&self, pool: &mut NodePool, phase: &Phase) -> Result<PhaseSummary> {
        let ctx = PhaseContext::open(pool);
        if ctx.is_empty() {
            info!(phase = %phase, "no active node left; phase skipped");
            return Ok(PhaseSummary::skipped(phase));
        }

        info!(
            phase = %phase,
            nodes = ctx.len(),
            deadline = ?phase.deadline,
            "phase started"
        );

        self.dispatch(&ctx, phase);
        let nodes = ctx.fan_in(phase.deadline).await;

        let dispatched: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let mut excluded = Vec::new();

        for node in &nodes {
            let Some(outcome) = node.outcome() else {
                continue;
            };
            match classify(&phase.kind, outcome) {
                None if outcome.is_success() => {
                    debug!(node = %node, phase = %phase, "ok");
                }
                None => {
                    warn!(node = %node, phase = %phase, ?outcome, "failure not held against the node");
                }
                Some(reason) => {
                    warn!(node = %node, phase = %phase, ?outcome, %reason, "node failed");
                    if pool.exclude(node.id, reason) == Exclusion::Excluded {
                        excluded.push((node.id, reason));
                    }
                }
            }
        }

        let newly_excluded: Vec<NodeId> = excluded.iter().map(|(id, _)| *id).collect();
        self.publish_unavailable(&newly_excluded).await;

        info!(
            phase = %phase,
            excluded = excluded.len(),
            remaining = pool.active().len(),
            "phase done"
        );

        if !phase.per_node && !excluded.is_empty() {
            return Err(NightcheckError::PhaseAborted {
                phase: phase.name.clone(),
                excluded: excluded.len(),
            });
        }

        Ok(PhaseSummary {
            phase: phase.name.clone(),
            dispatched,
            excluded,
        })
    }

    /// Spawn the phase operation for every node of `ctx`.
    ///
    /// Handles are dropped: an operation still running at the deadline is
    /// left to finish on its own and its report is discarded.
    fn dispatch(&self, ctx: &PhaseContext, phase: &Phase) {
        match &phase.kind {
            PhaseKind::Power(mode) => {
                for node in ctx.nodes() {
                    let power = Arc::clone(&self.backends.power);
                    let tx = ctx.sender();
                    let node = node.clone();
                    let mode = *mode;
                    let delay = self.settings.power_check_delay;
                    tokio::spawn(async move {
                        let result = power.send_action(&node, mode, delay).await;
                        tx.report(node.id, NodeOutcome::from_unit(result)).await;
                    });
                }
            }
            PhaseKind::LoadImage { image, path } => {
                // The loader is one multicast operation for the whole set.
                let deployer = Arc::clone(&self.backends.deployer);
                let tx = ctx.sender();
                let nodes = ctx.nodes().to_vec();
                let image = image.clone();
                let path = path.clone();
                let bandwidth = self.settings.bandwidth;
                let budget = phase.deadline;
                tokio::spawn(async move {
                    match deployer.load(&nodes, &path, bandwidth, budget).await {
                        Ok(results) => {
                            for (id, result) in results {
                                tx.report(id, NodeOutcome::from_unit(result)).await;
                            }
                        }
                        Err(e) => {
                            warn!(%image, error = %format!("{e:#}"), "image load failed");
                            let msg = format!("{e:#}");
                            for node in &nodes {
                                tx.report(node.id, NodeOutcome::Errored(msg.clone())).await;
                            }
                        }
                    }
                });
            }
            PhaseKind::WaitReachable { .. } => {
                for node in ctx.nodes() {
                    let probe = Arc::clone(&self.backends.probe);
                    let tx = ctx.sender();
                    let node = node.clone();
                    let backoff = self.settings.ssh_backoff;
                    let budget = phase.deadline;
                    tokio::spawn(async move {
                        let result = probe.wait_for(&node, backoff, budget).await;
                        tx.report(node.id, NodeOutcome::from_unit(result)).await;
                    });
                }
            }
            PhaseKind::CheckImage { command, .. } => {
                for node in ctx.nodes() {
                    let remote = Arc::clone(&self.backends.remote);
                    let tx = ctx.sender();
                    let node = node.clone();
                    let command = command.clone();
                    tokio::spawn(async move {
                        let result = remote.run(&node, &command).await;
                        tx.report(node.id, NodeOutcome::from_status(result)).await;
                    });
                }
            }
        }
    }

    /// Best-effort dashboard update for excluded nodes.
    ///
    /// Notifications run concurrently and share one status timeout; those
    /// still pending when it expires are left running in the background.
    async fn publish_unavailable(&self, ids: &[NodeId]) {
        if ids.is_empty() {
            return;
        }

        let mut notifications = JoinSet::new();
        for &id in ids {
            let status = Arc::clone(&self.backends.status);
            notifications.spawn(async move {
                let result = status
                    .set_attribute(id, AVAILABLE_ATTRIBUTE, UNAVAILABLE_VALUE)
                    .await;
                (id, result)
            });
        }

        let deadline = Instant::now() + self.settings.status_timeout;
        loop {
            match timeout_at(deadline, notifications.join_next()).await {
                Ok(None) => break,
                Ok(Some(Ok((id, Ok(()))))) => debug!(node = id, "status set to unavailable"),
                Ok(Some(Ok((id, Err(e))))) => {
                    warn!(node = id, error = %format!("{e:#}"), "status notification failed")
                }
                Ok(Some(Err(e))) => warn!(error = %e, "status notification task failed"),
                Err(_) => {
                    warn!(pending = notifications.len(), "status notifications timed out");
                    notifications.detach_all();
                    break;
                }
            }
        }
    }
}
