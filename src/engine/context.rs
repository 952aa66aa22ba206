// src/engine/context.rs

//! Phase-scoped fan-out / fan-in state.
//!
//! A [`PhaseContext`] is opened at phase entry from the pool's live
//! selection and consumed by [`PhaseContext::fan_in`] at phase exit, so no
//! node list, channel or pending result survives from one phase to the next.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::nodes::{NodeOutcome, NodePool, NodeRef};
use crate::types::NodeId;

/// Handle given to each spawned per-node operation to report its outcome.
#[derive(Debug, Clone)]
pub struct OutcomeSender {
    tx: mpsc::Sender<(NodeId, NodeOutcome)>,
}

impl OutcomeSender {
    /// Report an outcome. After the fan-in has returned the receiver is gone
    /// and late reports are dropped.
    pub async fn report(&self, id: NodeId, outcome: NodeOutcome) {
        if self.tx.send((id, outcome)).await.is_err() {
            debug!(node = id, "late outcome dropped; phase already collected");
        }
    }
}

#[derive(Debug)]
pub struct PhaseContext {
    nodes: Vec<NodeRef>,
    tx: mpsc::Sender<(NodeId, NodeOutcome)>,
    rx: mpsc::Receiver<(NodeId, NodeOutcome)>,
}

impl PhaseContext {
    /// Fresh context over the currently active nodes.
    pub fn open(pool: &NodePool) -> Self {
        let nodes = pool.active_nodes();
        // One report per node: senders never wait for room.
        let (tx, rx) = mpsc::channel(nodes.len().max(1));
        Self { nodes, tx, rx }
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sender(&self) -> OutcomeSender {
        OutcomeSender {
            tx: self.tx.clone(),
        }
    }

    /// Collect one outcome per node until every node reported or `deadline`
    /// elapsed, whichever comes first.
    ///
    /// Nodes still pending at the deadline get [`NodeOutcome::TimedOut`].
    /// Nodes whose operation ended without reporting (all senders dropped)
    /// get [`NodeOutcome::Errored`]. Operations still running are not
    /// cancelled; their late reports are dropped with the receiver.
    pub async fn fan_in(self, deadline: Duration) -> Vec<NodeRef> {
        let PhaseContext {
            mut nodes,
            tx,
            mut rx,
        } = self;
        drop(tx);

        let deadline = Instant::now() + deadline;
        let mut pending = nodes.len();
        let mut timed_out = false;

        while pending > 0 {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some((id, outcome))) => {
                    match nodes
                        .iter_mut()
                        .find(|n| n.id == id && n.outcome().is_none())
                    {
                        Some(node) => {
                            node.set_outcome(outcome);
                            pending -= 1;
                        }
                        None => debug!(node = id, "unexpected or duplicate outcome ignored"),
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if pending > 0 {
            for node in nodes.iter_mut().filter(|n| n.outcome().is_none()) {
                if timed_out {
                    warn!(node = %node, "no outcome before the phase deadline");
                    node.set_outcome(NodeOutcome::TimedOut);
                } else {
                    warn!(node = %node, "operation ended without reporting an outcome");
                    node.set_outcome(NodeOutcome::Errored("no outcome reported".to_string()));
                }
            }
        }

        nodes
    }
}
