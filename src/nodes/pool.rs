// src/nodes/pool.rs

//! The shrinking working set of a run and its exclusion state machine.
//!
//! Each node of the original selection is either `Active` or
//! `Excluded(reason)`. Exclusion is terminal: the first reason recorded for
//! a node is final, and an excluded node never comes back to `Active`.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::nodes::{NodeNaming, NodeRef, Selection};
use crate::types::{NodeId, Reason};

/// Per-node state within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Active,
    Excluded(Reason),
}

/// Result of [`NodePool::exclude`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// The node was active and is now excluded with the given reason.
    Excluded,
    /// The node had already been excluded; its recorded reason is kept.
    AlreadyExcluded(Reason),
    /// The node is not part of this run.
    Unknown,
}

/// Node id to failure reason. Entries are never overwritten nor removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureMap {
    entries: BTreeMap<NodeId, Reason>,
}

impl FailureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure unless one is already present; returns whether the
    /// entry was added.
    fn record(&mut self, id: NodeId, reason: Reason) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, reason);
        true
    }

    pub fn get(&self, id: NodeId) -> Option<Reason> {
        self.entries.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending node id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Reason)> + '_ {
        self.entries.iter().map(|(id, reason)| (*id, *reason))
    }
}

impl FromIterator<(NodeId, Reason)> for FailureMap {
    /// First occurrence of an id wins, like [`NodePool::exclude`].
    fn from_iter<T: IntoIterator<Item = (NodeId, Reason)>>(iter: T) -> Self {
        let mut map = FailureMap::new();
        for (id, reason) in iter {
            map.record(id, reason);
        }
        map
    }
}

/// Working set of nodes under test.
///
/// Keeps an immutable snapshot of the original selection for reporting, the
/// live selection that phases dispatch to, and the failure map.
#[derive(Debug, Clone)]
pub struct NodePool {
    original: Vec<NodeId>,
    active: Selection,
    failures: FailureMap,
    naming: NodeNaming,
}

impl NodePool {
    pub fn new(selection: Selection, naming: NodeNaming) -> Self {
        Self {
            original: selection.to_vec(),
            active: selection,
            failures: FailureMap::new(),
            naming,
        }
    }

    /// The selection the run started with, never modified.
    pub fn original(&self) -> &[NodeId] {
        &self.original
    }

    /// Nodes still participating in the run.
    pub fn active(&self) -> &Selection {
        &self.active
    }

    pub fn failures(&self) -> &FailureMap {
        &self.failures
    }

    pub fn naming(&self) -> &NodeNaming {
        &self.naming
    }

    pub fn state_of(&self, id: NodeId) -> Option<NodeState> {
        if let Some(reason) = self.failures.get(id) {
            return Some(NodeState::Excluded(reason));
        }
        if self.active.contains(id) {
            return Some(NodeState::Active);
        }
        None
    }

    /// Fresh `NodeRef`s for the currently active nodes.
    pub fn active_nodes(&self) -> Vec<NodeRef> {
        self.active
            .iter()
            .map(|id| NodeRef::new(id, &self.naming))
            .collect()
    }

    /// Fresh `NodeRef`s for the whole original selection (final power-off).
    pub fn original_nodes(&self) -> Vec<NodeRef> {
        self.original
            .iter()
            .map(|id| NodeRef::new(*id, &self.naming))
            .collect()
    }

    /// Move a node from `Active` to `Excluded(reason)`.
    ///
    /// Idempotent: excluding an already excluded node leaves its first
    /// reason in place and reports it back.
    pub fn exclude(&mut self, id: NodeId, reason: Reason) -> Exclusion {
        if let Some(first) = self.failures.get(id) {
            debug!(node = id, %first, ignored = %reason, "node already excluded");
            return Exclusion::AlreadyExcluded(first);
        }
        if !self.active.remove(id) {
            debug!(node = id, %reason, "exclude requested for a node outside this run");
            return Exclusion::Unknown;
        }

        self.failures.record(id, reason);
        info!(
            node = id,
            %reason,
            remaining = self.active.len(),
            "node excluded from the rest of the run"
        );
        Exclusion::Excluded
    }
}
