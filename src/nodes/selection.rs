// src/nodes/selection.rs

use std::collections::BTreeSet;

use crate::types::NodeId;

/// Ordered, de-duplicated set of node ids.
///
/// Once built, the only way to change a selection is [`Selection::remove`]:
/// the working set of a run can shrink, never grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<NodeId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a node; returns `false` if it was not selected.
    pub fn remove(&mut self, id: NodeId) -> bool {
        self.ids.remove(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<NodeId> {
        self.iter().collect()
    }
}

impl FromIterator<NodeId> for Selection {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
