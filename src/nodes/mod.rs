// src/nodes/mod.rs

//! Nodes under test.
//!
//! - [`selection`] is the ordered, shrink-only set of node ids.
//! - [`selector`] parses the selection syntax (`1-37`, `~4`, `fit07`).
//! - [`node`] holds the per-phase `NodeRef` and its outcome.
//! - [`pool`] is the working set of a run and its exclusion state machine.

pub mod node;
pub mod pool;
pub mod selection;
pub mod selector;

pub use node::{NodeNaming, NodeOutcome, NodeRef};
pub use pool::{Exclusion, FailureMap, NodePool, NodeState};
pub use selection::Selection;
pub use selector::parse_selection;
