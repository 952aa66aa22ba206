// src/engine/classifier.rs

//! Failure classifier: per-node phase outcome to [`Reason`].
//!
//! Pure; the phase runner applies it to every collected outcome and
//! excludes the nodes it returns a reason for.

use crate::engine::phase::PhaseKind;
use crate::nodes::NodeOutcome;
use crate::types::Reason;

/// Reason for excluding a node after `kind`, or `None` if it stays active.
///
/// A deadline miss is treated exactly like an error. Image loading has no
/// reason of its own: a node that did not load is caught by the reachability
/// and marker phases that follow.
pub fn classify(kind: &PhaseKind, outcome: &NodeOutcome) -> Option<Reason> {
    if outcome.is_success() {
        return None;
    }

    match kind {
        PhaseKind::Power(mode) => Some(mode.failure_reason()),
        PhaseKind::LoadImage { .. } => None,
        PhaseKind::WaitReachable { .. } => Some(Reason::WontSsh),
        PhaseKind::CheckImage { .. } => match outcome {
            NodeOutcome::NonZero(_) => Some(Reason::DidNotLoad),
            _ => Some(Reason::CantCheckImage),
        },
    }
}
