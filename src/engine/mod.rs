// src/engine/mod.rs

//! Nightly orchestration.
//!
//! - [`lease`]: may this run touch the testbed at all?
//! - [`phase`]: the ordered pipeline of fan-out / fan-in phases.
//! - [`classifier`]: pure mapping from a per-node outcome to a failure reason.
//! - [`context`]: the phase-scoped node set and result channel.
//! - [`runner`]: runs one phase against the node pool.
//! - [`nightly`]: the whole run, from lease check to final power-off.

pub mod classifier;
pub mod context;
pub mod lease;
pub mod nightly;
pub mod phase;
pub mod runner;

pub use classifier::classify;
pub use context::{OutcomeSender, PhaseContext};
pub use lease::{LeaseGuard, owner_of};
pub use nightly::{Nightly, NightlySettings, RunOutcome, RunSummary};
pub use phase::{Phase, PhaseKind, PipelineOptions, build_pipeline, checked_images, marker_check_command};
pub use runner::{PhaseRunner, PhaseSummary, RunnerSettings};
