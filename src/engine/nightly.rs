// src/engine/nightly.rs

//! Run controller: lease check, image lookup, phases, report, mail,
//! final power-off.

use chrono::Local;
use tracing::{info, warn};

use crate::config::{ConfigFile, ImageSpec, MailSection, Timeouts};
use crate::engine::lease::LeaseGuard;
use crate::engine::phase::{PipelineOptions, build_pipeline, checked_images};
use crate::engine::runner::{PhaseRunner, PhaseSummary, RunnerSettings};
use crate::errors::Result;
use crate::exec::Collaborators;
use crate::fs::{ImageRepo, ResolvedImage};
use crate::nodes::{NodeNaming, NodePool, NodeRef, Selection};
use crate::report::{Report, mail};
use crate::types::{LeaseOwner, NodeFailurePolicy};

/// Everything a run needs from the configuration and the command line.
#[derive(Debug, Clone)]
pub struct NightlySettings {
    /// Display name used in the mail subject.
    pub testbed: String,
    pub resource: String,
    pub principal: String,
    pub naming: NodeNaming,
    pub timeouts: Timeouts,
    pub runner: RunnerSettings,
    pub images: Vec<ImageSpec>,
    pub mail: MailSection,
    pub options: PipelineOptions,
}

impl NightlySettings {
    pub fn from_config(cfg: &ConfigFile, options: PipelineOptions) -> Self {
        Self {
            testbed: cfg.testbed.name.clone(),
            resource: cfg.testbed.resource.clone(),
            principal: cfg.testbed.principal.clone(),
            naming: NodeNaming::new(&cfg.testbed.control_prefix, &cfg.testbed.ssh_prefix),
            timeouts: cfg.timeouts,
            runner: RunnerSettings::from_config(cfg),
            images: cfg.images.clone(),
            mail: cfg.mail.clone(),
            options,
        }
    }

    /// Recipients of the summary mail: developers only in dry mode.
    pub fn recipients(&self) -> &[String] {
        if self.options.dry_run {
            &self.mail.dev_to
        } else {
            &self.mail.to
        }
    }
}

/// A run that went through its phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub report: Report,
    pub phases: Vec<PhaseSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The testbed is leased by another principal; nothing was touched.
    NotOwner { principal: String },
    /// No lease is active; nodes were switched off (unless dry).
    NoLease,
    Completed(RunSummary),
}

impl RunOutcome {
    /// Overall run status under `policy`.
    pub fn success(&self, policy: NodeFailurePolicy) -> bool {
        match self {
            RunOutcome::NotOwner { .. } | RunOutcome::NoLease => true,
            RunOutcome::Completed(summary) => match policy {
                NodeFailurePolicy::Succeed => true,
                NodeFailurePolicy::Fail => summary.report.all_clear(),
            },
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            RunOutcome::Completed(summary) => Some(&summary.report),
            _ => None,
        }
    }
}

/// One nightly run over a node selection.
pub struct Nightly {
    pool: NodePool,
    settings: NightlySettings,
    backends: Collaborators,
    images: ImageRepo,
}

impl Nightly {
    pub fn new(
        selection: Selection,
        settings: NightlySettings,
        backends: Collaborators,
        images: ImageRepo,
    ) -> Self {
        let pool = NodePool::new(selection, settings.naming.clone());
        Self {
            pool,
            settings,
            backends,
            images,
        }
    }

    pub fn settings(&self) -> &NightlySettings {
        &self.settings
    }

    pub async fn run(mut self) -> Result<RunOutcome> {
        info!(
            nodes = self.pool.original().len(),
            dry_run = self.settings.options.dry_run,
            speedy = self.settings.options.speedy,
            "nightly run starting"
        );

        let lease = LeaseGuard::new(
            self.backends.lease.clone(),
            &self.settings.resource,
            &self.settings.principal,
        );
        match lease.current_owner().await? {
            LeaseOwner::Other(principal) => {
                info!(%principal, "testbed leased by someone else; leaving it alone");
                return Ok(RunOutcome::NotOwner { principal });
            }
            LeaseOwner::Nobody => {
                info!("no active lease; switching the selection off");
                self.final_power_off(&self.pool.original_nodes()).await;
                return Ok(RunOutcome::NoLease);
            }
            LeaseOwner::Us => {}
        }

        let options = self.settings.options;
        let checked = checked_images(&self.settings.images, options);
        // Dry runs load nothing, so image artifacts need not exist.
        let images = if options.dry_run {
            checked.iter().map(ResolvedImage::unlocated).collect()
        } else {
            self.images.resolve_all(checked)?
        };
        let phases = build_pipeline(&images, &self.settings.timeouts, options);

        let runner = PhaseRunner::new(self.backends.clone(), self.settings.runner);
        let mut summaries = Vec::with_capacity(phases.len());
        for phase in &phases {
            summaries.push(runner.run_phase(&mut self.pool, phase).await?);
        }

        let report = Report::build(self.pool.original(), self.pool.failures());
        info!(
            nodes = report.node_count(),
            issues = report.issue_count(),
            "nightly run complete"
        );

        self.send_report(&report).await;
        self.final_power_off(&self.pool.original_nodes()).await;

        Ok(RunOutcome::Completed(RunSummary {
            report,
            phases: summaries,
        }))
    }

    async fn send_report(&self, report: &Report) {
        let recipients = self.settings.recipients();
        if recipients.is_empty() {
            warn!("no mail recipient configured for this mode; report not sent");
            return;
        }

        let message = mail::compose(
            &self.settings.testbed,
            report,
            &self.settings.mail.from,
            recipients,
            Local::now().date_naive(),
        );
        match self.backends.mail.send(&message).await {
            Ok(()) => info!(subject = %message.subject, to = ?message.to, "report mailed"),
            Err(e) => warn!(error = %format!("{e:#}"), "could not send the report"),
        }
    }

    async fn final_power_off(&self, nodes: &[NodeRef]) {
        if self.settings.options.dry_run {
            info!("dry run; final power-off skipped");
            return;
        }
        match self.backends.power.power_off_all(nodes).await {
            Ok(()) => info!(nodes = nodes.len(), "nodes switched off"),
            Err(e) => warn!(error = %format!("{e:#}"), "final power-off failed"),
        }
    }
}
