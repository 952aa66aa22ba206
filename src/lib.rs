// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod nodes;
pub mod report;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate};
use crate::engine::{Nightly, NightlySettings, PipelineOptions, checked_images};
use crate::errors::Result;
use crate::exec::{Collaborators, ShellBackend};
use crate::fs::{ImageRepo, RealFileSystem};
use crate::nodes::{Selection, parse_selection};

/// High-level entry point used by `main.rs`; returns the run status.
///
/// This wires together:
/// - config loading
/// - node selection (command line over `[testbed].nodes`)
/// - the command-backed collaborators
/// - the image repository on the local filesystem
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = args
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    info!(config = %config_path.display(), "configuration loaded");

    let selection = select_nodes(&cfg, &args.selection)?;
    let options = PipelineOptions {
        dry_run: args.verbose,
        speedy: args.speedy,
    };
    let settings = NightlySettings::from_config(&cfg, options);

    if args.print_config {
        print_config(&cfg, &selection, &settings);
        return Ok(true);
    }

    let backends = Collaborators::from_shared(Arc::new(ShellBackend::new(cfg.commands.clone())));
    let images = ImageRepo::new(Arc::new(RealFileSystem), cfg.image_search_path.clone());

    let outcome = Nightly::new(selection, settings, backends, images).run().await?;
    let success = outcome.success(cfg.run.on_node_failure);
    debug!(?outcome, success, "run finished");
    Ok(success)
}

/// Command-line selection, defaulting to `[testbed].nodes`.
pub fn select_nodes(cfg: &ConfigFile, args: &[String]) -> Result<Selection> {
    let defaults = parse_selection(std::slice::from_ref(&cfg.testbed.nodes), None)?;
    parse_selection(args, Some(&defaults))
}

/// `--print-config` output: what a run would do, without doing it.
fn print_config(cfg: &ConfigFile, selection: &Selection, settings: &NightlySettings) {
    println!("nightcheck configuration");
    println!("  testbed = {} (resource {})", cfg.testbed.name, cfg.testbed.resource);
    println!("  principal = {}", cfg.testbed.principal);
    println!(
        "  nodes ({}) = {:?}",
        selection.len(),
        selection.to_vec()
    );
    println!(
        "  dry_run = {}, speedy = {}",
        settings.options.dry_run, settings.options.speedy
    );
    println!("  on_node_failure = {:?}", cfg.run.on_node_failure);
    println!();

    let t = &cfg.timeouts;
    println!("timeouts:");
    println!("  power = {:?} (check after {:?})", t.power, t.power_check_delay);
    println!("  load = {:?}", t.load);
    println!("  wait_ssh = {:?} (backoff {:?})", t.wait_ssh, cfg.networking.ssh_backoff);
    println!("  check_image = {:?}", t.check_image);
    println!("  status = {:?}", t.status);
    println!("  bandwidth = {} Mbps", cfg.networking.bandwidth);
    println!();

    let checked = checked_images(&cfg.images, settings.options);
    println!("images ({} of {}):", checked.len(), cfg.images.len());
    for image in checked {
        println!("  - {}", image.name);
        println!("      markers: {:?}", image.markers);
    }
    println!(
        "  search_path: {:?}",
        cfg.image_search_path
    );
    println!();

    println!("mail:");
    println!("  from = {}", cfg.mail.from);
    println!("  to = {:?}", settings.recipients());

    debug!("print-config complete (testbed untouched)");
}
