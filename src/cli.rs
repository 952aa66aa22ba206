// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `nightcheck`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nightcheck",
    version,
    about = "Nightly health check of a testbed: power cycle, reload and verify every node.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$NIGHTCHECK_CONFIG`, else `/etc/nightcheck/nightcheck.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NIGHTCHECK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Reduced run for testing: power on only, no image load, no final
    /// power-off, mail to developers only.
    #[arg(short, long, alias = "dry-run")]
    pub verbose: bool,

    /// Only check the first reference image.
    #[arg(short, long)]
    pub speedy: bool,

    /// Parse + validate, print the resolved run, but don't touch the testbed.
    #[arg(long)]
    pub print_config: bool,

    /// Nodes to check (`1-37`, `1,3,5-7`, `fit07`, `~4`).
    ///
    /// Default: `[testbed].nodes` from the config file.
    #[arg(value_name = "SELECTION")]
    pub selection: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
