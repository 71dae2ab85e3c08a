//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Flexible measuring.
///
/// Accumulates a cumulative reading (elapsed time, an energy counter) over
/// recurring cron periods, optionally gated by a condition and a weekly
/// time window.
#[derive(Debug, Parser)]
#[command(name = "fm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Measure continuously until stdin closes or ctrl-c.
    ///
    /// Heartbeats fire on a timer. When a condition is configured, each
    /// stdin line is a condition result (on/off).
    Run,

    /// Process a single heartbeat and exit.
    Tick,

    /// Push one condition result (on/off, true/false, 1/0).
    Condition {
        /// The condition result.
        value: String,
    },

    /// Show the persisted meters.
    Status {
        /// Print the raw state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the predefined period names.
    Periods,
}
