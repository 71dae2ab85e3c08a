//! Flexible measuring CLI library.
//!
//! This crate provides the CLI interface and the glue between configuration,
//! the SQLite store and the metering core.

mod cli;
pub mod commands;
mod config;
pub mod instance;
pub mod source;

pub use cli::{Cli, Commands};
pub use config::{Config, DurationConfig, MeterConfig, SourceConfig, TimeWindowConfig};
