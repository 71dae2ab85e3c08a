//! CLI subcommand implementations.

pub mod condition;
pub mod periods;
pub mod run;
pub mod status;
pub mod tick;
mod util;
