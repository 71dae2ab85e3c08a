use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fm_cli::commands::{condition, periods, run, status, tick};
use fm_cli::instance::Instance;
use fm_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Open the database for reporting, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<fm_db::Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    fm_db::Database::open(&config.database_path).context("failed to open database")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Run) => {
            let config = load_config(cli.config.as_deref())?;
            let mut instance = Instance::open(&config)?;
            run::run(
                &mut stdout,
                &mut instance,
                Duration::from_secs(config.heartbeat_secs.max(1)),
                config.condition,
            )?;
        }
        Some(Commands::Tick) => {
            let config = load_config(cli.config.as_deref())?;
            let mut instance = Instance::open(&config)?;
            let now = instance.now();
            tick::run(&mut stdout, &mut instance.coordinator, now)?;
        }
        Some(Commands::Condition { value }) => {
            let config = load_config(cli.config.as_deref())?;
            if !config.condition {
                bail!("instance '{}' has no condition configured", config.name);
            }
            let mut instance = Instance::open(&config)?;
            let now = instance.now();
            condition::run(&mut stdout, &mut instance.coordinator, now, value)?;
        }
        Some(Commands::Status { json }) => {
            let config = load_config(cli.config.as_deref())?;
            let db = open_database(&config)?;
            status::run(&mut stdout, &db, &config.name, config.tz()?, *json)?;
        }
        Some(Commands::Periods) => {
            periods::run(&mut stdout)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
