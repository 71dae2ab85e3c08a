//! Building a coordinator from configuration.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fs2::FileExt;
use fm_core::{Coordinator, Gating, Meter, Period};
use fm_db::{Database, DbStore};

use crate::Config;
use crate::source::Source;

/// The coordinator type the CLI drives.
pub type FmCoordinator = Coordinator<Source, DbStore>;

/// Exclusive lock serializing updates of one instance across processes.
///
/// Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Takes the lock without waiting.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create lock file {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            bail!(
                "another fm process is updating this instance (lock held on {})",
                path.display()
            );
        }
        tracing::debug!(path = %path.display(), "acquired instance lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release lock");
        }
    }
}

/// A restored coordinator together with the lock that guards it.
pub struct Instance {
    pub coordinator: FmCoordinator,
    pub timezone: Tz,
    _lock: InstanceLock,
}

impl Instance {
    /// Locks the instance, builds every meter and restores persisted state.
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            fs::create_dir_all(parent).context("failed to create database directory")?;
        }
        let lock = InstanceLock::acquire(&config.lock_path())?;

        let timezone = config.tz()?;
        let now = now_in(timezone);
        let meters = build_meters(config, now)?;

        let db = Database::open(&config.database_path).with_context(|| {
            format!("failed to open {}", config.database_path.display())
        })?;
        let store = DbStore::new(db, config.name.clone());
        let gating = Gating {
            condition: config.condition,
            time_window: config.window()?,
        };
        let mut coordinator = Coordinator::new(
            config.name.clone(),
            meters,
            Source::from(&config.source),
            store,
            gating,
        )
        .context("invalid meter configuration")?;
        coordinator.init(now);

        Ok(Self {
            coordinator,
            timezone,
            _lock: lock,
        })
    }

    pub fn now(&self) -> DateTime<Tz> {
        now_in(self.timezone)
    }
}

pub fn now_in(timezone: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&timezone)
}

/// Builds the configured meters; names are prefixed with the instance name.
pub fn build_meters(config: &Config, now: DateTime<Tz>) -> Result<Vec<Meter>> {
    if config.meters.is_empty() {
        bail!("no meters configured");
    }
    config
        .meters
        .iter()
        .map(|meter| {
            let period = Period::new(meter.recurrence()?, now, meter.duration())
                .with_context(|| format!("meter '{}'", meter.name))?;
            Ok(Meter::new(meter.qualified_name(&config.name), period))
        })
        .collect()
}
