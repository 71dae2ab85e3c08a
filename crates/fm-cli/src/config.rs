//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Duration;
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use fm_core::{Recurrence, TimeWindow};
use serde::{Deserialize, Serialize};

const DEFAULT_HEARTBEAT_SECS: u64 = 60;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instance name; also the key the state is stored under.
    pub name: String,
    /// Path to the database file.
    pub database_path: PathBuf,
    /// IANA timezone periods are evaluated in.
    pub timezone: String,
    pub heartbeat_secs: u64,
    /// Whether condition results are pushed to this instance.
    pub condition: bool,
    pub source: SourceConfig,
    pub time_window: Option<TimeWindowConfig>,
    pub meters: Vec<MeterConfig>,
}

/// Where readings come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Elapsed time in seconds.
    Time,
    /// First line of a file.
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowConfig {
    /// Weekday indices, 0 = Monday.
    pub days: Vec<u8>,
    pub from: String,
    pub till: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterConfig {
    pub name: String,
    /// Cron pattern for period starts.
    #[serde(default)]
    pub cron: Option<String>,
    /// Predefined period name, used instead of `cron`.
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub duration: Option<DurationConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationConfig {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("database_path", &self.database_path)
            .field("timezone", &self.timezone)
            .field("meters", &self.meters.len())
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            name: "default".to_string(),
            database_path: data_dir.join("fm.db"),
            timezone: iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string()),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            condition: false,
            source: SourceConfig::Time,
            time_window: None,
            meters: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (FM_*)
        figment = figment.merge(Env::prefixed("FM_"));

        figment.extract()
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|err| anyhow!("unknown timezone '{}': {err}", self.timezone))
    }

    pub fn window(&self) -> Result<Option<TimeWindow>> {
        self.time_window
            .as_ref()
            .map(|window| {
                TimeWindow::parse(&window.days, &window.from, &window.till)
                    .context("invalid time_window")
            })
            .transpose()
    }

    /// Lock file guarding updates of this instance.
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.database_path.clone().into_os_string();
        path.push(format!(".{}.lock", self.name));
        PathBuf::from(path)
    }
}

impl MeterConfig {
    /// Full meter name within an instance.
    pub fn qualified_name(&self, instance: &str) -> String {
        format!("{instance}_{}", self.name)
    }

    pub fn recurrence(&self) -> Result<Recurrence> {
        let recurrence = match (&self.cron, &self.period) {
            (Some(pattern), None) => Recurrence::parse(pattern),
            (None, Some(period)) => Recurrence::predefined(period),
            (Some(_), Some(_)) => bail!("meter '{}': set either cron or period, not both", self.name),
            (None, None) => bail!("meter '{}': cron or period is required", self.name),
        };
        recurrence.with_context(|| format!("meter '{}'", self.name))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration.as_ref().map(DurationConfig::to_duration)
    }
}

impl DurationConfig {
    pub fn to_duration(&self) -> Duration {
        Duration::days(self.days)
            + Duration::hours(self.hours)
            + Duration::minutes(self.minutes)
            + Duration::seconds(self.seconds)
    }
}

/// Returns the platform-specific config directory for fm.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("fm"))
}

/// Returns the platform-specific data directory for fm.
///
/// On Linux: `~/.local/share/fm`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("fm"))
}
