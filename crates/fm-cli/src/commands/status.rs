//! Status command for showing the persisted meters of an instance.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fm_core::StoredState;
use fm_db::Database;
use serde_json::Value;

/// Prints what was last persisted for `name`.
///
/// Reads the database directly, so it works while `fm run` holds the lock.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    name: &str,
    timezone: Tz,
    json: bool,
) -> Result<()> {
    let data = db
        .load_state(name)
        .with_context(|| format!("failed to load state for {name}"))?;

    if json {
        let data = data.unwrap_or(Value::Null);
        writeln!(writer, "{}", serde_json::to_string_pretty(&data)?)?;
        return Ok(());
    }

    let Some(data) = data else {
        writeln!(writer, "No state recorded for {name}.")?;
        return Ok(());
    };
    let state = StoredState::from_value(data).context("stored state is malformed")?;

    writeln!(writer, "Instance: {name}")?;
    writeln!(writer, "Status: {}", state.status)?;
    if state.meters.is_empty() {
        writeln!(writer, "No meters recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Meters:")?;
    for (meter, snapshot) in &state.meters {
        let meter_state = snapshot.state.map_or("-", |state| state.as_str());
        let last_reset = snapshot
            .last_reset
            .and_then(|seconds| format_timestamp(seconds, timezone))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            writer,
            "- {meter}: {:.3} [{meter_state}] prev {:.3}, last reset {last_reset}",
            snapshot.measured_value, snapshot.prev_measured_value,
        )?;
    }

    Ok(())
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "rounded to whole seconds before conversion"
)]
fn format_timestamp(seconds: f64, timezone: Tz) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds.round() as i64, 0)
        .map(|at| at.with_timezone(&timezone).to_rfc3339())
}
