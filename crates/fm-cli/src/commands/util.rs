//! Shared output helpers for CLI commands.

use std::io::Write;

use anyhow::Result;
use fm_core::{Coordinator, Meter, StateStore, UpdateOutcome, ValueSource};

/// Writes one line per meter.
pub fn write_meters<W, V, S>(writer: &mut W, coordinator: &Coordinator<V, S>) -> Result<()>
where
    W: Write,
    V: ValueSource,
    S: StateStore,
{
    for meter in coordinator.meters() {
        write_meter(writer, meter)?;
    }
    Ok(())
}

fn write_meter<W: Write>(writer: &mut W, meter: &Meter) -> Result<()> {
    let state = meter.state().map_or("-", |state| state.as_str());
    writeln!(
        writer,
        "{}: {:.3} [{}] prev {:.3}, next reset {}",
        meter.name(),
        meter.measured_value(),
        state,
        meter.prev_measured_value(),
        meter.next_reset().to_rfc3339(),
    )?;
    Ok(())
}

pub fn write_header<W, V, S>(writer: &mut W, coordinator: &Coordinator<V, S>) -> Result<()>
where
    W: Write,
    V: ValueSource,
    S: StateStore,
{
    writeln!(writer, "{} ({})", coordinator.name(), coordinator.status())?;
    Ok(())
}

/// Reports what an update did, followed by the meters when it was applied.
pub fn write_outcome<W, V, S>(
    writer: &mut W,
    coordinator: &Coordinator<V, S>,
    outcome: &UpdateOutcome,
) -> Result<()>
where
    W: Write,
    V: ValueSource,
    S: StateStore,
{
    match outcome {
        UpdateOutcome::Applied { input_value } => {
            write_header(writer, coordinator)?;
            writeln!(writer, "input: {input_value}")?;
            write_meters(writer, coordinator)
        }
        UpdateOutcome::Skipped(err) => {
            writeln!(writer, "update skipped: {err}")?;
            Ok(())
        }
    }
}
