//! Condition command: push one condition result.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use fm_core::{Coordinator, StateStore, ValueSource, parse_condition};

use super::util::write_outcome;

/// Applies `value` as the new condition result.
///
/// A value that is not a recognizable boolean counts as an evaluation error,
/// which stops measuring.
pub fn run<W, V, S>(
    writer: &mut W,
    coordinator: &mut Coordinator<V, S>,
    now: DateTime<Tz>,
    value: &str,
) -> Result<()>
where
    W: Write,
    V: ValueSource,
    S: StateStore,
{
    let outcome = coordinator
        .condition_changed(now, parse_condition(value))
        .context("condition update failed")?;
    write_outcome(writer, coordinator, &outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;

    use chrono::TimeZone;
    use chrono_tz::Europe::Amsterdam;
    use fm_core::{Gating, MemoryStore, Meter, MeterState, Period, ReadError, Recurrence};
    use insta::assert_snapshot;

    fn local(h: u32, m: u32) -> DateTime<Tz> {
        Amsterdam.with_ymd_and_hms(2022, 1, 1, h, m, 0).unwrap()
    }

    #[test]
    fn condition_pauses_measuring() {
        let reading = Rc::new(Cell::new(123.0));
        let source = {
            let reading = Rc::clone(&reading);
            move || Ok::<_, ReadError>(reading.get())
        };
        let period = Period::new(Recurrence::predefined("day").unwrap(), local(10, 30), None).unwrap();
        let mut coordinator = Coordinator::new(
            "office",
            vec![Meter::new("office_day", period)],
            source,
            MemoryStore::new(),
            Gating {
                condition: true,
                time_window: None,
            },
        )
        .unwrap();

        run(&mut io::sink(), &mut coordinator, local(11, 5), "on").unwrap();
        reading.set(125.0);
        let mut output = Vec::new();
        run(&mut output, &mut coordinator, local(11, 6), "off").unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        office (inactive)
        input: 125
        office_day: 2.000 [waiting_for_condition] prev 0.000, next reset 2022-01-02T00:00:00+01:00
        ");

        run(&mut io::sink(), &mut coordinator, local(11, 7), "yes").unwrap();
        reading.set(130.0);
        run(&mut io::sink(), &mut coordinator, local(11, 8), "garbled").unwrap();
        let day = coordinator.meter("office_day").unwrap();
        assert_eq!(day.state(), Some(MeterState::WaitingForCondition));
        assert_eq!(day.measured_value(), 7.0);
    }
}
