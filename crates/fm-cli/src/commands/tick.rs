//! Tick command: a single heartbeat, for hosts that own the scheduling.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use fm_core::{Coordinator, StateStore, ValueSource};

use super::util::write_outcome;

pub fn run<W, V, S>(writer: &mut W, coordinator: &mut Coordinator<V, S>, now: DateTime<Tz>) -> Result<()>
where
    W: Write,
    V: ValueSource,
    S: StateStore,
{
    let outcome = coordinator.heartbeat(now).context("heartbeat failed")?;
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
    use fm_core::{Gating, MemoryStore, Meter, Period, ReadError, Recurrence};
    use insta::assert_snapshot;

    fn local(h: u32, m: u32) -> DateTime<Tz> {
        Amsterdam.with_ymd_and_hms(2022, 1, 1, h, m, 0).unwrap()
    }

    fn meter(name: &str, period: &str) -> Meter {
        let recurrence = Recurrence::predefined(period).unwrap();
        Meter::new(name, Period::new(recurrence, local(10, 30), None).unwrap())
    }

    #[test]
    fn tick_reports_meters() {
        let reading = Rc::new(Cell::new(123.0));
        let source = {
            let reading = Rc::clone(&reading);
            move || Ok::<_, ReadError>(reading.get())
        };
        let mut coordinator = Coordinator::new(
            "office",
            vec![meter("office_day", "day"), meter("office_hour", "hour")],
            source,
            MemoryStore::new(),
            Gating::default(),
        )
        .unwrap();

        run(&mut io::sink(), &mut coordinator, local(11, 5)).unwrap();
        reading.set(130.0);
        let mut output = Vec::new();
        run(&mut output, &mut coordinator, local(11, 10)).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        office (measuring)
        input: 130
        office_day: 7.000 [measuring] prev 0.000, next reset 2022-01-02T00:00:00+01:00
        office_hour: 7.000 [measuring] prev 0.000, next reset 2022-01-01T12:00:00+01:00
        ");
    }

    #[test]
    fn tick_without_reading_is_skipped() {
        let mut coordinator = Coordinator::new(
            "office",
            vec![meter("office_day", "day")],
            || Err::<f64, _>(ReadError::Unknown),
            MemoryStore::new(),
            Gating::default(),
        )
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &mut coordinator, local(11, 5)).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @"update skipped: source state is unknown");
    }
}
