//! Cron arithmetic for period boundaries.
//!
//! Patterns may be given in the classic 5-field form (`min hour dom mon dow`,
//! day-of-week `0`/`7` = Sunday) or in the 6/7-field form with a leading
//! seconds field understood by the `cron` crate. 5-field patterns are
//! normalized by prepending a zero seconds field and translating numeric
//! weekdays to names, since the two dialects number weekdays differently.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike};
use chrono_tz::Tz;
use cron::Schedule;
use thiserror::Error;

/// Weekday names indexed by classic cron numbering (0 = Sunday).
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Named periods usable in place of a raw cron pattern.
pub const PREDEFINED_PERIODS: &[(&str, &str)] = &[
    ("5m", "*/5 * * * *"),
    ("hour", "0 * * * *"),
    ("day", "0 0 * * *"),
    ("week", "0 0 * * 1"),
    ("month", "0 0 1 * *"),
    ("year", "0 0 1 1 *"),
];

/// Errors from parsing or evaluating a cron pattern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    /// The pattern could not be parsed.
    #[error("invalid cron pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The name is not one of [`PREDEFINED_PERIODS`].
    #[error("unknown predefined period: {0}")]
    UnknownPeriod(String),

    /// The schedule has no occurrence in the requested direction.
    #[error("cron pattern '{pattern}' has no occurrence {direction} {at}")]
    NoOccurrence {
        pattern: String,
        direction: &'static str,
        at: String,
    },
}

/// A parsed cron pattern.
///
/// Occurrences are computed in the timezone of the instant passed in, so the
/// same recurrence serves any timezone.
#[derive(Clone)]
pub struct Recurrence {
    pattern: String,
    schedule: Schedule,
}

impl fmt::Debug for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recurrence")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl FromStr for Recurrence {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Recurrence {
    /// Parses a cron pattern.
    pub fn parse(pattern: &str) -> Result<Self, RecurrenceError> {
        let normalized = normalize(pattern)?;
        let schedule = Schedule::from_str(&normalized).map_err(|err| {
            RecurrenceError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            pattern: pattern.trim().to_string(),
            schedule,
        })
    }

    /// Looks up one of the [`PREDEFINED_PERIODS`] by name.
    pub fn predefined(name: &str) -> Result<Self, RecurrenceError> {
        PREDEFINED_PERIODS
            .iter()
            .find(|(period, _)| *period == name)
            .ok_or_else(|| RecurrenceError::UnknownPeriod(name.to_string()))
            .and_then(|(_, pattern)| Self::parse(pattern))
    }

    /// The pattern as it was given.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Earliest occurrence strictly after `at`.
    pub fn next_after(&self, at: &DateTime<Tz>) -> Result<DateTime<Tz>, RecurrenceError> {
        self.schedule
            .after(at)
            .next()
            .ok_or_else(|| self.no_occurrence("after", at))
    }

    /// Latest occurrence at or before `at`, at second precision.
    pub fn prev_at_or_before(&self, at: &DateTime<Tz>) -> Result<DateTime<Tz>, RecurrenceError> {
        // The schedule only walks backwards strictly, so probe one second past `at`.
        let probe = at.with_nanosecond(0).unwrap_or(*at) + Duration::seconds(1);
        self.schedule
            .after(&probe)
            .next_back()
            .ok_or_else(|| self.no_occurrence("at or before", at))
    }

    fn no_occurrence(&self, direction: &'static str, at: &DateTime<Tz>) -> RecurrenceError {
        RecurrenceError::NoOccurrence {
            pattern: self.pattern.clone(),
            direction,
            at: at.to_rfc3339(),
        }
    }
}

fn normalize(pattern: &str) -> Result<String, RecurrenceError> {
    let fields: Vec<&str> = pattern.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, dom, month, dow] => {
            let dow = translate_weekdays(pattern, dow)?;
            Ok(format!("0 {minute} {hour} {dom} {month} {dow}"))
        }
        fields if fields.len() == 6 || fields.len() == 7 => Ok(fields.join(" ")),
        fields => Err(RecurrenceError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("expected 5, 6 or 7 fields, got {}", fields.len()),
        }),
    }
}

/// Rewrites numeric weekdays (0-7, Sunday = 0 or 7) as names. Step values are
/// left numeric.
fn translate_weekdays(pattern: &str, field: &str) -> Result<String, RecurrenceError> {
    let translate = |token: &str| -> Result<String, RecurrenceError> {
        match token.parse::<usize>() {
            Ok(day) if day <= 7 => Ok(WEEKDAY_NAMES[day % 7].to_string()),
            Ok(day) => Err(RecurrenceError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: format!("day of week out of range: {day}"),
            }),
            Err(_) => Ok(token.to_string()),
        }
    };

    let mut items = Vec::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        let base = match base.split_once('-') {
            Some((from, to)) => format!("{}-{}", translate(from)?, translate(to)?),
            None => translate(base)?,
        };
        items.push(match step {
            Some(step) => format!("{base}/{step}"),
            None => base,
        });
    }
    Ok(items.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use chrono_tz::Europe::Amsterdam;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        Amsterdam.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn five_field_patterns_get_a_seconds_field() {
        assert_eq!(normalize("0 0 * * *").unwrap(), "0 0 0 * * *");
        assert_eq!(normalize("*/5 * * * *").unwrap(), "0 */5 * * * *");
    }

    #[test]
    fn numeric_weekdays_are_translated() {
        assert_eq!(normalize("0 0 * * 1").unwrap(), "0 0 0 * * MON");
        assert_eq!(normalize("0 0 * * 0,7").unwrap(), "0 0 0 * * SUN,SUN");
        assert_eq!(normalize("0 0 * * 1-5").unwrap(), "0 0 0 * * MON-FRI");
        assert_eq!(normalize("0 0 * * */2").unwrap(), "0 0 0 * * */2");
        assert!(normalize("0 0 * * 8").is_err());
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let err = Recurrence::parse("0 0 *").unwrap_err();
        assert!(matches!(err, RecurrenceError::InvalidPattern { .. }));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Recurrence::parse("a b c d e").is_err());
    }

    #[test]
    fn prev_at_or_before_includes_exact_match() {
        let daily = Recurrence::parse("0 0 * * *").unwrap();
        let midnight = local(2022, 1, 1, 0, 0);
        assert_eq!(daily.prev_at_or_before(&midnight).unwrap(), midnight);
        assert_eq!(
            daily.prev_at_or_before(&local(2022, 1, 1, 10, 30)).unwrap(),
            midnight
        );
    }

    #[test]
    fn next_after_is_strict() {
        let daily = Recurrence::parse("0 0 * * *").unwrap();
        let midnight = local(2022, 1, 1, 0, 0);
        assert_eq!(daily.next_after(&midnight).unwrap(), local(2022, 1, 2, 0, 0));
    }

    #[test]
    fn weekly_pattern_starts_on_monday() {
        let weekly = Recurrence::predefined("week").unwrap();
        // 2022-01-05 is a Wednesday.
        let start = weekly.prev_at_or_before(&local(2022, 1, 5, 12, 0)).unwrap();
        assert_eq!(start, local(2022, 1, 3, 0, 0));
    }

    #[test]
    fn unknown_predefined_period() {
        assert_eq!(
            Recurrence::predefined("fortnight").unwrap_err(),
            RecurrenceError::UnknownPeriod("fortnight".to_string())
        );
    }
}
