//! Day-of-week and time-of-day gating.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Weekday};
use thiserror::Error;

const TIME_FORMAT: &str = "%H:%M:%S";

/// Errors from building a time window out of configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("invalid weekday index {0} (expected 0 = Monday through 6 = Sunday)")]
    InvalidDay(u8),

    #[error("invalid time '{value}' (expected HH:MM:SS)")]
    InvalidTime { value: String },
}

/// A recurring weekly window such as "weekdays 08:00 to 18:00".
///
/// When `start >= end` the window crosses midnight: the part after midnight
/// belongs to the day it started on, so `Fri 22:00 - 06:00` covers Saturday
/// morning but not Friday morning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    days: HashSet<Weekday>,
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    pub fn new(days: impl IntoIterator<Item = Weekday>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            days: days.into_iter().collect(),
            start,
            end,
        }
    }

    /// Builds a window from weekday indices (0 = Monday) and `HH:MM:SS` strings.
    pub fn parse(days: &[u8], from: &str, till: &str) -> Result<Self, TimeWindowError> {
        let days = days
            .iter()
            .map(|&day| Weekday::try_from(day).map_err(|_| TimeWindowError::InvalidDay(day)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(days, parse_time(from)?, parse_time(till)?))
    }

    pub const fn start(&self) -> NaiveTime {
        self.start
    }

    pub const fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn is_active<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        let time = now.time();
        let day = now.weekday();

        if self.start < self.end {
            self.start <= time && time <= self.end && self.days.contains(&day)
        } else if time >= self.start {
            self.days.contains(&day)
        } else if time <= self.end {
            self.days.contains(&day.pred())
        } else {
            false
        }
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, TimeWindowError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|_| TimeWindowError::InvalidTime {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    // 2022-01-03 is a Monday.
    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, day, h, m, 0).unwrap()
    }

    #[test]
    fn same_day_window() {
        let window = TimeWindow::parse(&[0, 1, 2, 3, 4], "08:00:00", "18:00:00").unwrap();

        assert!(window.is_active(&at(3, 8, 0)));
        assert!(window.is_active(&at(3, 12, 0)));
        assert!(window.is_active(&at(3, 18, 0)));
        assert!(!window.is_active(&at(3, 7, 59)));
        assert!(!window.is_active(&at(3, 18, 1)));
        // Saturday
        assert!(!window.is_active(&at(8, 12, 0)));
    }

    #[test]
    fn midnight_crossing_window_belongs_to_start_day() {
        // Friday night only.
        let window = TimeWindow::parse(&[4], "22:00:00", "06:00:00").unwrap();

        assert!(window.is_active(&at(7, 23, 0)));
        assert!(window.is_active(&at(8, 5, 0)));
        assert!(!window.is_active(&at(7, 5, 0)));
        assert!(!window.is_active(&at(8, 23, 0)));
        assert!(!window.is_active(&at(7, 12, 0)));
    }

    #[test]
    fn sunday_night_wraps_to_monday() {
        let window = TimeWindow::parse(&[6], "22:00:00", "02:00:00").unwrap();
        assert!(window.is_active(&at(3, 1, 0)));
        assert!(!window.is_active(&at(4, 1, 0)));
    }

    #[test]
    fn equal_bounds_cover_the_whole_day() {
        let window = TimeWindow::parse(&[0, 1, 2, 3, 4, 5, 6], "00:00:00", "00:00:00").unwrap();
        for hour in 0..24 {
            assert!(window.is_active(&at(5, hour, 30)));
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            TimeWindow::parse(&[7], "00:00:00", "01:00:00").unwrap_err(),
            TimeWindowError::InvalidDay(7)
        );
        assert!(matches!(
            TimeWindow::parse(&[0], "8am", "01:00:00").unwrap_err(),
            TimeWindowError::InvalidTime { .. }
        ));
    }
}
