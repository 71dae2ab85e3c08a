//! Recurring accounting windows.
//!
//! A [`Period`] starts at every occurrence of a cron pattern and ends either
//! at the next occurrence or after a fixed duration. It is advanced by
//! [`Period::update`], which fires a reset callback when `now` has moved past
//! the current window.
//!
//! # Advancement
//!
//! However far `now` has moved past the window (a missed heartbeat, a host
//! that was down for a week), a single update fires a single reset and
//! re-synchronizes the window around `now`. Missed windows are never
//! replayed one by one.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use thiserror::Error;

use crate::recurrence::{Recurrence, RecurrenceError};

/// Errors from constructing or advancing a period.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodError {
    /// The cron pattern could not be evaluated.
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),

    /// The duration leaves no room before the next period start.
    #[error("duration {duration} must be shorter than the interval of '{pattern}' ({interval})")]
    DurationExceedsInterval {
        pattern: String,
        duration: Duration,
        interval: Duration,
    },

    /// The duration is zero or negative.
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(Duration),
}

/// One recurring accounting window.
#[derive(Debug, Clone)]
pub struct Period {
    recurrence: Recurrence,
    duration: Option<Duration>,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    active: bool,
    last_reset: DateTime<Tz>,
}

impl Period {
    /// Creates the window that contains, or most recently started before, `now`.
    ///
    /// With a duration the window ends at `start + duration`, which must fall
    /// before the next occurrence of the pattern. Later windows are capped at
    /// their next occurrence instead.
    pub fn new(
        recurrence: Recurrence,
        now: DateTime<Tz>,
        duration: Option<Duration>,
    ) -> Result<Self, PeriodError> {
        if let Some(duration) = duration.filter(|d| *d <= Duration::zero()) {
            return Err(PeriodError::NonPositiveDuration(duration));
        }

        let start = recurrence.prev_at_or_before(&now)?;
        let next = recurrence.next_after(&start)?;
        let end = match duration {
            Some(duration) if start + duration >= next => {
                return Err(PeriodError::DurationExceedsInterval {
                    pattern: recurrence.pattern().to_string(),
                    duration,
                    interval: next - start,
                });
            }
            Some(duration) => start + duration,
            None => next,
        };

        Ok(Self {
            recurrence,
            duration,
            start,
            end,
            active: start <= now && now <= end,
            last_reset: now,
        })
    }

    /// Advances the window when `now` is past its end.
    ///
    /// Calls `reset` with `input_value` exactly once per crossing, however many
    /// windows were skipped, and returns whether a crossing happened.
    pub fn update<F>(
        &mut self,
        now: DateTime<Tz>,
        reset: F,
        input_value: f64,
    ) -> Result<bool, PeriodError>
    where
        F: FnOnce(f64),
    {
        let crossed = now > self.end;
        if crossed {
            let (start, end) = self.locate(now)?;
            self.start = start;
            self.end = end;
            self.last_reset = now;
            reset(input_value);
        }
        self.active = self.contains(now);
        Ok(crossed)
    }

    /// Re-anchors the window on a persisted `last_reset`.
    ///
    /// A boundary crossed after `last_reset` is then picked up by the next
    /// [`update`](Self::update) as a single reset, while a boundary that was
    /// already handled stays handled.
    pub fn resume(
        &mut self,
        last_reset: DateTime<Tz>,
        now: DateTime<Tz>,
    ) -> Result<(), PeriodError> {
        let (start, end) = self.locate(last_reset)?;
        self.start = start;
        self.end = end;
        self.last_reset = last_reset;
        self.active = self.contains(now);
        Ok(())
    }

    /// Start of the current window.
    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    /// End of the current window, which is also the next reset.
    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    /// Whether the last update fell inside the window.
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// When the window last rolled over (construction time initially).
    pub fn last_reset(&self) -> DateTime<Tz> {
        self.last_reset
    }

    pub const fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn contains(&self, at: DateTime<Tz>) -> bool {
        self.start <= at && at <= self.end
    }

    /// The window `at` belongs to. With a duration, an instant that falls in
    /// the gap after a window belongs to the upcoming one.
    fn locate(&self, at: DateTime<Tz>) -> Result<(DateTime<Tz>, DateTime<Tz>), PeriodError> {
        let start = self.recurrence.prev_at_or_before(&at)?;
        let end = self.window_end(start)?;
        if at <= end {
            return Ok((start, end));
        }
        let start = self.recurrence.next_after(&at)?;
        Ok((start, self.window_end(start)?))
    }

    /// `start + duration`, capped at the next occurrence. Uneven patterns
    /// (months, DST days) can leave a later interval shorter than the one
    /// the duration was validated against.
    fn window_end(&self, start: DateTime<Tz>) -> Result<DateTime<Tz>, PeriodError> {
        let next = self.recurrence.next_after(&start)?;
        Ok(self
            .duration
            .map_or(next, |duration| (start + duration).min(next)))
    }
}
