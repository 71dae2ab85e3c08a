//! Session-based accumulation over a [`Period`].
//!
//! A meter measures while its period is active and its activation condition
//! holds. Each contiguous stretch of measuring is a session: on entering
//! [`MeterState::Measuring`] the meter records the input reading and its
//! running total, and from then on the total is re-derived as
//! `start_measured_value + (input - session_start_input_value)` rather than
//! summed incrementally.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::period::{Period, PeriodError};

/// Errors raised while updating or restoring a meter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeterError {
    /// The period is inactive and the condition is false at the same time.
    ///
    /// No state describes this combination; hitting it means the caller's
    /// gating is broken.
    #[error("meter {meter}: period inactive while condition is false")]
    InvalidState { meter: String },

    /// The period could not be advanced or re-anchored.
    #[error("meter {meter}: {source}")]
    Period {
        meter: String,
        #[source]
        source: PeriodError,
    },

    /// A persisted timestamp is out of range.
    #[error("meter {meter}: invalid last_reset timestamp {value}")]
    InvalidTimestamp { meter: String, value: f64 },
}

/// Where a meter is in its measuring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterState {
    /// Period active and condition true.
    Measuring,
    /// Period active, condition false.
    WaitingForCondition,
    /// Condition true, period not started yet.
    WaitingForPeriod,
}

impl MeterState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Measuring => "measuring",
            Self::WaitingForCondition => "waiting_for_condition",
            Self::WaitingForPeriod => "waiting_for_period",
        }
    }
}

impl fmt::Display for MeterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeterState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "measuring" => Ok(Self::Measuring),
            "waiting_for_condition" | "waiting for template" => Ok(Self::WaitingForCondition),
            "waiting_for_period" | "waiting for period start" => Ok(Self::WaitingForPeriod),
            _ => Err(format!("invalid meter state: {s}")),
        }
    }
}

impl Serialize for MeterState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MeterState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Checkpoint of a meter, enough to resume mid-session.
///
/// Every field defaults, so older or partial records still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSnapshot {
    pub measured_value: f64,
    pub start_measured_value: Option<f64>,
    pub prev_measured_value: f64,
    pub session_start_input_value: Option<f64>,
    /// Unix timestamp in seconds.
    pub last_reset: Option<f64>,
    pub state: Option<MeterState>,
}

/// Baseline of the live measuring session.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Session {
    start_input_value: f64,
    start_measured_value: f64,
}

/// Running totals, kept apart from the period so a reset can borrow them
/// while the period is being advanced.
#[derive(Debug, Clone, Default)]
struct Totals {
    measured_value: f64,
    prev_measured_value: f64,
    session: Option<Session>,
}

impl Totals {
    fn start_session(&mut self, input_value: f64) {
        self.session = Some(Session {
            start_input_value: input_value,
            start_measured_value: self.measured_value,
        });
    }

    fn track(&mut self, input_value: f64) {
        match self.session {
            Some(session) => {
                self.measured_value =
                    session.start_measured_value + (input_value - session.start_input_value);
            }
            // Restored without a baseline; measure from here.
            None => self.start_session(input_value),
        }
    }

    fn reset(&mut self, input_value: f64) {
        self.prev_measured_value = self.measured_value;
        self.measured_value = 0.0;
        if self.session.is_some() {
            self.start_session(input_value);
        }
    }
}

/// An accumulator combining a [`Period`] with condition gating.
#[derive(Debug, Clone)]
pub struct Meter {
    name: String,
    period: Period,
    state: Option<MeterState>,
    totals: Totals,
    condition_active: bool,
}

impl Meter {
    pub fn new(name: impl Into<String>, period: Period) -> Self {
        Self {
            name: name.into(),
            period,
            state: None,
            totals: Totals::default(),
            condition_active: false,
        }
    }

    /// Treats the condition as permanently satisfied.
    pub const fn disable_condition(&mut self) {
        self.condition_active = true;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` until the first event has been processed.
    pub const fn state(&self) -> Option<MeterState> {
        self.state
    }

    pub const fn measured_value(&self) -> f64 {
        self.totals.measured_value
    }

    pub const fn prev_measured_value(&self) -> f64 {
        self.totals.prev_measured_value
    }

    pub fn last_reset(&self) -> DateTime<Tz> {
        self.period.last_reset()
    }

    pub fn next_reset(&self) -> DateTime<Tz> {
        self.period.end()
    }

    pub const fn period(&self) -> &Period {
        &self.period
    }

    pub const fn condition_active(&self) -> bool {
        self.condition_active
    }

    /// Processes a timer tick.
    ///
    /// On error the meter is left untouched.
    pub fn on_heartbeat(&mut self, now: DateTime<Tz>, input_value: f64) -> Result<(), MeterError> {
        self.apply(now, input_value, None)
    }

    /// Processes a new condition result.
    ///
    /// On error the meter is left untouched, including its condition flag.
    pub fn on_condition_change(
        &mut self,
        now: DateTime<Tz>,
        input_value: f64,
        active: bool,
    ) -> Result<(), MeterError> {
        self.apply(now, input_value, Some(active))
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        let session = self.totals.session;
        MeterSnapshot {
            measured_value: self.totals.measured_value,
            start_measured_value: session.map(|s| s.start_measured_value),
            prev_measured_value: self.totals.prev_measured_value,
            session_start_input_value: session.map(|s| s.start_input_value),
            last_reset: Some(to_unix_seconds(self.period.last_reset())),
            state: self.state,
        }
    }

    /// Restores a checkpoint taken by [`snapshot`](Self::snapshot).
    ///
    /// The period is re-anchored on the stored `last_reset`, so a boundary
    /// that passed while the meter was not running resets it on the next
    /// update. On error the meter is left untouched.
    pub fn restore(&mut self, snapshot: &MeterSnapshot, now: DateTime<Tz>) -> Result<(), MeterError> {
        let mut period = self.period.clone();
        if let Some(seconds) = snapshot.last_reset {
            let last_reset = from_unix_seconds(seconds, now).ok_or_else(|| {
                MeterError::InvalidTimestamp {
                    meter: self.name.clone(),
                    value: seconds,
                }
            })?;
            period
                .resume(last_reset, now)
                .map_err(|source| self.period_error(source))?;
        }

        let session = match (
            snapshot.session_start_input_value,
            snapshot.start_measured_value,
        ) {
            (Some(start_input_value), Some(start_measured_value)) => Some(Session {
                start_input_value,
                start_measured_value,
            }),
            _ => None,
        };

        self.period = period;
        self.totals = Totals {
            measured_value: snapshot.measured_value,
            prev_measured_value: snapshot.prev_measured_value,
            session,
        };
        self.state = snapshot.state;
        // Only a meter waiting for its condition can have seen it false.
        if let Some(state) = snapshot.state {
            self.condition_active = state != MeterState::WaitingForCondition;
        }
        Ok(())
    }

    /// Runs an event against a copy and commits it only if it succeeds.
    fn apply(
        &mut self,
        now: DateTime<Tz>,
        input_value: f64,
        condition: Option<bool>,
    ) -> Result<(), MeterError> {
        let mut next = self.clone();
        next.advance(now, input_value)?;
        if let Some(active) = condition {
            next.condition_active = active;
        }
        next.update_state(input_value)?;
        *self = next;
        Ok(())
    }

    fn advance(&mut self, now: DateTime<Tz>, input_value: f64) -> Result<(), MeterError> {
        if self.state == Some(MeterState::Measuring) {
            self.totals.track(input_value);
        }

        let totals = &mut self.totals;
        let crossed = self
            .period
            .update(now, |value| totals.reset(value), input_value)
            .map_err(|source| MeterError::Period {
                meter: self.name.clone(),
                source,
            })?;
        if crossed {
            tracing::debug!(
                meter = %self.name,
                prev = self.totals.prev_measured_value,
                next_reset = %self.period.end(),
                "period reset"
            );
        }
        Ok(())
    }

    fn update_state(&mut self, input_value: f64) -> Result<(), MeterError> {
        let new_state = match (self.period.is_active(), self.condition_active) {
            (true, true) => MeterState::Measuring,
            (true, false) => MeterState::WaitingForCondition,
            (false, true) => MeterState::WaitingForPeriod,
            (false, false) => {
                return Err(MeterError::InvalidState {
                    meter: self.name.clone(),
                });
            }
        };

        if self.state == Some(new_state) {
            return Ok(());
        }
        if new_state == MeterState::Measuring {
            self.totals.start_session(input_value);
        }
        tracing::debug!(
            meter = %self.name,
            from = ?self.state,
            to = %new_state,
            "meter state changed"
        );
        self.state = Some(new_state);
        Ok(())
    }

    fn period_error(&self, source: PeriodError) -> MeterError {
        MeterError::Period {
            meter: self.name.clone(),
            source,
        }
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "microsecond timestamps fit comfortably in an f64 mantissa"
)]
fn to_unix_seconds(at: DateTime<Tz>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "rounded to whole microseconds before conversion"
)]
fn from_unix_seconds(seconds: f64, reference: DateTime<Tz>) -> Option<DateTime<Tz>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_micros(micros).map(|at| at.with_timezone(&reference.timezone()))
}
