//! Input readings the meters accumulate.

use chrono::Utc;
use thiserror::Error;

/// Why a reading could not be taken. All variants are recoverable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("source is unavailable")]
    Unavailable,

    #[error("source state is unknown")]
    Unknown,

    #[error("source state is not numeric: {0:?}")]
    NotNumeric(String),

    #[error("failed to read source: {0}")]
    Backend(String),
}

/// Produces the current input reading.
///
/// Readings must be cumulative (a clock, an energy counter): meters
/// accumulate the difference between readings.
pub trait ValueSource {
    fn read(&mut self) -> Result<f64, ReadError>;
}

impl<F> ValueSource for F
where
    F: FnMut() -> Result<f64, ReadError>,
{
    fn read(&mut self) -> Result<f64, ReadError> {
        self()
    }
}

/// Elapsed wall-clock time, as Unix seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSource;

impl ValueSource for TimeSource {
    #[expect(
        clippy::cast_precision_loss,
        reason = "microsecond timestamps fit comfortably in an f64 mantissa"
    )]
    fn read(&mut self) -> Result<f64, ReadError> {
        Ok(Utc::now().timestamp_micros() as f64 / 1_000_000.0)
    }
}

/// Parses a textual state into a reading.
///
/// `unavailable`, `unknown` and anything non-numeric or non-finite are
/// read failures.
pub fn parse_reading(raw: &str) -> Result<f64, ReadError> {
    let value = raw.trim();
    match value {
        "" | "unavailable" => Err(ReadError::Unavailable),
        "unknown" => Err(ReadError::Unknown),
        _ => value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ReadError::NotNumeric(value.to_string())),
    }
}
