//! Core metering logic.
//!
//! This crate contains the fundamental types and logic for:
//! - Recurrence: cron patterns and predefined period names
//! - Periods: recurring accounting windows with optional fixed duration
//! - Meters: session-based accumulation gated by period and condition
//! - Coordination: driving meters from heartbeats and condition changes,
//!   notifying listeners and persisting state

mod condition;
pub mod coordinator;
pub mod meter;
pub mod period;
pub mod recurrence;
pub mod source;
pub mod store;
mod time_window;

pub use condition::{ConditionError, parse_condition};
pub use coordinator::{
    Coordinator, CoordinatorError, Gating, ListenerError, ListenerId, UpdateOutcome,
};
pub use meter::{Meter, MeterError, MeterSnapshot, MeterState};
pub use period::{Period, PeriodError};
pub use recurrence::{PREDEFINED_PERIODS, Recurrence, RecurrenceError};
pub use source::{ReadError, TimeSource, ValueSource, parse_reading};
pub use store::{
    CoordinatorStatus, MemoryStore, RESERVED_KEYS, STATE_VERSION, StateStore, StoreError,
    StoredState,
};
pub use time_window::{TimeWindow, TimeWindowError};
