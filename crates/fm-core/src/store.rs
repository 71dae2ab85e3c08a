//! Persisted coordinator state.
//!
//! # Schema
//!
//! The blob is a flat JSON object: one entry per meter name holding a
//! [`MeterSnapshot`], next to the reserved `version` and `status` keys.
//!
//! ```json
//! {
//!   "version": 1,
//!   "status": "measuring",
//!   "office_day": {
//!     "measured_value": 7.0,
//!     "start_measured_value": 0.0,
//!     "prev_measured_value": 0.0,
//!     "session_start_input_value": 123.0,
//!     "last_reset": 1640989800.0,
//!     "state": "measuring"
//!   }
//! }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::meter::MeterSnapshot;

/// Current version of the persisted layout.
pub const STATE_VERSION: u32 = 1;

/// Top-level keys that cannot be used as meter names.
pub const RESERVED_KEYS: [&str; 2] = ["version", "status"];

/// Errors from a state store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("state store is unavailable")]
    Unavailable,
}

/// Loads and saves an opaque state blob.
pub trait StateStore {
    /// Returns `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<Value>, StoreError>;

    fn save(&mut self, data: &Value) -> Result<(), StoreError>;
}

/// Whether the coordinator's activation condition was last seen satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorStatus {
    Measuring,
    #[default]
    Inactive,
}

impl CoordinatorStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Measuring => "measuring",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the coordinator persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub status: CoordinatorStatus,
    #[serde(flatten)]
    pub meters: BTreeMap<String, MeterSnapshot>,
}

impl StoredState {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// In-memory store.
///
/// Clones share the same slot, which lets a test keep a handle on what a
/// coordinator saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Rc<RefCell<Option<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(data))),
        }
    }

    pub fn data(&self) -> Option<Value> {
        self.slot.borrow().clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.data())
    }

    fn save(&mut self, data: &Value) -> Result<(), StoreError> {
        *self.slot.borrow_mut() = Some(data.clone());
        Ok(())
    }
}
