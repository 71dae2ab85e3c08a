//! Drives a set of meters from heartbeats and condition changes.
//!
//! Both kinds of event go through one update funnel:
//!
//! 1. Read the input value, falling back to the last good reading. Without
//!    any good reading the update is skipped entirely.
//! 2. Forward the event to every meter. A meter that rejects it is logged
//!    and left as it was; the others still take the event.
//! 3. Notify listeners.
//! 4. Persist every meter plus the coordinator status.
//!
//! The first meter failure is returned after all four steps have run.
//!
//! Updates take `&mut self`, so one is always processed to completion before
//! the next starts.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono_tz::Tz;
use thiserror::Error;

use crate::condition::ConditionError;
use crate::meter::{Meter, MeterError};
use crate::source::{ReadError, ValueSource};
use crate::store::{CoordinatorStatus, RESERVED_KEYS, STATE_VERSION, StateStore, StoredState};
use crate::time_window::TimeWindow;

/// Errors from building or updating a coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("duplicate meter name: {0}")]
    DuplicateMeter(String),

    #[error("meter name '{0}' is reserved")]
    ReservedName(String),

    #[error(transparent)]
    Meter(#[from] MeterError),
}

/// Error type listeners may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Box<dyn FnMut() -> Result<(), ListenerError>>;

/// Handle returned by [`Coordinator::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What happened to an update request.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Meters were updated with this input value.
    Applied { input_value: f64 },
    /// No reading was available yet; nothing changed.
    Skipped(ReadError),
}

/// Optional gating for a coordinator.
#[derive(Debug, Clone, Default)]
pub struct Gating {
    /// Whether condition results will be pushed via
    /// [`Coordinator::condition_changed`]. Without one the condition is
    /// always satisfied.
    pub condition: bool,
    pub time_window: Option<TimeWindow>,
}

enum Trigger {
    Heartbeat,
    Condition,
}

pub struct Coordinator<V, S> {
    name: String,
    meters: BTreeMap<String, Meter>,
    source: V,
    store: S,
    /// Last condition result; `None` when no condition is configured.
    condition: Option<bool>,
    /// A condition change that has not reached the meters yet.
    condition_pending: bool,
    time_window: Option<TimeWindow>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
    last_value: Option<f64>,
}

impl<V, S> Coordinator<V, S>
where
    V: ValueSource,
    S: StateStore,
{
    pub fn new(
        name: impl Into<String>,
        meters: Vec<Meter>,
        source: V,
        store: S,
        gating: Gating,
    ) -> Result<Self, CoordinatorError> {
        let ungated = !gating.condition && gating.time_window.is_none();
        let mut by_name = BTreeMap::new();
        for mut meter in meters {
            let meter_name = meter.name().to_string();
            if RESERVED_KEYS.contains(&meter_name.as_str()) {
                return Err(CoordinatorError::ReservedName(meter_name));
            }
            if ungated {
                meter.disable_condition();
            }
            if by_name.insert(meter_name.clone(), meter).is_some() {
                return Err(CoordinatorError::DuplicateMeter(meter_name));
            }
        }

        Ok(Self {
            name: name.into(),
            meters: by_name,
            source,
            store,
            condition: gating.condition.then_some(false),
            condition_pending: false,
            time_window: gating.time_window,
            listeners: Vec::new(),
            next_listener_id: 0,
            last_value: None,
        })
    }

    /// Restores persisted state.
    ///
    /// Never fails: unreadable or mis-shaped data is logged and the affected
    /// meters keep their freshly constructed state.
    pub fn init(&mut self, now: DateTime<Tz>) {
        let value = match self.store.load() {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!(coordinator = %self.name, "no persisted state");
                return;
            }
            Err(err) => {
                tracing::error!(
                    coordinator = %self.name,
                    error = %err,
                    "loading persisted state failed"
                );
                return;
            }
        };

        let stored = match StoredState::from_value(value) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(
                    coordinator = %self.name,
                    error = %err,
                    "ignoring mis-shaped persisted state"
                );
                return;
            }
        };
        if stored.version > STATE_VERSION {
            tracing::warn!(
                coordinator = %self.name,
                version = stored.version,
                "ignoring persisted state from a newer version"
            );
            return;
        }

        if self.condition.is_some() {
            self.condition = Some(stored.status == CoordinatorStatus::Measuring);
        }
        let ungated = self.condition.is_none() && self.time_window.is_none();
        for (name, meter) in &mut self.meters {
            let Some(snapshot) = stored.meters.get(name) else {
                tracing::debug!(meter = %name, "no persisted state for meter");
                continue;
            };
            if let Err(err) = meter.restore(snapshot, now) {
                tracing::warn!(meter = %name, error = %err, "could not restore meter");
            }
            // State saved under an earlier, gated configuration.
            if ungated {
                meter.disable_condition();
            }
        }
        tracing::info!(
            coordinator = %self.name,
            status = %self.status(),
            "restored persisted state"
        );
    }

    /// Registers a listener and calls it right away.
    ///
    /// Listeners receive no payload; they read back through
    /// [`meters`](Self::meters) or [`meter`](Self::meter).
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut() -> Result<(), ListenerError> + 'static,
    {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;

        let mut listener: Listener = Box::new(listener);
        if let Err(err) = listener() {
            tracing::warn!(coordinator = %self.name, error = %err, "listener failed");
        }
        self.listeners.push((id, listener));
        id
    }

    /// Returns whether the listener was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Processes a timer tick.
    pub fn heartbeat(&mut self, now: DateTime<Tz>) -> Result<UpdateOutcome, CoordinatorError> {
        tracing::debug!(coordinator = %self.name, %now, "heartbeat");
        self.update(now, Trigger::Heartbeat)
    }

    /// Processes a pushed condition result.
    ///
    /// An evaluation error stops measuring, the same as `false`.
    pub fn condition_changed(
        &mut self,
        now: DateTime<Tz>,
        result: Result<bool, ConditionError>,
    ) -> Result<UpdateOutcome, CoordinatorError> {
        let active = match result {
            Ok(active) => {
                tracing::debug!(coordinator = %self.name, active, "condition changed");
                active
            }
            Err(err) => {
                tracing::error!(
                    coordinator = %self.name,
                    error = %err,
                    "condition error; measuring stops"
                );
                false
            }
        };
        if self.condition.is_none() {
            tracing::warn!(
                coordinator = %self.name,
                "condition result received but no condition is configured"
            );
            return self.update(now, Trigger::Heartbeat);
        }
        self.condition = Some(active);
        self.condition_pending = true;
        self.update(now, Trigger::Condition)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meter(&self, name: &str) -> Option<&Meter> {
        self.meters.get(name)
    }

    /// Meters ordered by name.
    pub fn meters(&self) -> impl Iterator<Item = &Meter> {
        self.meters.values()
    }

    /// The last condition result, or measuring when none is configured.
    ///
    /// The time window is not part of it: this is what gets persisted, and
    /// it restores the condition on restart. Per-meter states show whether
    /// the window is currently open.
    pub fn status(&self) -> CoordinatorStatus {
        if self.condition.unwrap_or(true) {
            CoordinatorStatus::Measuring
        } else {
            CoordinatorStatus::Inactive
        }
    }

    pub const fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    fn update(
        &mut self,
        now: DateTime<Tz>,
        trigger: Trigger,
    ) -> Result<UpdateOutcome, CoordinatorError> {
        let input_value = match self.read_value() {
            Ok(value) => value,
            Err(err) => return Ok(UpdateOutcome::Skipped(err)),
        };

        // A window edge is only noticed on a tick, so with a window every
        // event re-pushes the effective condition.
        let push_condition = matches!(trigger, Trigger::Condition)
            || self.condition_pending
            || self.time_window.is_some();
        let condition = push_condition.then(|| self.effective_condition(now));
        let mut failures = Vec::new();
        for meter in self.meters.values_mut() {
            let result = match condition {
                Some(active) => meter.on_condition_change(now, input_value, active),
                None => meter.on_heartbeat(now, input_value),
            };
            if let Err(err) = result {
                tracing::error!(
                    coordinator = %self.name,
                    error = %err,
                    "meter rejected update"
                );
                failures.push(err);
            }
        }
        if push_condition {
            // Meters that rejected the condition get it again next time.
            self.condition_pending = !failures.is_empty();
        }

        self.notify_listeners();
        self.persist();
        match failures.into_iter().next() {
            Some(err) => Err(err.into()),
            None => Ok(UpdateOutcome::Applied { input_value }),
        }
    }

    fn effective_condition(&self, now: DateTime<Tz>) -> bool {
        let in_window = self
            .time_window
            .as_ref()
            .is_none_or(|window| window.is_active(&now));
        self.condition.unwrap_or(true) && in_window
    }

    fn read_value(&mut self) -> Result<f64, ReadError> {
        match self.source.read() {
            Ok(value) => {
                self.last_value = Some(value);
                Ok(value)
            }
            Err(err) => match self.last_value {
                Some(value) => {
                    tracing::warn!(
                        coordinator = %self.name,
                        error = %err,
                        fallback = value,
                        "reading failed; using last known value"
                    );
                    Ok(value)
                }
                None => {
                    tracing::warn!(
                        coordinator = %self.name,
                        error = %err,
                        "reading failed and no previous value; skipping update"
                    );
                    Err(err)
                }
            },
        }
    }

    fn notify_listeners(&mut self) {
        for (id, listener) in &mut self.listeners {
            if let Err(err) = listener() {
                tracing::warn!(
                    coordinator = %self.name,
                    listener = id.0,
                    error = %err,
                    "listener failed"
                );
            }
        }
    }

    fn persist(&mut self) {
        let state = StoredState {
            version: STATE_VERSION,
            status: self.status(),
            meters: self
                .meters
                .iter()
                .map(|(name, meter)| (name.clone(), meter.snapshot()))
                .collect(),
        };
        let result = state
            .to_value()
            .map_err(|err| err.to_string())
            .and_then(|value| self.store.save(&value).map_err(|err| err.to_string()));
        if let Err(err) = result {
            tracing::error!(
                coordinator = %self.name,
                error = %err,
                "saving state failed"
            );
        }
    }
}
