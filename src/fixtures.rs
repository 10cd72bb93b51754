//! Shared test fixtures: a bounded counter domain.
//!
//! The counter holds a total between 0 and 10. Commands increment or
//! decrement it; every accepted command stages a `TotalSet` payload carrying
//! the new total. Used across the unit tests and the scenario tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::command::CommandWrapper;
use crate::error::{ApplyError, BoxError};
use crate::event::{Event, EventRecord};
use crate::executor::{Executor, ExecutorOptions, ScopedExecutor};
use crate::handler::{Handle, HandleScoped, Handler, ScopedHandler};
use crate::state::State;

/// Upper bound the counter may not exceed.
const BOUND: i64 = 10;

// --- State and event payloads ---

/// The counter snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CounterState {
    pub(crate) total: i64,
    pub(crate) version: u64,
}

/// Event payload: the counter's total was set to `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TotalSet {
    pub(crate) value: i64,
}

impl State for CounterState {
    fn version(&self) -> u64 {
        self.version
    }

    fn fold(&self, event: &dyn EventRecord) -> Result<Self, ApplyError> {
        match event.payload_as::<TotalSet>() {
            Some(set) => Ok(Self {
                total: set.value,
                version: event.sequence_number(),
            }),
            None => Err(ApplyError::UnhandledVariant {
                payload_type: event.payload_type(),
            }),
        }
    }
}

// --- Commands ---

#[derive(Debug, Clone)]
pub(crate) struct Increment;

#[derive(Debug, Clone)]
pub(crate) struct Decrement;

/// Command whose handler always fails with the carried text.
#[derive(Debug, Clone)]
pub(crate) struct CauseError {
    pub(crate) text: String,
}

/// Command no handler is registered for.
#[derive(Debug, Clone)]
pub(crate) struct NoHandler;

/// Domain-rule violations the counter operations can raise.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CounterViolation {
    #[error("total too high")]
    TooHigh,
    #[error("total too low")]
    TooLow,
}

// Domain operations: validate against the bound snapshot, then stage.
impl Aggregate<CounterState> {
    pub(crate) fn increment(&self) -> Result<(), CounterViolation> {
        if self.state().total >= BOUND {
            return Err(CounterViolation::TooHigh);
        }
        self.stage(TotalSet {
            value: self.state().total + 1,
        });
        Ok(())
    }

    pub(crate) fn decrement(&self) -> Result<(), CounterViolation> {
        if self.state().total <= 0 {
            return Err(CounterViolation::TooLow);
        }
        self.stage(TotalSet {
            value: self.state().total - 1,
        });
        Ok(())
    }
}

// --- Command handlers ---

pub(crate) struct IncrementHandler;

#[async_trait]
impl HandleScoped<CommandWrapper<Increment>, Aggregate<CounterState>> for IncrementHandler {
    async fn handle(
        &self,
        _wrapper: Arc<CommandWrapper<Increment>>,
        aggregate: Arc<Aggregate<CounterState>>,
    ) -> Result<(), BoxError> {
        aggregate.increment()?;
        Ok(())
    }
}

pub(crate) struct DecrementHandler;

#[async_trait]
impl HandleScoped<CommandWrapper<Decrement>, Aggregate<CounterState>> for DecrementHandler {
    async fn handle(
        &self,
        _wrapper: Arc<CommandWrapper<Decrement>>,
        aggregate: Arc<Aggregate<CounterState>>,
    ) -> Result<(), BoxError> {
        aggregate.decrement()?;
        Ok(())
    }
}

pub(crate) struct CauseErrorHandler;

#[async_trait]
impl HandleScoped<CommandWrapper<CauseError>, Aggregate<CounterState>> for CauseErrorHandler {
    async fn handle(
        &self,
        wrapper: Arc<CommandWrapper<CauseError>>,
        _aggregate: Arc<Aggregate<CounterState>>,
    ) -> Result<(), BoxError> {
        Err(wrapper.command.text.clone().into())
    }
}

// --- Event handlers ---

/// Read-model sink updated by [`TotalSetHandler`].
#[derive(Debug, Default)]
pub(crate) struct DataStore {
    total: Mutex<i64>,
}

impl DataStore {
    pub(crate) fn total(&self) -> i64 {
        *self.total.lock().unwrap()
    }
}

pub(crate) struct TotalSetHandler {
    pub(crate) store: Arc<DataStore>,
}

#[async_trait]
impl Handle<Event<TotalSet>> for TotalSetHandler {
    async fn handle(&self, event: Arc<Event<TotalSet>>) -> Result<(), BoxError> {
        *self.store.total.lock().unwrap() = event.data.value;
        Ok(())
    }
}

/// Append-only log fed by [`LogTotalSetHandler`].
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    entries: Mutex<Vec<String>>,
}

impl EventLog {
    pub(crate) fn add(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub(crate) fn get_all(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

pub(crate) struct LogTotalSetHandler {
    pub(crate) log: Arc<EventLog>,
}

#[async_trait]
impl Handle<Event<TotalSet>> for LogTotalSetHandler {
    async fn handle(&self, event: Arc<Event<TotalSet>>) -> Result<(), BoxError> {
        self.log.add(format!("set total to `{}`", event.data.value));
        Ok(())
    }
}

// --- Registration call sites ---

/// The command executor with all three command handlers registered.
pub(crate) fn command_executor() -> ScopedExecutor<Aggregate<CounterState>> {
    ScopedExecutor::new(
        [
            ScopedHandler::from_handle(IncrementHandler),
            ScopedHandler::from_handle(DecrementHandler),
            ScopedHandler::from_handle(CauseErrorHandler),
        ],
        ExecutorOptions::default(),
    )
}

/// The event executor with both `TotalSet` handlers registered.
pub(crate) fn event_executor(store: Arc<DataStore>, log: Arc<EventLog>) -> Executor {
    Executor::new(
        [
            Handler::from_handle(TotalSetHandler { store }),
            Handler::from_handle(LogTotalSetHandler { log }),
        ],
        ExecutorOptions::default(),
    )
}
