//! The manager: one full command -> event cycle per call.
//!
//! A manager owns the current state snapshot and orchestrates each command:
//! it creates a fresh [`Aggregate`] bound to the current state, dispatches
//! the wrapped command through the injected scoped executor, wraps the
//! aggregate's staged payloads into sequenced events, folds them into a new
//! snapshot, and publishes them to the subscriber stream. Cycles for one
//! manager never overlap; callers may still issue commands concurrently --
//! the cycles queue on the internal state lock and command sequence numbers
//! are allocated atomically.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::aggregate::Aggregate;
use crate::command::CommandWrapper;
use crate::error::{ApplyError, ExecuteError};
use crate::event::EventRecord;
use crate::executor::ScopedExecutor;
use crate::state::State;
use crate::stream::{DeliveryPolicy, EventStream};

/// Builder for [`Manager`].
///
/// The command executor is required; the delivery policy defaults to
/// [`DeliveryPolicy::Isolate`].
#[derive(Debug)]
pub struct ManagerBuilder<S: State> {
    handlers: ScopedExecutor<Aggregate<S>>,
    delivery: DeliveryPolicy,
}

impl<S: State> ManagerBuilder<S> {
    /// Set the policy applied when a subscriber rejects a published event.
    pub fn delivery(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery = policy;
        self
    }

    /// Build the manager with a zero-value state at version 0.
    pub fn build(self) -> Manager<S> {
        Manager {
            handlers: self.handlers,
            state: tokio::sync::Mutex::new(S::default()),
            command_sequence: AtomicU64::new(0),
            stream: EventStream::new(self.delivery),
            committed: Mutex::new(Vec::new()),
        }
    }
}

/// Orchestrates command cycles against one logical aggregate instance.
///
/// Construct once per logical session; the executor is injected and may be
/// shared. All methods take `&self`, so a manager is usable as a singleton
/// behind an `Arc` or as a cheap per-request value.
///
/// # Type Parameters
///
/// * `S` - The [`State`] type the manager folds events into.
pub struct Manager<S: State> {
    handlers: ScopedExecutor<Aggregate<S>>,
    /// Current snapshot. The lock is held for a whole command cycle so a
    /// cycle's fold and publish finish before the next cycle reads the
    /// state, preserving the event sequence invariant under concurrent
    /// callers.
    state: tokio::sync::Mutex<S>,
    command_sequence: AtomicU64,
    stream: EventStream,
    committed: Mutex<Vec<Arc<dyn EventRecord>>>,
}

impl<S: State> Manager<S> {
    /// Create a manager with default options.
    pub fn new(handlers: ScopedExecutor<Aggregate<S>>) -> Self {
        Self::builder(handlers).build()
    }

    /// Start building a manager around the given command executor.
    pub fn builder(handlers: ScopedExecutor<Aggregate<S>>) -> ManagerBuilder<S> {
        ManagerBuilder {
            handlers,
            delivery: DeliveryPolicy::default(),
        }
    }

    /// Execute one command cycle.
    ///
    /// Wraps the command with the issuing user and the next command
    /// sequence number, dispatches it against a fresh aggregate, then
    /// converts staged payloads into events numbered from the current state
    /// version plus one. The state is replaced only after every fold
    /// succeeds; each event is then published in applied order.
    ///
    /// # Returns
    ///
    /// The event records produced by the command, in applied order. A
    /// command that stages nothing produces no events and returns an empty
    /// list.
    ///
    /// # Errors
    ///
    /// * [`ExecuteError::Dispatch`] -- the handler failed or was missing
    ///   under strict options; the state is untouched and the error carries
    ///   the attempted command wrapper.
    /// * [`ExecuteError::Apply`] -- a derived event failed to fold; the
    ///   state is untouched. Indicates an internal consistency fault.
    /// * [`ExecuteError::Subscriber`] -- a subscriber rejected a published
    ///   event under [`DeliveryPolicy::Propagate`]; the state has already
    ///   advanced.
    pub async fn execute<C>(
        &self,
        command: C,
        user_id: impl Into<String>,
    ) -> Result<Vec<Arc<dyn EventRecord>>, ExecuteError>
    where
        C: Any + Send + Sync,
    {
        let user_id = user_id.into();

        // Serialize the whole cycle: no other command may fold or publish
        // between this one's dispatch and its publish.
        let mut state = self.state.lock().await;

        let sequence = self.command_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            user_id = %user_id,
            command_sequence = sequence,
            "dispatching command"
        );

        let aggregate = Arc::new(Aggregate::new(state.clone()));
        let wrapper = CommandWrapper::new(command, user_id.clone(), sequence);
        self.handlers
            .execute(wrapper, Arc::clone(&aggregate))
            .await?;

        let staged = aggregate.take_staged();
        if staged.is_empty() {
            return Ok(Vec::new());
        }

        let mut version = state.version();
        let mut records: Vec<Arc<dyn EventRecord>> = Vec::with_capacity(staged.len());
        for entry in staged {
            version += 1;
            tracing::trace!(
                payload_type = entry.payload_type,
                sequence_number = version,
                "wrapping staged payload"
            );
            records.push((entry.wrap)(user_id.clone(), version));
        }

        // Fold every event before the snapshot is replaced; a fold failure
        // leaves the pre-command state in place.
        let next = state.clone().apply(records.iter().cloned())?;
        *state = next;
        tracing::debug!(
            count = records.len(),
            version,
            "events applied"
        );

        // Publish only after the fold succeeded, so subscribers never
        // observe an event that is not reflected in the state.
        for record in &records {
            self.stream
                .publish(Arc::clone(record))
                .await
                .map_err(|source| ExecuteError::Subscriber { source })?;
            self.committed
                .lock()
                .expect("committed list lock poisoned")
                .push(Arc::clone(record));
        }

        Ok(records)
    }

    /// Rebuild the state from an ordered event history.
    ///
    /// Folds the events over a brand-new zero-value state under the same
    /// sequence invariant as command cycles: the first event must carry
    /// sequence number 1. On success the current state is replaced
    /// wholesale; nothing is published and the committed list is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] if the supplied history is out of sequence or
    /// contains an unfoldable payload; the current state is kept.
    pub async fn load_state<I>(&self, events: I) -> Result<(), ApplyError>
    where
        I: IntoIterator<Item = Arc<dyn EventRecord>>,
    {
        let mut state = self.state.lock().await;
        let loaded = S::default().apply(events)?;
        tracing::info!(version = loaded.version(), "state loaded");
        *state = loaded;
        Ok(())
    }

    /// A clone of the current state snapshot.
    pub async fn state(&self) -> S {
        self.state.lock().await.clone()
    }

    /// The stream publishing this manager's events; subscribe here.
    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    /// The events committed by command cycles, in publish order.
    ///
    /// Rehydration via [`load_state`](Manager::load_state) does not add to
    /// this list; it only contains events this manager produced.
    pub fn events(&self) -> Vec<Arc<dyn EventRecord>> {
        self.committed
            .lock()
            .expect("committed list lock poisoned")
            .clone()
    }
}

impl<S: State> std::fmt::Debug for Manager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("handlers", &self.handlers)
            .field(
                "command_sequence",
                &self.command_sequence.load(Ordering::Relaxed),
            )
            .finish()
    }
}
