//! The per-cycle aggregate: the scope object command handlers execute
//! against.

use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::event::{Event, EventRecord};
use crate::state::State;

/// Staged payload entry: the payload's name plus the closure that wraps it
/// into a concrete `Event<P>` once the manager assigns attribution and a
/// sequence number.
///
/// The closure is the monomorphization point: it is built where the
/// concrete payload type is still known, so the erased staging list can
/// still produce typed, dispatchable records.
pub(crate) struct Staged {
    pub(crate) payload_type: &'static str,
    pub(crate) wrap: Box<dyn FnOnce(String, u64) -> Arc<dyn EventRecord> + Send>,
}

/// Scope object for one command cycle.
///
/// Created fresh by the [`Manager`](crate::Manager) for every command,
/// bound to the state current at that moment, and discarded when the cycle
/// ends. Domain operations follow a two-phase contract:
///
/// 1. validate the requested change against [`state`](Aggregate::state);
///    on violation, fail without staging anything;
/// 2. on success, [`stage`](Aggregate::stage) one payload describing the
///    intended change.
///
/// The state is never mutated here -- staged payloads only take effect
/// when the manager folds them after the command dispatch completes.
/// Handlers for one command type run concurrently against the shared
/// aggregate, so the staging list synchronizes internally.
///
/// # Type Parameters
///
/// * `S` - The [`State`] type this aggregate stages changes for.
#[derive(Debug)]
pub struct Aggregate<S: State> {
    state: S,
    staged: Mutex<Vec<Staged>>,
}

impl<S: State> Aggregate<S> {
    /// Bind a fresh aggregate to the given state snapshot.
    pub fn new(state: S) -> Self {
        Self {
            state,
            staged: Mutex::new(Vec::new()),
        }
    }

    /// The state this aggregate was created from.
    ///
    /// Staged payloads are not reflected here; they are only folded into a
    /// new snapshot by the manager.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Stage one payload describing an intended change.
    ///
    /// Payloads are collected in call order; the manager wraps each as an
    /// [`Event`] with sequence numbers continuing from the current state
    /// version.
    pub fn stage<P>(&self, payload: P)
    where
        P: Any + Send + Sync,
    {
        let wrap = Box::new(move |user_id: String, sequence_number: u64| {
            Arc::new(Event::new(payload, user_id, sequence_number)) as Arc<dyn EventRecord>
        });

        self.staged
            .lock()
            .expect("staged list lock poisoned")
            .push(Staged {
                payload_type: std::any::type_name::<P>(),
                wrap,
            });
    }

    /// Number of payloads staged so far.
    pub fn staged_len(&self) -> usize {
        self.staged.lock().expect("staged list lock poisoned").len()
    }

    /// Drain the staged payloads in append order.
    pub(crate) fn take_staged(&self) -> Vec<Staged> {
        std::mem::take(&mut *self.staged.lock().expect("staged list lock poisoned"))
    }
}

impl std::fmt::Debug for Staged {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Staged")
            .field("payload_type", &self.payload_type)
            .finish()
    }
}
