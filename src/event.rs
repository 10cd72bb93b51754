//! Event records: the immutable, sequence-numbered output of a command
//! cycle.
//!
//! Events exist in two shapes. [`Event<T>`] is the concrete, typed record a
//! handler receives. [`EventRecord`] is its type-erased view, used wherever
//! heterogeneous events travel together (the manager's committed list, the
//! subscriber stream, state rehydration). The erased view still exposes the
//! payload for downcasting and keeps the concrete type reachable for
//! dispatch, so a subscriber's executor can route on `Event<T>`'s live type.

use std::any::{Any, TypeId};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of one committed change.
///
/// The sequence number equals the state version the fold of this event
/// produced: folding it is only legal when the state is at
/// `sequence_number - 1`.
///
/// # Type Parameters
///
/// * `T` - The payload type describing the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T> {
    /// The payload describing the change.
    pub data: T,
    /// Identity of the user whose command produced the event.
    pub user_id: String,
    /// Position of this event in the state's history, starting at 1.
    pub sequence_number: u64,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl<T> Event<T> {
    /// Build an event, stamping the current time.
    pub fn new(data: T, user_id: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            data,
            user_id: user_id.into(),
            sequence_number,
            recorded_at: Utc::now(),
        }
    }
}

impl<T> Event<T>
where
    T: Any + Send + Sync,
{
    /// Build an event and erase it to a shareable [`EventRecord`].
    ///
    /// Convenience for constructing rehydration inputs, e.g. for
    /// [`Manager::load_state`](crate::Manager::load_state).
    pub fn record(
        data: T,
        user_id: impl Into<String>,
        sequence_number: u64,
    ) -> Arc<dyn EventRecord> {
        Arc::new(Self::new(data, user_id, sequence_number))
    }
}

/// Type-erased view of a published [`Event<T>`].
pub trait EventRecord: Send + Sync {
    /// The payload, erased. Downcast to the concrete payload type to
    /// inspect it; `payload_as` on `dyn EventRecord` is the shorthand.
    fn payload(&self) -> &(dyn Any + Send + Sync);

    /// Name of the payload's concrete type.
    fn payload_type(&self) -> &'static str;

    /// [`TypeId`] of the payload's concrete type.
    fn payload_type_id(&self) -> TypeId;

    /// Identity of the user whose command produced the event.
    fn user_id(&self) -> &str;

    /// Position of this event in the state's history, starting at 1.
    fn sequence_number(&self) -> u64;

    /// When the event was recorded.
    fn recorded_at(&self) -> DateTime<Utc>;

    /// Recover the concrete `Event<T>` as a dispatchable value.
    ///
    /// The returned `Arc` keys executor dispatch on the record's live
    /// `Event<T>` type, which is how a subscriber routes records to
    /// handlers registered for specific payloads.
    fn into_dispatchable(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl dyn EventRecord + '_ {
    /// Downcast the payload to a concrete type.
    pub fn payload_as<P: Any>(&self) -> Option<&P> {
        self.payload().downcast_ref::<P>()
    }
}

impl std::fmt::Debug for dyn EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("payload_type", &self.payload_type())
            .field("user_id", &self.user_id())
            .field("sequence_number", &self.sequence_number())
            .field("recorded_at", &self.recorded_at())
            .finish()
    }
}

impl<T> EventRecord for Event<T>
where
    T: Any + Send + Sync,
{
    fn payload(&self) -> &(dyn Any + Send + Sync) {
        &self.data
    }

    fn payload_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn payload_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    fn into_dispatchable(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
