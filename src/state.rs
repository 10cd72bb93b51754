//! State snapshots: immutable, versioned fold targets for event records.

use std::sync::Arc;

use crate::error::ApplyError;
use crate::event::EventRecord;

/// An immutable state snapshot derived from an event history.
///
/// The implementing type itself serves as the snapshot. New snapshots are
/// produced only by [`fold`](State::fold) and construction; there is no
/// mutator. `Default` is the zero-value snapshot at version 0 that
/// rehydration starts from.
///
/// # Contract
///
/// - [`fold`](State::fold) must be a pure function of the current snapshot
///   and one event. It dispatches on the event's payload type and returns
///   the next snapshot, whose [`version`](State::version) must equal the
///   event's sequence number. A payload type with no fold rule is a
///   configuration fault: return [`ApplyError::UnhandledVariant`], never
///   skip silently.
/// - [`apply`](State::apply) is provided and should not be overridden: it
///   enforces the sequence invariant around `fold`.
pub trait State: Default + Clone + Send + Sync + 'static {
    /// The version of this snapshot: the sequence number of the last event
    /// folded into it, or 0 for the zero-value snapshot.
    fn version(&self) -> u64;

    /// Fold a single event into the next snapshot.
    ///
    /// The event's sequence number has already been validated against this
    /// snapshot's version; use it as the next snapshot's version.
    fn fold(&self, event: &dyn EventRecord) -> Result<Self, ApplyError>;

    /// Fold events in the order given, enforcing the sequence invariant.
    ///
    /// Each event's sequence number must equal the running version plus
    /// one; gaps, duplicates, and reordering are rejected. The fold is
    /// total-order-sensitive: the intermediate snapshot is threaded through
    /// every step, so applying `[e1, e2]` equals applying `e1` then `e2`.
    ///
    /// # Errors
    ///
    /// * [`ApplyError::SequenceViolation`] -- an event is out of sequence;
    ///   the snapshot the caller holds is unchanged.
    /// * [`ApplyError::UnhandledVariant`] -- no fold rule for an event's
    ///   payload type.
    fn apply<I>(self, events: I) -> Result<Self, ApplyError>
    where
        I: IntoIterator<Item = Arc<dyn EventRecord>>,
    {
        let mut state = self;
        let mut expected = state.version();
        for event in events {
            expected += 1;
            let actual = event.sequence_number();
            if actual != expected {
                return Err(ApplyError::SequenceViolation { expected, actual });
            }
            state = state.fold(event.as_ref())?;
        }
        Ok(state)
    }
}
