//! Crate-level error types for dispatch, event application, and command cycles.

use std::any::Any;
use std::sync::Arc;

/// Boxed error type accepted from handler callables.
///
/// Handlers produce heterogeneous domain failures (one executor routes many
/// data types), so the domain error is erased here and preserved as the
/// `source()` of [`DispatchError::HandlerFailed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned when dispatching a value through an executor fails.
#[derive(thiserror::Error)]
pub enum DispatchError {
    /// No handler is registered for the dispatched type and the executor
    /// was built with `require_handlers`.
    ///
    /// Deliberately carries no payload; the caller knows what it sent and
    /// correlates by context.
    #[error("no handler registered for the dispatched type")]
    HandlerNotFound,

    /// A registered handler's callable returned a failure.
    ///
    /// Wraps the original failure together with the attempted value (and
    /// the scope, for scoped dispatch) so the caller can inspect what was
    /// being processed, not just the failure message.
    #[error("handler for `{attempted_type}` failed: {source}")]
    HandlerFailed {
        /// The value that was being dispatched, type-erased. Downcast to
        /// the concrete type to inspect it.
        attempted: Arc<dyn Any + Send + Sync>,
        /// Name of the attempted value's concrete type.
        attempted_type: &'static str,
        /// The scope passed alongside the value, for scoped dispatch.
        scope: Option<Arc<dyn Any + Send + Sync>>,
        /// The handler's underlying failure.
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    /// The value that was being dispatched when the failure occurred.
    ///
    /// `None` for [`DispatchError::HandlerNotFound`], which carries no data.
    pub fn attempted(&self) -> Option<&(dyn Any + Send + Sync)> {
        match self {
            Self::HandlerFailed { attempted, .. } => Some(attempted.as_ref()),
            Self::HandlerNotFound => None,
        }
    }

    /// The scope that was passed alongside the value, for scoped dispatch.
    pub fn scope(&self) -> Option<&(dyn Any + Send + Sync)> {
        match self {
            Self::HandlerFailed {
                scope: Some(scope), ..
            } => Some(scope.as_ref()),
            _ => None,
        }
    }
}

// Manual `Debug` because the attempted value and scope are `dyn Any`.
impl std::fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandlerNotFound => f.debug_struct("HandlerNotFound").finish(),
            Self::HandlerFailed {
                attempted_type,
                scope,
                source,
                ..
            } => f
                .debug_struct("HandlerFailed")
                .field("attempted_type", attempted_type)
                .field("scoped", &scope.is_some())
                .field("source", source)
                .finish(),
        }
    }
}

/// Error returned when folding events into a state snapshot fails.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// An event's sequence number does not match `version + 1`.
    ///
    /// Rejects out-of-order, gapped, and duplicate application. This is a
    /// data-integrity fault, never silently corrected.
    #[error("unexpected sequence number {actual}, expected {expected}")]
    SequenceViolation {
        /// The sequence number the fold required.
        expected: u64,
        /// The sequence number the event carried.
        actual: u64,
    },

    /// The state has no fold rule for the event's payload type.
    ///
    /// A configuration fault (a payload was staged that the state cannot
    /// fold), distinct from runtime data errors.
    #[error("no fold rule for event payload `{payload_type}`")]
    UnhandledVariant {
        /// Name of the payload's concrete type.
        payload_type: &'static str,
    },
}

/// Error returned when executing a command cycle against a manager fails.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// Command dispatch failed; the cycle aborted with the state untouched.
    ///
    /// Carries the handler failure or handler-not-found signal unchanged,
    /// including the attempted command wrapper.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An event derived from the aggregate failed to fold.
    ///
    /// The manager numbers events itself, so this indicates an internal
    /// consistency fault rather than a recoverable caller error. The state
    /// is left at its pre-command value.
    #[error("event fold failed after dispatch: {0}")]
    Apply(#[from] ApplyError),

    /// A subscriber rejected a published event under
    /// [`DeliveryPolicy::Propagate`](crate::DeliveryPolicy::Propagate).
    ///
    /// The state has already advanced when this is returned; only the
    /// remaining deliveries of the batch were skipped.
    #[error("subscriber rejected a published event: {source}")]
    Subscriber {
        /// The failing subscriber's dispatch error.
        #[source]
        source: DispatchError,
    },
}
