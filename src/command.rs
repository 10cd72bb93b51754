//! Command envelope types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable, user-attributed request to change state.
///
/// One wrapper is created per dispatched command. The sequence number is
/// assigned by the [`Manager`](crate::Manager) from its process-local
/// counter (monotonic, starting at 1) and is independent of event sequence
/// numbers.
///
/// Handlers receive the wrapper behind an `Arc`, so the fields are plain
/// public data: there is no way to mutate a dispatched wrapper.
///
/// # Type Parameters
///
/// * `C` - The concrete command type. Dispatch keys on
///   `CommandWrapper<C>`'s type, so each command type routes to its own
///   handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandWrapper<C> {
    /// The wrapped command.
    pub command: C,
    /// Identity of the user issuing the command.
    pub user_id: String,
    /// Manager-assigned command sequence number, starting at 1.
    pub sequence_number: u64,
    /// When the wrapper was created.
    pub issued_at: DateTime<Utc>,
}

impl<C> CommandWrapper<C> {
    /// Wrap a command, stamping the current time.
    pub fn new(command: C, user_id: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            command,
            user_id: user_id.into(),
            sequence_number,
            issued_at: Utc::now(),
        }
    }
}
