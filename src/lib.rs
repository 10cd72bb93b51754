//! Type-indexed multicast dispatch for event-sourced aggregates.
//!
//! Commands are routed through an immutable [`Executor`] to handlers that
//! stage changes on a transient [`Aggregate`]; the [`Manager`] wraps staged
//! changes into sequenced [`Event`]s, folds them into an immutable
//! [`State`] snapshot, and publishes them to [`Subscriber`]s.

mod aggregate;
pub use aggregate::Aggregate;
mod command;
pub use command::CommandWrapper;
mod error;
pub use error::{ApplyError, BoxError, DispatchError, ExecuteError};
mod event;
pub use event::{Event, EventRecord};
mod executor;
pub use executor::{Executor, ExecutorOptions, ScopedExecutor};
mod handler;
pub use handler::{Handle, HandleScoped, Handler, ScopedHandler};
mod manager;
pub use manager::{Manager, ManagerBuilder};
mod state;
pub use state::State;
mod stream;
pub use stream::{DeliveryPolicy, EventStream, Observer, Subscription};
mod subscriber;
pub use subscriber::Subscriber;

#[cfg(test)]
pub(crate) mod fixtures;
