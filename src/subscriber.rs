//! Executor-backed subscriber: best-effort side-channel reactions to
//! published events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::event::EventRecord;
use crate::executor::Executor;
use crate::stream::Observer;

/// A subscriber that routes each received record through its own scope-less
/// [`Executor`] and then records it.
///
/// Dispatch keys on the record's concrete `Event<T>` type, so handlers
/// registered for specific payload wrappers react to exactly those events;
/// records without a matching handler pass through (subject to the
/// executor's options) and are still recorded.
///
/// A record whose dispatch fails is not recorded; whether the failure
/// reaches the publisher is the stream's
/// [`DeliveryPolicy`](crate::DeliveryPolicy) decision.
pub struct Subscriber {
    handlers: Executor,
    received: Mutex<Vec<Arc<dyn EventRecord>>>,
}

impl Subscriber {
    /// Create a subscriber around the given event executor.
    pub fn new(handlers: Executor) -> Self {
        Self {
            handlers,
            received: Mutex::new(Vec::new()),
        }
    }

    /// The records received so far, in delivery order.
    pub fn events(&self) -> Vec<Arc<dyn EventRecord>> {
        self.received
            .lock()
            .expect("received list lock poisoned")
            .clone()
    }
}

#[async_trait]
impl Observer for Subscriber {
    async fn on_event(&self, event: Arc<dyn EventRecord>) -> Result<(), DispatchError> {
        self.handlers
            .execute_arc(Arc::clone(&event).into_dispatchable())
            .await?;
        self.received
            .lock()
            .expect("received list lock poisoned")
            .push(event);
        Ok(())
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("handlers", &self.handlers)
            .field("received", &self.events().len())
            .finish()
    }
}
