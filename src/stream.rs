//! Broadcast stream of published event records.
//!
//! An explicit subscriber registry rather than a channel: subscribers are
//! held in subscription order and each published record is delivered to
//! every live subscriber, one at a time, in that order. Subscribing returns
//! a [`Subscription`] token; dropping it (or calling
//! [`unsubscribe`](Subscription::unsubscribe)) removes the subscriber, and
//! once removal returns no further records are delivered to it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::event::EventRecord;

/// A consumer of published event records.
///
/// Implemented by [`Subscriber`](crate::Subscriber) for executor-backed
/// reactions; custom observers (projections, loggers) implement it
/// directly.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Receive one published record.
    ///
    /// Records arrive in publish order, one at a time. Returning `Err`
    /// marks the delivery as failed; what happens next is governed by the
    /// stream's [`DeliveryPolicy`].
    async fn on_event(&self, event: Arc<dyn EventRecord>) -> Result<(), DispatchError>;
}

/// What a failed delivery does to the rest of the publish loop.
///
/// Set via [`ManagerBuilder::delivery`](crate::ManagerBuilder::delivery).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// A subscriber's failure is logged and delivery continues to the
    /// remaining subscribers. The failure never reaches the publisher.
    #[default]
    Isolate,
    /// The first subscriber failure aborts the remaining deliveries of the
    /// batch and surfaces to the publisher as
    /// [`ExecuteError::Subscriber`](crate::ExecuteError::Subscriber).
    Propagate,
}

struct StreamInner {
    /// Live subscribers in subscription order. `BTreeMap` keeps delivery
    /// order stable under interleaved subscribe/unsubscribe.
    subscribers: Mutex<BTreeMap<u64, Arc<dyn Observer>>>,
    next_id: AtomicU64,
    policy: DeliveryPolicy,
}

/// Broadcast stream of published event records.
///
/// Owned by a [`Manager`](crate::Manager); obtain it via
/// [`Manager::stream`](crate::Manager::stream) and attach observers with
/// [`subscribe`](EventStream::subscribe).
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<StreamInner>,
}

impl EventStream {
    /// Create an empty stream with the given delivery policy.
    pub(crate) fn new(policy: DeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
                policy,
            }),
        }
    }

    /// Attach an observer; it receives every record published after this
    /// call returns, in publish order, until the returned token is
    /// disposed.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("subscriber registry lock poisoned")
            .insert(id, observer);

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .expect("subscriber registry lock poisoned")
            .len()
    }

    /// Deliver one record to every live subscriber, in subscription order.
    ///
    /// # Errors
    ///
    /// Under [`DeliveryPolicy::Propagate`], returns the first subscriber's
    /// failure; subscribers after it are skipped for this record. Under
    /// [`DeliveryPolicy::Isolate`], never fails.
    pub(crate) async fn publish(&self, event: Arc<dyn EventRecord>) -> Result<(), DispatchError> {
        // Snapshot under the lock, deliver outside it: delivery awaits
        // subscriber handlers and must not hold the registry lock.
        let subscribers: Vec<Arc<dyn Observer>> = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber registry lock poisoned")
            .values()
            .cloned()
            .collect();

        for observer in subscribers {
            if let Err(error) = observer.on_event(Arc::clone(&event)).await {
                match self.inner.policy {
                    DeliveryPolicy::Isolate => {
                        tracing::warn!(
                            sequence_number = event.sequence_number(),
                            %error,
                            "subscriber failed, delivery continues"
                        );
                    }
                    DeliveryPolicy::Propagate => return Err(error),
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscriber_count())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

/// Disposable subscription token.
///
/// Dropping the token (or calling [`unsubscribe`](Subscription::unsubscribe))
/// removes the subscriber from the stream; once removal returns, no further
/// records are delivered to it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    inner: Weak<StreamInner>,
}

impl Subscription {
    /// Detach the subscriber now, by value.
    ///
    /// Equivalent to dropping the token; provided so call sites can make
    /// the intent explicit.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            // Stream already gone; nothing to detach from.
            return;
        };
        if let Ok(mut subscribers) = inner.subscribers.lock() {
            subscribers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::event::Event;
    use crate::fixtures::TotalSet;

    /// Observer that records sequence numbers, optionally failing.
    struct Probe {
        seen: Mutex<Vec<u64>>,
        fail: bool,
    }

    impl Probe {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn seen(&self) -> Vec<u64> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Observer for Probe {
        async fn on_event(&self, event: Arc<dyn EventRecord>) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::HandlerFailed {
                    attempted: Arc::new(()),
                    attempted_type: "()",
                    scope: None,
                    source: "probe failure".into(),
                });
            }
            self.seen.lock().unwrap().push(event.sequence_number());
            Ok(())
        }
    }

    fn record(sequence: u64) -> Arc<dyn EventRecord> {
        Event::record(TotalSet { value: 0 }, "test", sequence)
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_in_order() {
        let stream = EventStream::new(DeliveryPolicy::Isolate);
        let first = Probe::new(false);
        let second = Probe::new(false);
        let _a = stream.subscribe(first.clone());
        let _b = stream.subscribe(second.clone());

        stream.publish(record(1)).await.expect("publish should succeed");
        stream.publish(record(2)).await.expect("publish should succeed");

        assert_eq!(first.seen(), vec![1, 2]);
        assert_eq!(second.seen(), vec![1, 2]);
    }

    #[tokio::test]
    async fn disposal_stops_delivery() {
        let stream = EventStream::new(DeliveryPolicy::Isolate);
        let probe = Probe::new(false);
        let subscription = stream.subscribe(probe.clone());

        stream.publish(record(1)).await.expect("publish should succeed");
        subscription.unsubscribe();
        stream.publish(record(2)).await.expect("publish should succeed");

        assert_eq!(probe.seen(), vec![1], "no delivery after disposal");
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn drop_is_equivalent_to_unsubscribe() {
        let stream = EventStream::new(DeliveryPolicy::Isolate);
        let probe = Probe::new(false);
        {
            let _subscription = stream.subscribe(probe.clone());
            stream.publish(record(1)).await.expect("publish should succeed");
        }
        stream.publish(record(2)).await.expect("publish should succeed");

        assert_eq!(probe.seen(), vec![1]);
    }

    #[tokio::test]
    async fn isolate_swallows_subscriber_failure() {
        let stream = EventStream::new(DeliveryPolicy::Isolate);
        let failing = Probe::new(true);
        let healthy = Probe::new(false);
        let _a = stream.subscribe(failing);
        let _b = stream.subscribe(healthy.clone());

        stream
            .publish(record(1))
            .await
            .expect("isolated failure must not surface");
        assert_eq!(healthy.seen(), vec![1], "later subscribers still receive");
    }

    #[tokio::test]
    async fn propagate_aborts_remaining_deliveries() {
        let stream = EventStream::new(DeliveryPolicy::Propagate);
        let failing = Probe::new(true);
        let healthy = Probe::new(false);
        let _a = stream.subscribe(failing);
        let _b = stream.subscribe(healthy.clone());

        let err = stream
            .publish(record(1))
            .await
            .expect_err("failure should propagate");
        assert!(err.to_string().contains("probe failure"));
        assert!(healthy.seen().is_empty(), "later subscribers are skipped");
    }

    #[tokio::test]
    async fn subscription_outliving_the_stream_is_harmless() {
        let probe = Probe::new(false);
        let subscription = {
            let stream = EventStream::new(DeliveryPolicy::Isolate);
            stream.subscribe(probe.clone())
        };
        // The stream is gone; disposing the token must not panic.
        drop(subscription);
    }
}
