// src/events/dispatcher.rs

//! Ordered, isolated fan-out of [`TestEvent`]s.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::TestEvent;

/// A client of the event stream.
///
/// Returning an error (or panicking) is logged and otherwise ignored: the
/// remaining subscribers still receive the event.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &TestEvent) -> anyhow::Result<()>;
}

impl<F> EventSubscriber for F
where
    F: Fn(&TestEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &TestEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Forwards every event into an unbounded channel.
///
/// Useful for async clients that prefer `recv().await` over callbacks.
/// Events emitted after the receiver is dropped are discarded.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<TestEvent>,
}

impl EventSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &TestEvent) -> anyhow::Result<()> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Entry = (SubscriptionId, Arc<dyn EventSubscriber>);

/// Publish/subscribe hub for lifecycle events.
///
/// Delivery is synchronous on the emitting thread. A single delivery gate
/// serializes emissions from the caller and the run worker, so every
/// subscriber observes one total order. Subscribers may subscribe or
/// unsubscribe from inside a handler but must not emit.
pub struct EventDispatcher {
    subscribers: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    delivery: Mutex<()>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            delivery: Mutex::new(()),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, subscriber));
        debug!(subscription = id.0, "event subscriber added");
        id
    }

    /// Subscribe a closure.
    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&TestEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Subscribe a channel and return its receiving end.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<TestEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(ChannelSubscriber { tx }));
        rx
    }

    /// Remove a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(sid, _)| *sid != id);
        entries.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries().len()
    }

    /// Deliver `event` to every current subscriber, in subscription order.
    pub fn emit(&self, event: TestEvent) {
        let _gate = self
            .delivery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Snapshot so handlers can (un)subscribe without deadlocking.
        let subscribers: Vec<Entry> = self.entries().iter().cloned().collect();

        debug!(
            event = event.name(),
            subscribers = subscribers.len(),
            "dispatching event"
        );

        for (id, subscriber) in subscribers {
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        subscription = id.0,
                        event = event.name(),
                        error = %err,
                        "event subscriber returned an error"
                    );
                }
                Err(_panic) => {
                    warn!(
                        subscription = id.0,
                        event = event.name(),
                        "event subscriber panicked"
                    );
                }
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
