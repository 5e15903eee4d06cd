use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use testloader::events::{EventDispatcher, EventSubscriber, TestEvent};

/// Subscriber that keeps every event it receives, in order.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<TestEvent>>,
    arrived: Notify,
}

impl EventRecorder {
    /// Create a recorder and subscribe it to `dispatcher`.
    pub fn attach(dispatcher: &EventDispatcher) -> Arc<Self> {
        let recorder = Arc::new(Self::default());
        dispatcher.subscribe(recorder.clone());
        recorder
    }

    pub fn events(&self) -> Vec<TestEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(TestEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Wait until at least `n` events named `name` have been recorded.
    ///
    /// Panics after five seconds.
    pub async fn wait_for_count(&self, name: &str, n: usize) {
        let wait = async {
            loop {
                let notified = self.arrived.notified();
                if self.count(name) >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {n} x {name}; saw {:?}", self.names()));
    }

    pub async fn wait_for(&self, name: &str) {
        self.wait_for_count(name, 1).await;
    }
}

impl EventSubscriber for EventRecorder {
    fn on_event(&self, event: &TestEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        self.arrived.notify_waiters();
        Ok(())
    }
}
