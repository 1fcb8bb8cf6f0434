//! Real-time fan-out of freshly appended ledger events.
//!
//! Push delivery is a cache-invalidation hint: it is at-least-once towards
//! the bus and lossy towards slow subscribers. Correctness lives in the
//! ledger; subscribers de-duplicate by `seq` and backfill through the query
//! endpoint after a reconnect or a lag signal.

use {model::events::BidEvent, tokio::sync::broadcast};

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "fanout")]
struct Metrics {
    /// Number of events published to the fan-out bus.
    events_published: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BidEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes stored events in emission order. Having no subscribers is
    /// not an error; neither is a subscriber lagging behind.
    pub fn publish(&self, events: &[BidEvent]) {
        for event in events {
            let _ = self.sender.send(event.clone());
        }
        Metrics::get()
            .events_published
            .inc_by(events.len() as u64);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BidEvent> {
        self.sender.subscribe()
    }
}
