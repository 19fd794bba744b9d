use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct DispatcherMetrics {
    posted: AtomicU64,
    delivered: AtomicU64,
    unrouted: AtomicU64,
    dropped_on_shutdown: AtomicU64,
}

impl DispatcherMetrics {
    pub(crate) fn record_posted(&self) {
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, services: usize) {
        self.delivered.fetch_add(services as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, messages: usize) {
        self.dropped_on_shutdown
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            dropped_on_shutdown: self.dropped_on_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Counters observed at one point in time.
///
/// `delivered` counts service deliveries, so one message reaching three
/// services adds three.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatcherMetricsSnapshot {
    pub posted: u64,
    pub delivered: u64,
    pub unrouted: u64,
    pub dropped_on_shutdown: u64,
}
