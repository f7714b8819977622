use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{SystemEvent, TelemetryEvent};
use crate::types::MetricEvent;

/// Bounded, non-blocking channel from translation call sites to the worker.
///
/// `emit` never waits: when the channel is full the event is dropped and
/// counted.
pub struct MetricsBus {
    tx: mpsc::Sender<TelemetryEvent>,
    dropped: Arc<AtomicU64>,
}

impl MetricsBus {
    /// Returns the bus and the receiver the worker drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    pub fn emit(&self, event: TelemetryEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn emit_translation(&self, event: MetricEvent) {
        self.emit(TelemetryEvent::Translation(event));
    }

    /// System events are best effort and not counted as drops.
    pub fn emit_system(&self, event: SystemEvent) {
        let _ = self.tx.try_send(TelemetryEvent::System(event));
    }

    /// Queues an `EventsDropped` notice. Returns false when the channel had
    /// no room for it either.
    pub fn emit_dropped_notification(&self, count: u64, reason: &str) -> bool {
        self.tx
            .try_send(TelemetryEvent::System(SystemEvent::EventsDropped {
                count,
                reason: reason.to_string(),
            }))
            .is_ok()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resets the drop counter and returns the previous value.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Clone for MetricsBus {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}
