use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::MetricsContext;
use crate::events::{SystemEvent, TelemetryEvent};

/// Drains the bus into [`MetricsContext::record`].
pub struct MetricsWorker {
    context: Arc<MetricsContext>,
}

impl MetricsWorker {
    pub fn new(context: Arc<MetricsContext>) -> Self {
        Self { context }
    }

    /// Runs until `cancel` fires or every sender is gone. Events already
    /// queued at cancellation are still recorded.
    pub fn spawn(
        self,
        mut receiver: mpsc::Receiver<TelemetryEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("MetricsWorker started");
            self.context.bus().emit_system(SystemEvent::WorkerStarted);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = receiver.recv() => match next {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            info!("MetricsWorker channel closed");
                            break;
                        }
                    },
                }
            }

            receiver.close();
            while let Ok(event) = receiver.try_recv() {
                self.dispatch(event).await;
            }
            self.report_drops();

            info!("MetricsWorker stopped");
        })
    }

    async fn dispatch(&self, event: TelemetryEvent) {
        let kind = event.kind();
        if let Err(e) = self.handle_event(event).await {
            warn!("Failed to handle {} event: {}", kind, e);
        }
        self.report_drops();
    }

    async fn handle_event(&self, event: TelemetryEvent) -> anyhow::Result<()> {
        match event {
            TelemetryEvent::Translation(metric) => {
                if metric.service_name.trim().is_empty() {
                    anyhow::bail!("event {} has no service name", metric.event_id);
                }
                self.context.record(metric).await;
            }
            TelemetryEvent::System(system_event) => match system_event {
                SystemEvent::WorkerStarted => info!("System: WorkerStarted"),
                SystemEvent::WorkerStopped => info!("System: WorkerStopped"),
                SystemEvent::EventsDropped { count, reason } => {
                    warn!("System: EventsDropped - {} events, reason: {}", count, reason);
                }
                SystemEvent::StorageError {
                    error: message,
                    event_id,
                    service_name,
                } => {
                    error!(
                        "System: StorageError for event {} ({}) - {}",
                        event_id, service_name, message
                    );
                }
            },
        }
        Ok(())
    }

    /// Forwards the drop count as a system event, or logs it when the bus
    /// cannot take the notice.
    fn report_drops(&self) {
        let bus = self.context.bus();
        let dropped = bus.take_dropped();
        if dropped > 0 && !bus.emit_dropped_notification(dropped, "channel full") {
            warn!("System: EventsDropped - {} events, reason: channel full", dropped);
        }
    }
}
