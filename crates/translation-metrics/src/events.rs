use serde::{Deserialize, Serialize};

use crate::types::MetricEvent;

/// Everything that travels over the [`crate::bus::MetricsBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// A completed translation call waiting to be recorded.
    Translation(MetricEvent),
    System(SystemEvent),
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Translation(_) => "translation",
            Self::System(SystemEvent::EventsDropped { .. }) => "system.events_dropped",
            Self::System(SystemEvent::StorageError { .. }) => "system.storage_error",
            Self::System(SystemEvent::WorkerStarted) => "system.worker_started",
            Self::System(SystemEvent::WorkerStopped) => "system.worker_stopped",
        }
    }
}

/// Operational events about the monitor itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SystemEvent {
    EventsDropped {
        count: u64,
        reason: String,
    },
    StorageError {
        error: String,
        event_id: String,
        service_name: String,
    },
    WorkerStarted,
    WorkerStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_events_survive_json() {
        let event = TelemetryEvent::Translation(
            MetricEvent::new("deepl", "translate", false, 3.5).with_error("quota exceeded"),
        );

        let json = serde_json::to_string(&event).expect("serialize");
        let decoded: TelemetryEvent = serde_json::from_str(&json).expect("deserialize");

        match decoded {
            TelemetryEvent::Translation(decoded) => {
                assert_eq!(decoded.service_name, "deepl");
                assert_eq!(decoded.error_message.as_deref(), Some("quota exceeded"));
            }
            other => panic!("expected a translation event, got {}", other.kind()),
        }
    }

    #[test]
    fn kinds_are_stable_names() {
        let dropped = TelemetryEvent::System(SystemEvent::EventsDropped {
            count: 3,
            reason: "channel full".to_string(),
        });
        assert_eq!(dropped.kind(), "system.events_dropped");
    }
}
