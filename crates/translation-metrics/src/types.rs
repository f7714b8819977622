use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one completed translation call.
///
/// Events are immutable once recorded. The builder methods enforce the
/// record-level invariants: an error message is only kept on failed calls,
/// the cost estimate is never negative and the confidence score stays in
/// `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub service_name: String,
    pub operation_type: String,
    pub model: Option<String>,
    pub success: bool,
    /// Seconds.
    pub response_time: f64,
    pub input_length: u64,
    pub output_length: u64,
    pub confidence_score: f64,
    pub error_message: Option<String>,
    pub cost_estimate: f64,
}

impl MetricEvent {
    pub fn new(
        service_name: impl Into<String>,
        operation_type: impl Into<String>,
        success: bool,
        response_time: f64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            service_name: service_name.into(),
            operation_type: operation_type.into(),
            model: None,
            success,
            response_time: non_negative(response_time),
            input_length: 0,
            output_length: 0,
            confidence_score: 0.0,
            error_message: None,
            cost_estimate: 0.0,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_lengths(mut self, input_length: u64, output_length: u64) -> Self {
        self.input_length = input_length;
        self.output_length = output_length;
        self
    }

    pub fn with_confidence(mut self, confidence_score: f64) -> Self {
        self.confidence_score = if confidence_score.is_finite() {
            confidence_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Ignored on successful events.
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        if !self.success {
            self.error_message = Some(error_message.into());
        }
        self
    }

    pub fn with_cost(mut self, cost_estimate: f64) -> Self {
        self.cost_estimate = non_negative(cost_estimate);
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Derived point-in-time health view of one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceHealthStatus {
    pub service_name: String,
    pub is_healthy: bool,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub error_count: u64,
    pub total_requests: u64,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl ServiceHealthStatus {
    pub fn empty(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            is_healthy: false,
            success_rate: 0.0,
            avg_response_time: 0.0,
            error_count: 0,
            total_requests: 0,
            last_error: None,
            last_success_at: None,
            last_error_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    HighResponseTime,
    HighErrorRate,
    ServiceUnhealthy,
    IngestionFailure,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighResponseTime => "high_response_time",
            Self::HighErrorRate => "high_error_rate",
            Self::ServiceUnhealthy => "service_unhealthy",
            Self::IngestionFailure => "ingestion_failure",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "high_response_time" => Some(Self::HighResponseTime),
            "high_error_rate" => Some(Self::HighErrorRate),
            "service_unhealthy" => Some(Self::ServiceUnhealthy),
            "ingestion_failure" => Some(Self::IngestionFailure),
            _ => None,
        }
    }

    /// Severity is a function of the threshold that fired.
    pub fn severity(self) -> AlertSeverity {
        match self {
            Self::HighResponseTime => AlertSeverity::Warning,
            Self::HighErrorRate | Self::ServiceUnhealthy | Self::IngestionFailure => {
                AlertSeverity::Critical
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlertState {
    Open,
    /// Raised inside the cooldown window of an earlier alert with the same
    /// service and type.
    Suppressed,
    Resolved { at: DateTime<Utc> },
}

impl AlertState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Suppressed => "suppressed",
            Self::Resolved { .. } => "resolved",
        }
    }

    pub fn from_db(value: &str, resolved_at: Option<DateTime<Utc>>) -> Option<Self> {
        match (value, resolved_at) {
            ("open", _) => Some(Self::Open),
            ("suppressed", _) => Some(Self::Suppressed),
            ("resolved", Some(at)) => Some(Self::Resolved { at }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub alert_id: String,
    pub service_name: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub state: AlertState,
}

impl Alert {
    pub fn new(
        service_name: impl Into<String>,
        alert_type: AlertType,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            service_name: service_name.into(),
            alert_type,
            severity: alert_type.severity(),
            message: message.into(),
            timestamp,
            state: AlertState::Open,
        }
    }

    pub fn resolved(&self) -> bool {
        matches!(self.state, AlertState::Resolved { .. })
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self.state, AlertState::Suppressed)
    }
}

/// Request counts and averages over some slice of events.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestStats {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub avg_confidence: f64,
    pub total_cost: f64,
}

impl RequestStats {
    /// Builds stats from raw sums; every ratio is 0 when there is no traffic.
    pub fn from_sums(
        success_count: u64,
        error_count: u64,
        response_time_sum: f64,
        confidence_sum: f64,
        total_cost: f64,
    ) -> Self {
        let total_requests = success_count + error_count;
        let (success_rate, avg_response_time, avg_confidence) = if total_requests == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let total = total_requests as f64;
            (
                success_count as f64 / total,
                response_time_sum / total,
                confidence_sum / total,
            )
        };

        Self {
            total_requests,
            success_count,
            error_count,
            success_rate,
            avg_response_time,
            avg_confidence,
            total_cost,
        }
    }

    pub fn response_time_sum(&self) -> f64 {
        self.avg_response_time * self.total_requests as f64
    }

    pub fn confidence_sum(&self) -> f64 {
        self.avg_confidence * self.total_requests as f64
    }

    /// Weighted merge of two slices.
    pub fn merge(&self, other: &RequestStats) -> RequestStats {
        RequestStats::from_sums(
            self.success_count + other.success_count,
            self.error_count + other.error_count,
            self.response_time_sum() + other.response_time_sum(),
            self.confidence_sum() + other.confidence_sum(),
            self.total_cost + other.total_cost,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyStatistics {
    pub date: NaiveDate,
    pub overall: RequestStats,
    pub by_service: BTreeMap<String, RequestStats>,
}

impl DailyStatistics {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            overall: RequestStats::default(),
            by_service: BTreeMap::new(),
        }
    }

    pub fn from_services(date: NaiveDate, by_service: BTreeMap<String, RequestStats>) -> Self {
        let overall = by_service
            .values()
            .fold(RequestStats::default(), |acc, stats| acc.merge(stats));
        Self {
            date,
            overall,
            by_service,
        }
    }

    pub fn has_traffic(&self) -> bool {
        self.overall.total_requests > 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_is_dropped_on_successful_events() {
        let event = MetricEvent::new("deepl", "translate", true, 1.0).with_error("boom");
        assert!(event.error_message.is_none());

        let failed = MetricEvent::new("deepl", "translate", false, 1.0).with_error("boom");
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn cost_and_confidence_are_clamped() {
        let event = MetricEvent::new("openai", "translate", true, -2.0)
            .with_cost(-1.5)
            .with_confidence(1.7);
        assert_eq!(event.cost_estimate, 0.0);
        assert_eq!(event.confidence_score, 1.0);
        assert_eq!(event.response_time, 0.0);

        let nan = MetricEvent::new("openai", "translate", true, 1.0).with_cost(f64::NAN);
        assert_eq!(nan.cost_estimate, 0.0);
    }

    #[test]
    fn request_stats_without_traffic_are_zero() {
        let stats = RequestStats::from_sums(0, 0, 0.0, 0.0, 0.0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(!stats.avg_response_time.is_nan());
    }

    #[test]
    fn request_stats_merge_is_weighted() {
        let a = RequestStats::from_sums(3, 1, 4.0, 3.2, 0.5);
        let b = RequestStats::from_sums(1, 0, 4.0, 1.0, 0.25);
        let merged = a.merge(&b);
        assert_eq!(merged.total_requests, 5);
        assert!((merged.avg_response_time - 8.0 / 5.0).abs() < 1e-9);
        assert!((merged.success_rate - 0.8).abs() < 1e-9);
        assert!((merged.total_cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn alert_state_round_trips_through_db_columns() {
        let at = Utc::now();
        let state = AlertState::Resolved { at };
        assert_eq!(AlertState::from_db(state.as_str(), Some(at)), Some(state));
        assert_eq!(AlertState::from_db("resolved", None), None);
        assert_eq!(AlertType::from_db("high_error_rate"), Some(AlertType::HighErrorRate));
        assert_eq!(AlertType::HighResponseTime.severity(), AlertSeverity::Warning);
    }
}
