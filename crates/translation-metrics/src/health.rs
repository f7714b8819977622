use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::HealthThresholds;
use crate::types::{MetricEvent, ServiceHealthStatus};

#[derive(Debug, Clone, Default)]
struct ServiceCounters {
    success_count: u64,
    error_count: u64,
    total_response_time: f64,
    last_success_at: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ServiceCounters {
    fn total_requests(&self) -> u64 {
        self.success_count + self.error_count
    }
}

/// Running per-service counters, mutated under the map's per-key lock.
///
/// Counters live for as long as the owning context; they are a cache over the
/// event log, not a source of truth.
#[derive(Debug)]
pub struct HealthTracker {
    thresholds: HealthThresholds,
    counters: DashMap<String, ServiceCounters>,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            counters: DashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn observe(&self, event: &MetricEvent) {
        let mut counters = self
            .counters
            .entry(event.service_name.clone())
            .or_default();

        counters.total_response_time += event.response_time;
        if event.success {
            counters.success_count += 1;
            if counters.last_success_at.map_or(true, |at| at <= event.timestamp) {
                counters.last_success_at = Some(event.timestamp);
            }
        } else {
            counters.error_count += 1;
            if counters.last_error_at.map_or(true, |at| at <= event.timestamp) {
                counters.last_error_at = Some(event.timestamp);
                counters.last_error = event.error_message.clone();
            }
        }
    }

    pub fn get_health(&self, service: &str) -> ServiceHealthStatus {
        self.get_health_at(service, Utc::now())
    }

    pub fn get_health_at(&self, service: &str, now: DateTime<Utc>) -> ServiceHealthStatus {
        let Some(counters) = self.counters.get(service).map(|entry| entry.value().clone()) else {
            return ServiceHealthStatus::empty(service);
        };

        let total_requests = counters.total_requests();
        let (success_rate, avg_response_time) = if total_requests == 0 {
            (0.0, 0.0)
        } else {
            (
                counters.success_count as f64 / total_requests as f64,
                counters.total_response_time / total_requests as f64,
            )
        };

        let required_success_rate = 1.0 - self.thresholds.error_rate_threshold;
        let is_live = if total_requests < self.thresholds.staleness_min_requests {
            true
        } else {
            counters
                .last_success_at
                .map_or(false, |at| now - at <= self.thresholds.service_down_threshold())
        };

        ServiceHealthStatus {
            service_name: service.to_string(),
            is_healthy: total_requests > 0
                && success_rate >= required_success_rate
                && avg_response_time <= self.thresholds.response_time_threshold
                && is_live,
            success_rate,
            avg_response_time,
            error_count: counters.error_count,
            total_requests,
            last_error: counters.last_error,
            last_success_at: counters.last_success_at,
            last_error_at: counters.last_error_at,
        }
    }

    pub fn known_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .counters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        services.sort();
        services
    }

    pub fn all_health(&self) -> Vec<ServiceHealthStatus> {
        self.all_health_at(Utc::now())
    }

    pub fn all_health_at(&self, now: DateTime<Utc>) -> Vec<ServiceHealthStatus> {
        self.known_services()
            .iter()
            .map(|service| self.get_health_at(service, now))
            .collect()
    }
}
