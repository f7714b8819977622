use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::{AlertSettings, HealthThresholds};
use crate::error::MetricsResult;
use crate::health::HealthTracker;
use crate::ring::RecentEvents;
use crate::stats::hours_before;
use crate::storage::{MetricsStorage, WindowCounts};
use crate::types::{Alert, AlertSeverity, AlertState, AlertType, MetricEvent};

const UNDELIVERED_CAPACITY: usize = 256;

/// Threshold evaluation for ingested events and the periodic health sweep.
///
/// Alerts are written once. A breach inside the cooldown window of an earlier
/// alert with the same service and type is stored as `Suppressed` instead of
/// opening a new alert; open alerts are resolved when the sweep finds the
/// service healthy again.
pub struct AlertEngine {
    thresholds: HealthThresholds,
    settings: AlertSettings,
    storage: Arc<dyn MetricsStorage>,
    recent: Arc<Mutex<RecentEvents>>,
    last_raised: DashMap<(String, AlertType), DateTime<Utc>>,
    undelivered: Mutex<VecDeque<Alert>>,
}

impl AlertEngine {
    pub fn new(
        thresholds: HealthThresholds,
        settings: AlertSettings,
        storage: Arc<dyn MetricsStorage>,
        recent: Arc<Mutex<RecentEvents>>,
    ) -> Self {
        Self {
            thresholds,
            settings,
            storage,
            recent,
            last_raised: DashMap::new(),
            undelivered: Mutex::new(VecDeque::new()),
        }
    }

    /// Runs the per-event checks and returns every alert raised, suppressed
    /// ones included.
    pub async fn evaluate_event(&self, event: &MetricEvent) -> Vec<Alert> {
        let mut raised = Vec::new();

        if event.response_time > self.thresholds.response_time_threshold {
            let message = format!(
                "High response time for {}: {:.2}s exceeds threshold of {:.2}s",
                event.service_name, event.response_time, self.thresholds.response_time_threshold
            );
            raised.push(
                self.raise(
                    &event.service_name,
                    AlertType::HighResponseTime,
                    message,
                    event.timestamp,
                )
                .await,
            );
        }

        if !event.success {
            let window = self.settings.error_rate_window();
            let since = event.timestamp - window;
            let counts = self
                .window_counts(&event.service_name, since, event.timestamp)
                .await;

            if counts.total >= self.settings.error_rate_min_samples.max(1)
                && counts.error_rate() > self.thresholds.error_rate_threshold
            {
                let message = format!(
                    "High error rate for {}: {:.1}% over the last {} minutes ({} of {} requests failed, threshold {:.1}%)",
                    event.service_name,
                    counts.error_rate() * 100.0,
                    window.num_minutes(),
                    counts.errors,
                    counts.total,
                    self.thresholds.error_rate_threshold * 100.0
                );
                raised.push(
                    self.raise(
                        &event.service_name,
                        AlertType::HighErrorRate,
                        message,
                        event.timestamp,
                    )
                    .await,
                );
            }
        }

        raised
    }

    /// Checks every known service's health snapshot at `now`.
    pub async fn sweep(&self, health: &HealthTracker, now: DateTime<Utc>) -> Vec<Alert> {
        let required = 1.0 - self.thresholds.error_rate_threshold;
        let mut raised = Vec::new();

        for status in health.all_health_at(now) {
            if status.total_requests > 0 && status.success_rate < required {
                let message = format!(
                    "Service {} is unhealthy: success rate {:.1}% is below {:.1}% ({} errors in {} requests)",
                    status.service_name,
                    status.success_rate * 100.0,
                    required * 100.0,
                    status.error_count,
                    status.total_requests
                );
                raised.push(
                    self.raise(&status.service_name, AlertType::ServiceUnhealthy, message, now)
                        .await,
                );
            } else if status.is_healthy {
                self.resolve_service(&status.service_name, now).await;
            }
        }

        raised
    }

    /// Operational alert for an event that could not be persisted.
    pub async fn raise_ingestion_failure(&self, event: &MetricEvent, error: &str) -> Alert {
        let message = format!(
            "Failed to persist metric event {} for {}: {}",
            event.event_id, event.service_name, error
        );
        self.raise(&event.service_name, AlertType::IngestionFailure, message, Utc::now())
            .await
    }

    pub async fn recent_alerts(&self, hours: u32, now: DateTime<Utc>) -> MetricsResult<Vec<Alert>> {
        self.alerts_in_window(hours, now, false).await
    }

    /// Like [`Self::recent_alerts`] but including suppressed repeats.
    pub async fn alert_history(&self, hours: u32, now: DateTime<Utc>) -> MetricsResult<Vec<Alert>> {
        self.alerts_in_window(hours, now, true).await
    }

    pub async fn alerts_between_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MetricsResult<Vec<Alert>> {
        let mut alerts = self.storage.alerts_between_dates(start, end).await?;
        alerts.extend(self.undelivered_matching(|alert| {
            let date = alert.timestamp.date_naive();
            date >= start && date <= end
        }));
        sort_newest_first(&mut alerts);
        Ok(alerts)
    }

    pub async fn alerts_on(&self, date: NaiveDate) -> MetricsResult<Vec<Alert>> {
        let mut alerts = self.storage.alerts_on(date).await?;
        alerts.extend(self.undelivered_matching(|alert| alert.timestamp.date_naive() == date));
        sort_newest_first(&mut alerts);
        Ok(alerts)
    }

    pub fn undelivered_count(&self) -> usize {
        self.undelivered.lock().len()
    }

    /// Alerts that could not be written to the store, oldest first.
    pub fn undelivered_alerts(&self) -> Vec<Alert> {
        self.undelivered.lock().iter().cloned().collect()
    }

    async fn alerts_in_window(
        &self,
        hours: u32,
        now: DateTime<Utc>,
        include_suppressed: bool,
    ) -> MetricsResult<Vec<Alert>> {
        let since = hours_before(now, hours)?;
        let mut alerts = self.storage.alerts_since(since, include_suppressed).await?;
        alerts.extend(self.undelivered_matching(|alert| {
            alert.timestamp >= since && (include_suppressed || !alert.is_suppressed())
        }));
        sort_newest_first(&mut alerts);
        Ok(alerts)
    }

    async fn window_counts(
        &self,
        service: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> WindowCounts {
        match self.storage.service_window(service, since, until).await {
            Ok(counts) => counts,
            Err(error) => {
                log::warn!(
                    "error rate window query failed for {}, using recent events: {}",
                    service,
                    error
                );
                let recent = self.recent.lock().service_since(service, since);
                let in_window = recent.iter().filter(|event| event.timestamp <= until);
                in_window.fold(WindowCounts::default(), |mut counts, event| {
                    counts.total += 1;
                    if !event.success {
                        counts.errors += 1;
                    }
                    counts
                })
            }
        }
    }

    async fn raise(
        &self,
        service: &str,
        alert_type: AlertType,
        message: String,
        at: DateTime<Utc>,
    ) -> Alert {
        let mut alert = Alert::new(service, alert_type, message, at);

        if self.in_cooldown(service, alert_type, at) {
            alert.state = AlertState::Suppressed;
            log::debug!(
                "suppressed {} alert for {} inside cooldown: {}",
                alert_type.as_str(),
                service,
                alert.message
            );
        } else {
            match alert.severity {
                AlertSeverity::Critical => log::error!(
                    "CRITICAL ALERT [{}] {}: {}",
                    alert_type.as_str(),
                    service,
                    alert.message
                ),
                AlertSeverity::Warning => log::warn!(
                    "WARNING ALERT [{}] {}: {}",
                    alert_type.as_str(),
                    service,
                    alert.message
                ),
            }
        }

        if let Err(error) = self.storage.append_alert(&alert).await {
            log::error!(
                "failed to persist {} alert for {}: {}",
                alert_type.as_str(),
                service,
                error
            );
            let mut undelivered = self.undelivered.lock();
            if undelivered.len() >= UNDELIVERED_CAPACITY {
                undelivered.pop_front();
            }
            undelivered.push_back(alert.clone());
        }

        alert
    }

    /// Records `at` as the latest alert time unless an earlier alert for the
    /// same key is still cooling down.
    fn in_cooldown(&self, service: &str, alert_type: AlertType, at: DateTime<Utc>) -> bool {
        let cooldown = self.settings.cooldown();
        if cooldown <= Duration::zero() {
            return false;
        }

        match self.last_raised.entry((service.to_string(), alert_type)) {
            Entry::Occupied(mut entry) => {
                if at - *entry.get() < cooldown {
                    true
                } else {
                    entry.insert(at);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(at);
                false
            }
        }
    }

    async fn resolve_service(&self, service: &str, now: DateTime<Utc>) {
        self.last_raised.retain(|(name, _), _| name != service);

        match self.storage.resolve_open_alerts(service, now).await {
            Ok(0) => {}
            Ok(resolved) => log::info!("Resolved {} open alerts for {}", resolved, service),
            Err(error) => log::warn!("failed to resolve alerts for {}: {}", service, error),
        }
    }

    fn undelivered_matching<F>(&self, predicate: F) -> Vec<Alert>
    where
        F: Fn(&Alert) -> bool,
    {
        self.undelivered
            .lock()
            .iter()
            .filter(|alert| predicate(alert))
            .cloned()
            .collect()
    }
}

fn sort_newest_first(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
