//! Read-only facade for the dashboard.
//!
//! Every query degrades instead of failing: a store error or an out-of-range
//! window is logged as a warning and an empty or zeroed structure is
//! returned. Nothing here writes report files.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{NaiveDate, Utc};

use crate::context::MetricsContext;
use crate::cost::{CostReport, DailyCostAnalysis, ServiceCostComparison};
use crate::error::MetricsResult;
use crate::report::QualityReport;
use crate::scope::QueryScope;
use crate::stats::{
    dates_between, days_before, hours_before, month_bounds, period_start, PeriodStatistics,
};
use crate::types::{Alert, DailyStatistics, MetricEvent, RequestStats, ServiceHealthStatus};

#[derive(Clone)]
pub struct MonitoringQueries {
    context: Arc<MetricsContext>,
    timeout: Option<StdDuration>,
}

impl MonitoringQueries {
    pub fn new(context: Arc<MetricsContext>) -> Self {
        Self {
            context,
            timeout: None,
        }
    }

    /// Deadline applied to every multi-day query.
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn scope(&self) -> QueryScope {
        let scope = QueryScope::with_token(self.context.shutdown_token().child_token());
        match self.timeout {
            Some(timeout) => scope.with_timeout(timeout),
            None => scope,
        }
    }

    pub fn get_service_health(&self, service_name: &str) -> ServiceHealthStatus {
        self.context.health().get_health(service_name)
    }

    pub fn get_all_service_health(&self) -> Vec<ServiceHealthStatus> {
        self.context.health().all_health()
    }

    pub async fn get_daily_statistics(&self, date: NaiveDate) -> DailyStatistics {
        degrade(
            "daily statistics",
            self.context.stats().daily(date).await,
            || DailyStatistics::empty(date),
        )
    }

    pub async fn get_weekly_statistics(&self, end_date: NaiveDate) -> PeriodStatistics {
        let result = self.context.stats().weekly(end_date, &self.scope()).await;
        degrade("weekly statistics", result, || {
            empty_period(period_start(end_date, 7).unwrap_or(end_date), end_date)
        })
    }

    pub async fn get_monthly_statistics(&self, year: i32, month: u32) -> PeriodStatistics {
        let result = self.context.stats().monthly(year, month, &self.scope()).await;
        degrade("monthly statistics", result, || match month_bounds(year, month) {
            Ok((start, end)) => empty_period(start, end),
            Err(_) => {
                let today = Utc::now().date_naive();
                empty_period(today, today)
            }
        })
    }

    pub async fn get_recent_alerts(&self, hours: u32) -> Vec<Alert> {
        let now = Utc::now();
        match self.context.alerts().recent_alerts(hours, now).await {
            Ok(alerts) => alerts,
            Err(error) => {
                log::warn!("recent alerts unavailable: {}", error);
                // Alerts the store never received are still worth showing.
                let since = hours_before(now, hours).ok();
                let mut pending: Vec<Alert> = self
                    .context
                    .alerts()
                    .undelivered_alerts()
                    .into_iter()
                    .filter(|alert| {
                        since.map_or(true, |since| alert.timestamp >= since)
                            && !alert.is_suppressed()
                    })
                    .collect();
                pending.reverse();
                pending
            }
        }
    }

    pub fn get_recent_events(&self, limit: usize) -> Vec<MetricEvent> {
        self.context.recent_events(limit)
    }

    /// Builds the quality report without publishing it.
    pub async fn generate_quality_report(&self, days: u32) -> QualityReport {
        let today = Utc::now().date_naive();
        let result = self
            .context
            .reports()
            .quality_report(days, today, &self.scope())
            .await;
        degrade("quality report", result, || {
            QualityReport::empty(period_start(today, days).unwrap_or(today), today)
        })
    }

    pub async fn analyze_daily_costs(&self, date: NaiveDate) -> DailyCostAnalysis {
        let result = self.context.costs().analyze_daily_costs(date).await;
        degrade("daily costs", result, || DailyCostAnalysis {
            date,
            pricing_version: self.context.pricing().version(),
            total_cost: 0.0,
            total_requests: 0,
            unpriced_requests: 0,
            services: Vec::new(),
            suggestions: Vec::new(),
        })
    }

    pub async fn compare_service_costs(&self, days: u32) -> ServiceCostComparison {
        let now = Utc::now();
        let result = self
            .context
            .costs()
            .compare_service_costs(days, now, &self.scope())
            .await;
        degrade("service cost comparison", result, || empty_comparison(days, now))
    }

    pub async fn generate_cost_report(&self, days: u32) -> CostReport {
        let now = Utc::now();
        let result = self
            .context
            .costs()
            .generate_cost_report(days, now, &self.scope())
            .await;
        degrade("cost report", result, || {
            let days = days.max(1);
            let end_date = now.date_naive();
            CostReport {
                days,
                start_date: period_start(end_date, days).unwrap_or(end_date),
                end_date,
                pricing_version: self.context.pricing().version(),
                daily_costs: Vec::new(),
                total_cost: 0.0,
                daily_average: 0.0,
                projected_monthly_cost: 0.0,
                projected_annual_cost: 0.0,
                comparison: empty_comparison(days, now),
                suggestions: Vec::new(),
            }
        })
    }
}

fn degrade<T, F>(what: &str, result: MetricsResult<T>, fallback: F) -> T
where
    F: FnOnce() -> T,
{
    match result {
        Ok(value) => value,
        Err(error) => {
            log::warn!("{} unavailable, returning empty result: {}", what, error);
            fallback()
        }
    }
}

fn empty_period(start: NaiveDate, end: NaiveDate) -> PeriodStatistics {
    PeriodStatistics {
        label: format!("{}..{}", start, end),
        start_date: start,
        end_date: end,
        days: dates_between(start, end)
            .into_iter()
            .map(DailyStatistics::empty)
            .collect(),
        totals: RequestStats::default(),
        by_service: Default::default(),
        trends: Default::default(),
    }
}

fn empty_comparison(days: u32, now: chrono::DateTime<Utc>) -> ServiceCostComparison {
    let days = days.max(1);
    ServiceCostComparison {
        days,
        start: days_before(now, days).unwrap_or(now),
        end: now,
        ranked: Vec::new(),
        free: Vec::new(),
        unpriced: Vec::new(),
        best_value: None,
        worst_value: None,
        estimated_savings: 0.0,
    }
}
