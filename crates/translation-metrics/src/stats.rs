use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, MetricsResult};
use crate::scope::QueryScope;
use crate::storage::MetricsStorage;
use crate::trend::{classify_metric, HalfSplitTrend, Polarity, TrendPolicy};
use crate::types::{DailyStatistics, RequestStats, Trend};

/// Longest span, in days, a multi-day query walks.
pub const MAX_PERIOD_DAYS: u32 = 3_660;

pub const TREND_REQUESTS: &str = "requests";
pub const TREND_SUCCESS_RATE: &str = "success_rate";
pub const TREND_RESPONSE_TIME: &str = "avg_response_time";
pub const TREND_COST: &str = "total_cost";

/// Statistics for an inclusive range of days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodStatistics {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Vec<DailyStatistics>,
    pub totals: RequestStats,
    pub by_service: BTreeMap<String, RequestStats>,
    pub trends: BTreeMap<String, Trend>,
}

impl PeriodStatistics {
    fn from_days(
        days: Vec<DailyStatistics>,
        start: NaiveDate,
        end: NaiveDate,
        policy: &dyn TrendPolicy,
    ) -> Self {
        let mut totals = RequestStats::default();
        let mut by_service: BTreeMap<String, RequestStats> = BTreeMap::new();

        for day in &days {
            totals = totals.merge(&day.overall);
            for (service, stats) in &day.by_service {
                let entry = by_service.entry(service.clone()).or_default();
                *entry = entry.merge(stats);
            }
        }

        let mut period = Self {
            label: format_period_label(start, end),
            start_date: start,
            end_date: end,
            days,
            totals,
            by_service,
            trends: BTreeMap::new(),
        };
        period.trends = period.classify_trends(policy);
        period
    }

    /// Days that saw at least one request.
    pub fn active_days(&self) -> impl Iterator<Item = &DailyStatistics> + '_ {
        self.days.iter().filter(|day| day.has_traffic())
    }

    pub fn trend(&self, metric: &str) -> Trend {
        self.trends.get(metric).copied().unwrap_or(Trend::Stable)
    }

    /// Mean of the per-day overall values over active days only.
    pub fn active_day_average<F>(&self, value: F) -> f64
    where
        F: Fn(&RequestStats) -> f64,
    {
        let values: Vec<f64> = self.active_days().map(|day| value(&day.overall)).collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    fn classify_trends(&self, policy: &dyn TrendPolicy) -> BTreeMap<String, Trend> {
        // Volume and spend include quiet days; rates only make sense where
        // there was traffic.
        let requests: Vec<f64> = self
            .days
            .iter()
            .map(|day| day.overall.total_requests as f64)
            .collect();
        let cost: Vec<f64> = self.days.iter().map(|day| day.overall.total_cost).collect();
        let success_rate: Vec<f64> = self
            .active_days()
            .map(|day| day.overall.success_rate)
            .collect();
        let response_time: Vec<f64> = self
            .active_days()
            .map(|day| day.overall.avg_response_time)
            .collect();

        BTreeMap::from([
            (
                TREND_REQUESTS.to_string(),
                classify_metric(policy, &requests, Polarity::HigherIsBetter),
            ),
            (
                TREND_SUCCESS_RATE.to_string(),
                classify_metric(policy, &success_rate, Polarity::HigherIsBetter),
            ),
            (
                TREND_RESPONSE_TIME.to_string(),
                classify_metric(policy, &response_time, Polarity::LowerIsBetter),
            ),
            (
                TREND_COST.to_string(),
                classify_metric(policy, &cost, Polarity::LowerIsBetter),
            ),
        ])
    }
}

pub struct StatisticsAggregator {
    storage: Arc<dyn MetricsStorage>,
    policy: Arc<dyn TrendPolicy>,
}

impl StatisticsAggregator {
    pub fn new(storage: Arc<dyn MetricsStorage>) -> Self {
        Self::with_policy(storage, Arc::new(HalfSplitTrend::default()))
    }

    pub fn with_policy(storage: Arc<dyn MetricsStorage>, policy: Arc<dyn TrendPolicy>) -> Self {
        Self { storage, policy }
    }

    pub fn trend_policy(&self) -> &dyn TrendPolicy {
        self.policy.as_ref()
    }

    pub async fn daily(&self, date: NaiveDate) -> MetricsResult<DailyStatistics> {
        self.storage.daily_rollup(date).await
    }

    /// Seven days ending on `end_date`, inclusive.
    pub async fn weekly(
        &self,
        end_date: NaiveDate,
        scope: &QueryScope,
    ) -> MetricsResult<PeriodStatistics> {
        let start = period_start(end_date, 7)?;
        self.range(start, end_date, scope).await
    }

    pub async fn monthly(
        &self,
        year: i32,
        month: u32,
        scope: &QueryScope,
    ) -> MetricsResult<PeriodStatistics> {
        let (start, end) = month_bounds(year, month)?;
        self.range(start, end, scope).await
    }

    pub async fn range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        scope: &QueryScope,
    ) -> MetricsResult<PeriodStatistics> {
        if end < start {
            return Err(MetricsError::InvalidData(format!(
                "period end {} is before start {}",
                end, start
            )));
        }
        let span = (end - start).num_days() + 1;
        if span > i64::from(MAX_PERIOD_DAYS) {
            return Err(MetricsError::InvalidData(format!(
                "period of {} days exceeds the {} day limit",
                span, MAX_PERIOD_DAYS
            )));
        }

        let mut days = Vec::new();
        for date in dates_between(start, end) {
            scope.check()?;
            days.push(self.storage.daily_rollup(date).await?);
        }

        Ok(PeriodStatistics::from_days(days, start, end, self.policy.as_ref()))
    }
}

/// Inclusive list of dates from `start` to `end`.
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .collect()
}

/// First day of the inclusive `days`-day period ending on `end`. A zero
/// `days` is treated as one.
pub fn period_start(end: NaiveDate, days: u32) -> MetricsResult<NaiveDate> {
    let days = days.max(1);
    if days > MAX_PERIOD_DAYS {
        return Err(MetricsError::InvalidData(format!(
            "period of {} days exceeds the {} day limit",
            days, MAX_PERIOD_DAYS
        )));
    }
    end.checked_sub_days(Days::new(u64::from(days - 1)))
        .ok_or_else(|| {
            MetricsError::InvalidData(format!("{} days before {} is out of range", days - 1, end))
        })
}

/// `now` minus `hours` hours, or an error when that is not representable.
pub fn hours_before(now: DateTime<Utc>, hours: u32) -> MetricsResult<DateTime<Utc>> {
    checked_before(now, Duration::try_hours(i64::from(hours)))
        .ok_or_else(|| MetricsError::InvalidData(format!("{} hours before {}", hours, now)))
}

/// `now` minus `days` days, or an error when that is not representable.
pub fn days_before(now: DateTime<Utc>, days: u32) -> MetricsResult<DateTime<Utc>> {
    checked_before(now, Duration::try_days(i64::from(days)))
        .ok_or_else(|| MetricsError::InvalidData(format!("{} days before {}", days, now)))
}

fn checked_before(now: DateTime<Utc>, span: Option<Duration>) -> Option<DateTime<Utc>> {
    span.and_then(|span| now.checked_sub_signed(span))
}

pub fn month_bounds(year: i32, month: u32) -> MetricsResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| MetricsError::InvalidData(format!("invalid month {}-{}", year, month)))?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| MetricsError::InvalidData(format!("invalid month {}-{}", year, month)))?;

    let end = next_month
        .pred_opt()
        .ok_or_else(|| MetricsError::InvalidData(format!("invalid month {}-{}", year, month)))?;
    Ok((start, end))
}

fn format_period_label(start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        start.to_string()
    } else if start.day() == 1
        && start.month() == end.month()
        && end.succ_opt().map_or(false, |next| next.day() == 1)
    {
        start.format("%Y-%m").to_string()
    } else {
        format!("{}..{}", start, end)
    }
}
