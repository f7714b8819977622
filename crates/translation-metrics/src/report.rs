//! Daily, weekly and quality reports.
//!
//! Every report is built from the statistics, cost and alert components and
//! then published through a [`ReportSink`] as a JSON document plus a rendered
//! Markdown document sharing one base name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::AlertEngine;
use crate::cost::{CostAnalyzer, DailyCostAnalysis};
use crate::error::MetricsResult;
use crate::scope::QueryScope;
use crate::stats::{
    period_start, PeriodStatistics, StatisticsAggregator, TREND_COST, TREND_REQUESTS,
    TREND_RESPONSE_TIME, TREND_SUCCESS_RATE,
};
use crate::trend::{classify_metric, Polarity};
use crate::types::{Alert, AlertType, DailyStatistics, RequestStats, Trend};

const SUCCESS_RATE_CRITICAL: f64 = 0.90;
const SUCCESS_RATE_WARNING: f64 = 0.95;
const RESPONSE_TIME_CRITICAL: f64 = 5.0;
const RESPONSE_TIME_WARNING: f64 = 3.0;
const CONFIDENCE_WARNING: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    Healthy,
    Warning,
    Critical,
}

impl HealthBand {
    pub fn for_success_rate(success_rate: f64) -> Self {
        if success_rate < SUCCESS_RATE_CRITICAL {
            Self::Critical
        } else if success_rate < SUCCESS_RATE_WARNING {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn for_response_time(avg_response_time: f64) -> Self {
        if avg_response_time > RESPONSE_TIME_CRITICAL {
            Self::Critical
        } else if avg_response_time > RESPONSE_TIME_WARNING {
            Self::Warning
        } else {
            Self::Healthy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceAssessment {
    pub service_name: String,
    pub success_rate: HealthBand,
    pub response_time: HealthBand,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertSummary {
    pub total: usize,
    /// Keyed by `WARNING` / `CRITICAL`.
    pub by_severity: BTreeMap<String, usize>,
    pub most_common_type: Option<AlertType>,
    pub most_affected_service: Option<String>,
}

impl AlertSummary {
    /// Suppressed repeats are not counted.
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut by_severity = BTreeMap::new();
        let mut by_type: BTreeMap<AlertType, usize> = BTreeMap::new();
        let mut by_service: BTreeMap<&str, usize> = BTreeMap::new();
        let mut total = 0;

        for alert in alerts.iter().filter(|alert| !alert.is_suppressed()) {
            total += 1;
            *by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
            *by_type.entry(alert.alert_type).or_insert(0) += 1;
            *by_service.entry(alert.service_name.as_str()).or_insert(0) += 1;
        }

        Self {
            total,
            by_severity,
            most_common_type: most_frequent(by_type),
            most_affected_service: most_frequent(by_service).map(str::to_string),
        }
    }
}

/// Highest count wins; ties go to the smallest key.
fn most_frequent<K: Ord + Copy>(counts: BTreeMap<K, usize>) -> Option<K> {
    counts
        .into_iter()
        .fold(None, |best: Option<(K, usize)>, (key, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })
        .map(|(key, _)| key)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub statistics: DailyStatistics,
    pub services: Vec<ServiceAssessment>,
    pub alerts: Vec<Alert>,
    pub alert_summary: AlertSummary,
    pub costs: DailyCostAnalysis,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklySummary {
    pub total_requests: u64,
    pub active_days: usize,
    pub avg_daily_requests: f64,
    pub avg_success_rate: f64,
    pub avg_response_time: f64,
    pub avg_confidence: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub summary: WeeklySummary,
    pub statistics: PeriodStatistics,
    pub trends: BTreeMap<String, Trend>,
    pub alert_summary: AlertSummary,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityPoint {
    pub date: NaiveDate,
    pub requests: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceQualityTrend {
    pub series: Vec<QualityPoint>,
    pub success_rate_trend: Trend,
    pub response_time_trend: Trend,
    pub confidence_trend: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub trends: BTreeMap<String, ServiceQualityTrend>,
    pub recommendations: Vec<String>,
}

impl QualityReport {
    pub fn empty(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            generated_at: Utc::now(),
            trends: BTreeMap::new(),
            recommendations: Vec::new(),
        }
    }
}

/// One rendered report ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub name: String,
    pub json: String,
    pub markdown: String,
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, document: &ReportDocument) -> MetricsResult<()>;
}

/// Writes `<name>.json` and `<name>.md` into a directory.
#[derive(Debug, Clone)]
pub struct FsReportSink {
    dir: PathBuf,
}

impl FsReportSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportSink for FsReportSink {
    async fn publish(&self, document: &ReportDocument) -> MetricsResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json_path = self.dir.join(format!("{}.json", document.name));
        let markdown_path = self.dir.join(format!("{}.md", document.name));
        tokio::fs::write(&json_path, &document.json).await?;
        tokio::fs::write(&markdown_path, &document.markdown).await?;
        log::info!("Report written: {:?}, {:?}", json_path, markdown_path);
        Ok(())
    }
}

pub struct ReportGenerator {
    stats: Arc<StatisticsAggregator>,
    costs: Arc<CostAnalyzer>,
    alerts: Arc<AlertEngine>,
    sink: Arc<dyn ReportSink>,
}

impl ReportGenerator {
    pub fn new(
        stats: Arc<StatisticsAggregator>,
        costs: Arc<CostAnalyzer>,
        alerts: Arc<AlertEngine>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            stats,
            costs,
            alerts,
            sink,
        }
    }

    pub async fn generate_daily_report(
        &self,
        date: NaiveDate,
        scope: &QueryScope,
    ) -> MetricsResult<DailyReport> {
        scope.check()?;
        let statistics = self.stats.daily(date).await?;
        scope.check()?;
        let alerts = self.alerts.alerts_on(date).await?;
        scope.check()?;
        let costs = self.costs.analyze_daily_costs(date).await?;

        let services = statistics
            .by_service
            .iter()
            .map(|(service, stats)| ServiceAssessment {
                service_name: service.clone(),
                success_rate: HealthBand::for_success_rate(stats.success_rate),
                response_time: HealthBand::for_response_time(stats.avg_response_time),
            })
            .collect();

        let mut recommendations = daily_recommendations(&statistics);
        recommendations.extend(costs.suggestions.iter().map(|item| item.message.clone()));

        let report = DailyReport {
            date,
            generated_at: Utc::now(),
            alert_summary: AlertSummary::from_alerts(&alerts),
            statistics,
            services,
            alerts,
            costs,
            recommendations: dedup(recommendations),
        };

        self.publish(
            format!("daily_report_{}", date),
            &report,
            render_daily_markdown(&report),
        )
        .await;
        Ok(report)
    }

    pub async fn generate_weekly_report(
        &self,
        end_date: NaiveDate,
        scope: &QueryScope,
    ) -> MetricsResult<WeeklyReport> {
        let statistics = self.stats.weekly(end_date, scope).await?;
        scope.check()?;
        let alerts = self
            .alerts
            .alerts_between_dates(statistics.start_date, statistics.end_date)
            .await?;

        let active_days = statistics.active_days().count();
        let summary = WeeklySummary {
            total_requests: statistics.totals.total_requests,
            active_days,
            avg_daily_requests: statistics.active_day_average(|day| day.total_requests as f64),
            avg_success_rate: statistics.active_day_average(|day| day.success_rate),
            avg_response_time: statistics.active_day_average(|day| day.avg_response_time),
            avg_confidence: statistics.active_day_average(|day| day.avg_confidence),
            total_cost: statistics.totals.total_cost,
        };

        let quality = self.quality_from_period(&statistics);
        let mut recommendations = trend_recommendations(&statistics);
        recommendations.extend(quality.recommendations);

        let report = WeeklyReport {
            start_date: statistics.start_date,
            end_date: statistics.end_date,
            generated_at: Utc::now(),
            summary,
            trends: statistics.trends.clone(),
            statistics,
            alert_summary: AlertSummary::from_alerts(&alerts),
            recommendations: dedup(recommendations),
        };

        self.publish(
            format!("weekly_report_{}_to_{}", report.start_date, report.end_date),
            &report,
            render_weekly_markdown(&report),
        )
        .await;
        Ok(report)
    }

    /// Per-service quality series over the `days` days ending on `today`,
    /// published through the sink.
    pub async fn generate_quality_report(
        &self,
        days: u32,
        today: NaiveDate,
        scope: &QueryScope,
    ) -> MetricsResult<QualityReport> {
        let report = self.quality_report(days, today, scope).await?;

        self.publish(
            format!("quality_report_{}_to_{}", report.start_date, report.end_date),
            &report,
            render_quality_markdown(&report),
        )
        .await;
        Ok(report)
    }

    /// Same as [`Self::generate_quality_report`] without writing anything.
    pub async fn quality_report(
        &self,
        days: u32,
        today: NaiveDate,
        scope: &QueryScope,
    ) -> MetricsResult<QualityReport> {
        let start = period_start(today, days)?;
        let period = self.stats.range(start, today, scope).await?;
        Ok(self.quality_from_period(&period))
    }

    fn quality_from_period(&self, period: &PeriodStatistics) -> QualityReport {
        let policy = self.stats.trend_policy();
        let mut series: BTreeMap<String, Vec<QualityPoint>> = BTreeMap::new();

        for day in &period.days {
            for (service, stats) in &day.by_service {
                if stats.total_requests == 0 {
                    continue;
                }
                series.entry(service.clone()).or_default().push(QualityPoint {
                    date: day.date,
                    requests: stats.total_requests,
                    success_rate: stats.success_rate,
                    avg_response_time: stats.avg_response_time,
                    avg_confidence: stats.avg_confidence,
                });
            }
        }

        let mut recommendations = Vec::new();
        let mut trends = BTreeMap::new();
        for (service, points) in series {
            let pick = |value: fn(&QualityPoint) -> f64| -> Vec<f64> {
                points.iter().map(value).collect()
            };
            let trend = ServiceQualityTrend {
                success_rate_trend: classify_metric(
                    policy,
                    &pick(|point| point.success_rate),
                    Polarity::HigherIsBetter,
                ),
                response_time_trend: classify_metric(
                    policy,
                    &pick(|point| point.avg_response_time),
                    Polarity::LowerIsBetter,
                ),
                confidence_trend: classify_metric(
                    policy,
                    &pick(|point| point.avg_confidence),
                    Polarity::HigherIsBetter,
                ),
                series: points,
            };

            let totals = period
                .by_service
                .get(&service)
                .copied()
                .unwrap_or_default();
            recommendations.extend(quality_recommendations(&service, &totals, &trend));
            trends.insert(service, trend);
        }

        QualityReport {
            start_date: period.start_date,
            end_date: period.end_date,
            generated_at: Utc::now(),
            trends,
            recommendations,
        }
    }

    async fn publish<T: Serialize>(&self, name: String, report: &T, markdown: String) {
        let json = match serde_json::to_string_pretty(report) {
            Ok(json) => json,
            Err(error) => {
                log::error!("failed to serialize report {}: {}", name, error);
                return;
            }
        };
        let document = ReportDocument {
            name,
            json,
            markdown,
        };
        if let Err(error) = self.sink.publish(&document).await {
            log::error!("failed to publish report {}: {}", document.name, error);
        }
    }
}

fn daily_recommendations(statistics: &DailyStatistics) -> Vec<String> {
    if !statistics.has_traffic() {
        return vec![format!("No translation traffic recorded on {}", statistics.date)];
    }

    let mut recommendations = Vec::new();
    for (service, stats) in &statistics.by_service {
        match HealthBand::for_success_rate(stats.success_rate) {
            HealthBand::Critical => recommendations.push(format!(
                "CRITICAL: {} success rate is {:.1}%, investigate failures immediately",
                service,
                stats.success_rate * 100.0
            )),
            HealthBand::Warning => recommendations.push(format!(
                "WARNING: {} success rate is {:.1}%, monitor error trends",
                service,
                stats.success_rate * 100.0
            )),
            HealthBand::Healthy => {}
        }
        match HealthBand::for_response_time(stats.avg_response_time) {
            HealthBand::Critical => recommendations.push(format!(
                "CRITICAL: {} average response time is {:.2}s, check timeouts and capacity",
                service, stats.avg_response_time
            )),
            HealthBand::Warning => recommendations.push(format!(
                "WARNING: {} average response time is {:.2}s, consider optimization",
                service, stats.avg_response_time
            )),
            HealthBand::Healthy => {}
        }
    }

    if recommendations.is_empty() {
        recommendations.push("All services are operating within healthy ranges".to_string());
    }
    recommendations
}

fn trend_recommendations(period: &PeriodStatistics) -> Vec<String> {
    let mut recommendations = Vec::new();
    if period.trend(TREND_REQUESTS) == Trend::Declining {
        recommendations.push("Translation volume is declining over the week".to_string());
    }
    if period.trend(TREND_SUCCESS_RATE) == Trend::Declining {
        recommendations.push("Success rate is declining; review recent failures".to_string());
    }
    if period.trend(TREND_RESPONSE_TIME) == Trend::Declining {
        recommendations
            .push("Response times are getting slower; check service latency".to_string());
    }
    if period.trend(TREND_COST) == Trend::Declining {
        recommendations.push("Costs are rising; review the cost report for savings".to_string());
    }
    recommendations
}

fn quality_recommendations(
    service: &str,
    totals: &RequestStats,
    trend: &ServiceQualityTrend,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if totals.total_requests == 0 {
        return recommendations;
    }

    if totals.success_rate < SUCCESS_RATE_WARNING {
        recommendations.push(format!(
            "Improve reliability of {}: success rate {:.1}%",
            service,
            totals.success_rate * 100.0
        ));
    }
    if totals.avg_response_time > RESPONSE_TIME_WARNING {
        recommendations.push(format!(
            "Reduce latency of {}: average response time {:.2}s",
            service, totals.avg_response_time
        ));
    }
    if totals.avg_confidence > 0.0 && totals.avg_confidence < CONFIDENCE_WARNING {
        recommendations.push(format!(
            "Review translation quality of {}: average confidence {:.2}",
            service, totals.avg_confidence
        ));
    }
    if trend.success_rate_trend == Trend::Declining {
        recommendations.push(format!("{} success rate is declining", service));
    }
    if trend.response_time_trend == Trend::Declining {
        recommendations.push(format!("{} response times are getting slower", service));
    }
    if trend.confidence_trend == Trend::Declining {
        recommendations.push(format!("{} confidence scores are declining", service));
    }
    recommendations
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn render_stats_row(name: &str, stats: &RequestStats) -> String {
    format!(
        "| {} | {} | {} | {} | {:.2}s | {:.2} | ${:.4} |\n",
        name,
        stats.total_requests,
        stats.error_count,
        percent(stats.success_rate),
        stats.avg_response_time,
        stats.avg_confidence,
        stats.total_cost
    )
}

const QUALITY_TABLE_HEADER: &str =
    "| Date | Requests | Success rate | Avg response | Avg confidence |\n|---|---|---|---|---|\n";

const STATS_TABLE_HEADER: &str = concat!(
    "| Service | Requests | Errors | Success rate | Avg response | Avg confidence | Cost |\n",
    "|---|---|---|---|---|---|---|\n"
);

fn render_recommendations(output: &mut String, recommendations: &[String]) {
    output.push_str("## Recommendations\n\n");
    if recommendations.is_empty() {
        output.push_str("- None\n");
    }
    for item in recommendations {
        output.push_str(&format!("- {}\n", item));
    }
    output.push('\n');
}

fn render_alert_summary(output: &mut String, summary: &AlertSummary) {
    output.push_str("## Alerts\n\n");
    output.push_str(&format!("- Total: {}\n", summary.total));
    for (severity, count) in &summary.by_severity {
        output.push_str(&format!("- {}: {}\n", severity, count));
    }
    if let Some(alert_type) = summary.most_common_type {
        output.push_str(&format!("- Most common type: {}\n", alert_type.as_str()));
    }
    if let Some(service) = &summary.most_affected_service {
        output.push_str(&format!("- Most affected service: {}\n", service));
    }
    output.push('\n');
}

pub fn render_daily_markdown(report: &DailyReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("# Daily Translation Report: {}\n\n", report.date));
    output.push_str(&format!("Generated at {}\n\n", report.generated_at.to_rfc3339()));

    output.push_str("## Statistics\n\n");
    output.push_str(STATS_TABLE_HEADER);
    for (service, stats) in &report.statistics.by_service {
        output.push_str(&render_stats_row(service, stats));
    }
    output.push_str(&render_stats_row("**overall**", &report.statistics.overall));
    output.push('\n');

    if !report.services.is_empty() {
        output.push_str("## Service Status\n\n");
        for service in &report.services {
            output.push_str(&format!(
                "- {}: success rate {}, response time {}\n",
                service.service_name,
                service.success_rate.as_str(),
                service.response_time.as_str()
            ));
        }
        output.push('\n');
    }

    render_alert_summary(&mut output, &report.alert_summary);

    output.push_str("## Costs\n\n");
    output.push_str(&format!(
        "Total ${:.4} across {} requests (pricing {})\n\n",
        report.costs.total_cost, report.costs.total_requests, report.costs.pricing_version
    ));
    for item in &report.costs.services {
        output.push_str(&format!(
            "- {}: ${:.4} ({:.1}%), {} requests",
            item.service_name, item.total_cost, item.percentage, item.request_count
        ));
        if item.unpriced_requests > 0 {
            output.push_str(&format!(", {} unpriced", item.unpriced_requests));
        }
        output.push('\n');
    }
    output.push('\n');

    render_recommendations(&mut output, &report.recommendations);
    output
}

pub fn render_weekly_markdown(report: &WeeklyReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "# Weekly Translation Report: {} to {}\n\n",
        report.start_date, report.end_date
    ));

    let summary = &report.summary;
    output.push_str("## Summary\n\n");
    output.push_str(&format!("- Total requests: {}\n", summary.total_requests));
    output.push_str(&format!("- Active days: {}\n", summary.active_days));
    output.push_str(&format!("- Average daily requests: {:.1}\n", summary.avg_daily_requests));
    output.push_str(&format!("- Average success rate: {}\n", percent(summary.avg_success_rate)));
    output.push_str(&format!("- Average response time: {:.2}s\n", summary.avg_response_time));
    output.push_str(&format!("- Average confidence: {:.2}\n", summary.avg_confidence));
    output.push_str(&format!("- Total cost: ${:.4}\n\n", summary.total_cost));

    output.push_str("## Trends\n\n");
    for (metric, trend) in &report.trends {
        output.push_str(&format!("- {}: {}\n", metric, trend.as_str()));
    }
    output.push('\n');

    output.push_str("## Services\n\n");
    output.push_str(STATS_TABLE_HEADER);
    for (service, stats) in &report.statistics.by_service {
        output.push_str(&render_stats_row(service, stats));
    }
    output.push('\n');

    render_alert_summary(&mut output, &report.alert_summary);
    render_recommendations(&mut output, &report.recommendations);
    output
}

pub fn render_quality_markdown(report: &QualityReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "# Translation Quality Report: {} to {}\n\n",
        report.start_date, report.end_date
    ));

    if report.trends.is_empty() {
        output.push_str("No translation traffic in this period.\n\n");
    }
    for (service, trend) in &report.trends {
        output.push_str(&format!("## {}\n\n", service));
        output.push_str(&format!(
            "Success rate {}, response time {}, confidence {}\n\n",
            trend.success_rate_trend.as_str(),
            trend.response_time_trend.as_str(),
            trend.confidence_trend.as_str()
        ));
        output.push_str(QUALITY_TABLE_HEADER);
        for point in &trend.series {
            output.push_str(&format!(
                "| {} | {} | {} | {:.2}s | {:.2} |\n",
                point.date,
                point.requests,
                percent(point.success_rate),
                point.avg_response_time,
                point.avg_confidence
            ));
        }
        output.push('\n');
    }

    render_recommendations(&mut output, &report.recommendations);
    output
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::config::{AlertSettings, HealthThresholds};
    use crate::pricing::PricingCatalog;
    use crate::ring::RecentEvents;
    use crate::storage::MetricsStorage;
    use crate::test_support::temp_storage;
    use crate::types::MetricEvent;

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, day).expect("valid date")
    }

    fn generator(storage: Arc<dyn MetricsStorage>, reports: &Path) -> ReportGenerator {
        let alerts = AlertEngine::new(
            HealthThresholds::default(),
            AlertSettings::default(),
            storage.clone(),
            Arc::new(Mutex::new(RecentEvents::with_capacity(16))),
        );
        ReportGenerator::new(
            Arc::new(StatisticsAggregator::new(storage.clone())),
            Arc::new(CostAnalyzer::new(storage, Arc::new(PricingCatalog::default()))),
            Arc::new(alerts),
            Arc::new(FsReportSink::new(reports)),
        )
    }

    async fn seed(
        storage: &Arc<dyn MetricsStorage>,
        date: u32,
        service: &str,
        ok: u32,
        failed: u32,
        response_time: f64,
    ) {
        let start = Utc
            .with_ymd_and_hms(2026, 7, date, 10, 0, 0)
            .single()
            .expect("valid datetime");
        for index in 0..(ok + failed) {
            let event = MetricEvent::new(service, "translate", index < ok, response_time)
                .at(start + Duration::seconds(i64::from(index)))
                .with_confidence(0.9)
                .with_cost(0.001);
            storage.append_event(&event).await.expect("append");
        }
    }

    #[test]
    fn bands_follow_the_report_thresholds() {
        assert_eq!(HealthBand::for_success_rate(0.89), HealthBand::Critical);
        assert_eq!(HealthBand::for_success_rate(0.94), HealthBand::Warning);
        assert_eq!(HealthBand::for_success_rate(0.95), HealthBand::Healthy);
        assert_eq!(HealthBand::for_response_time(5.1), HealthBand::Critical);
        assert_eq!(HealthBand::for_response_time(3.5), HealthBand::Warning);
        assert_eq!(HealthBand::for_response_time(3.0), HealthBand::Healthy);
    }

    #[test]
    fn alert_summary_skips_suppressed_repeats() {
        let at = Utc::now();
        let mut repeat = Alert::new("deepl", AlertType::HighErrorRate, "again", at);
        repeat.state = crate::types::AlertState::Suppressed;
        let alerts = vec![
            Alert::new("deepl", AlertType::HighErrorRate, "first", at),
            Alert::new("deepl", AlertType::HighResponseTime, "slow", at),
            Alert::new("openai", AlertType::HighErrorRate, "errors", at),
            repeat,
        ];

        let summary = AlertSummary::from_alerts(&alerts);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_severity["CRITICAL"], 2);
        assert_eq!(summary.most_common_type, Some(AlertType::HighErrorRate));
        assert_eq!(summary.most_affected_service.as_deref(), Some("deepl"));
    }

    #[tokio::test]
    async fn daily_report_flags_degraded_services_and_writes_both_documents() {
        let (_dir, storage) = temp_storage().await;
        let reports = tempdir().expect("reports dir");
        seed(&storage, 3, "deepl", 8, 2, 6.0).await;
        seed(&storage, 3, "openai", 20, 0, 1.0).await;

        let report = generator(storage, reports.path())
            .generate_daily_report(day(3), &QueryScope::unbounded())
            .await
            .expect("daily report");

        assert_eq!(report.statistics.overall.total_requests, 30);
        let deepl = report
            .services
            .iter()
            .find(|service| service.service_name == "deepl")
            .expect("deepl assessment");
        assert_eq!(deepl.success_rate, HealthBand::Critical);
        assert_eq!(deepl.response_time, HealthBand::Critical);
        assert!(report
            .recommendations
            .iter()
            .any(|item| item.starts_with("CRITICAL: deepl success rate")));

        let json = reports.path().join("daily_report_2026-07-03.json");
        let markdown = reports.path().join("daily_report_2026-07-03.md");
        let stored: DailyReport =
            serde_json::from_str(&std::fs::read_to_string(json).expect("json report"))
                .expect("parse report");
        assert_eq!(stored.date, day(3));
        assert!(std::fs::read_to_string(markdown)
            .expect("markdown report")
            .contains("# Daily Translation Report: 2026-07-03"));
    }

    #[tokio::test]
    async fn weekly_report_averages_only_days_with_traffic() {
        let (_dir, storage) = temp_storage().await;
        let reports = tempdir().expect("reports dir");
        seed(&storage, 2, "deepl", 10, 0, 1.0).await;
        seed(&storage, 6, "deepl", 18, 2, 1.0).await;

        let report = generator(storage, reports.path())
            .generate_weekly_report(day(7), &QueryScope::unbounded())
            .await
            .expect("weekly report");

        assert_eq!(report.start_date, day(1));
        assert_eq!(report.summary.active_days, 2);
        assert!((report.summary.avg_daily_requests - 15.0).abs() < 1e-9);
        assert!((report.summary.avg_success_rate - 0.95).abs() < 1e-9);
        assert!(reports
            .path()
            .join("weekly_report_2026-07-01_to_2026-07-07.md")
            .exists());
    }

    #[tokio::test]
    async fn quality_report_tracks_declining_services() {
        let (_dir, storage) = temp_storage().await;
        let reports = tempdir().expect("reports dir");
        seed(&storage, 1, "google", 10, 0, 1.0).await;
        seed(&storage, 2, "google", 10, 0, 1.0).await;
        seed(&storage, 3, "google", 6, 4, 4.0).await;
        seed(&storage, 4, "google", 5, 5, 4.0).await;

        let report = generator(storage, reports.path())
            .generate_quality_report(4, day(4), &QueryScope::unbounded())
            .await
            .expect("quality report");

        let google = &report.trends["google"];
        assert_eq!(google.series.len(), 4);
        assert_eq!(google.success_rate_trend, Trend::Declining);
        assert_eq!(google.response_time_trend, Trend::Declining);
        assert!(report
            .recommendations
            .iter()
            .any(|item| item == "google success rate is declining"));
        assert!(reports
            .path()
            .join("quality_report_2026-07-01_to_2026-07-04.json")
            .exists());
    }

    #[tokio::test]
    async fn empty_day_produces_a_no_traffic_recommendation() {
        let (_dir, storage) = temp_storage().await;
        let reports = tempdir().expect("reports dir");

        let report = generator(storage, reports.path())
            .generate_daily_report(day(9), &QueryScope::unbounded())
            .await
            .expect("daily report");

        assert_eq!(report.statistics.overall.total_requests, 0);
        assert_eq!(
            report.recommendations,
            vec!["No translation traffic recorded on 2026-07-09".to_string()]
        );
    }
}
