use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::context::MetricsContext;
use crate::scope::QueryScope;

/// How long one scheduled report run may take before it is abandoned.
const REPORT_DEADLINE: StdDuration = StdDuration::from_secs(300);

/// Periodic alert sweep and report generation.
pub struct MonitorScheduler {
    context: Arc<MetricsContext>,
}

impl MonitorScheduler {
    pub fn new(context: Arc<MetricsContext>) -> Self {
        Self { context }
    }

    /// Spawns the sweep loop and, when enabled, the report loop. Both stop
    /// when the context shuts down.
    pub fn start(self) {
        let cancel = self.context.shutdown_token();
        let sweep = self.spawn_sweep(cancel.child_token());
        self.context.track(sweep);

        if self.context.config().reports.enabled {
            let reports = self.spawn_reports(cancel.child_token());
            self.context.track(reports);
        }
    }

    fn spawn_sweep(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        let period = context.config().alerting.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let raised = context.run_sweep(Utc::now()).await;
                        if !raised.is_empty() {
                            log::debug!("health sweep raised {} alerts", raised.len());
                        }
                    }
                }
            }
            log::debug!("health sweep stopped");
        })
    }

    fn spawn_reports(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        let hours = context.config().reports.interval_hours.clamp(1, 24 * 366);
        let period = StdDuration::from_secs(hours * 60 * 60);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_reported: Option<NaiveDate> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let scope = QueryScope::with_token(cancel.child_token())
                            .with_timeout(REPORT_DEADLINE);
                        let today = Utc::now().date_naive();
                        run_scheduled_reports(&context, today, &mut last_reported, &scope).await;
                    }
                }
            }
            log::debug!("report schedule stopped");
        })
    }
}

/// Generates the report for yesterday (and the weekly report when
/// yesterday closed a Monday-to-Sunday week) unless it already ran.
pub async fn run_scheduled_reports(
    context: &MetricsContext,
    today: NaiveDate,
    last_reported: &mut Option<NaiveDate>,
    scope: &QueryScope,
) {
    let Some(day) = today.pred_opt() else {
        return;
    };
    if *last_reported == Some(day) {
        return;
    }

    match context.reports().generate_daily_report(day, scope).await {
        Ok(report) => log::info!(
            "Daily report for {} generated ({} requests, {} alerts)",
            day,
            report.statistics.overall.total_requests,
            report.alert_summary.total
        ),
        Err(error) if error.is_interrupted() => {
            log::warn!("daily report for {} interrupted: {}", day, error);
            return;
        }
        Err(error) => log::error!("daily report for {} failed: {}", day, error),
    }

    if context.config().reports.weekly && day.weekday() == Weekday::Sun {
        match context.reports().generate_weekly_report(day, scope).await {
            Ok(report) => log::info!(
                "Weekly report {} to {} generated",
                report.start_date,
                report.end_date
            ),
            Err(error) if error.is_interrupted() => {
                log::warn!("weekly report ending {} interrupted: {}", day, error);
                return;
            }
            Err(error) => log::error!("weekly report ending {} failed: {}", day, error),
        }
    }

    *last_reported = Some(day);
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::error::MetricsResult;
    use crate::pricing::PricingCatalog;
    use crate::report::{ReportDocument, ReportSink};
    use crate::test_support::temp_storage;

    /// Records published names and cancels `token` once a daily report lands.
    struct CancelAfterDaily {
        token: CancellationToken,
        published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReportSink for CancelAfterDaily {
        async fn publish(&self, document: &ReportDocument) -> MetricsResult<()> {
            self.published.lock().push(document.name.clone());
            if document.name.starts_with("daily_report_") {
                self.token.cancel();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_run_once_per_day_and_weekly_on_sundays() {
        let dir = tempdir().expect("temp dir");
        let reports_dir = dir.path().join("reports");
        let context = MetricsContext::open(MonitorConfig {
            db_path: dir.path().join("metrics.db"),
            reports_dir: reports_dir.clone(),
            ..MonitorConfig::default()
        })
        .await
        .expect("open context");

        // 2026-03-09 is a Monday, so the previous day closes a week.
        let monday = NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date");
        let mut last = None;
        let scope = QueryScope::unbounded();

        run_scheduled_reports(&context, monday, &mut last, &scope).await;
        assert_eq!(last, Some(NaiveDate::from_ymd_opt(2026, 3, 8).expect("valid date")));
        assert!(reports_dir.join("daily_report_2026-03-08.json").exists());
        assert!(reports_dir
            .join("weekly_report_2026-03-02_to_2026-03-08.md")
            .exists());

        std::fs::remove_file(reports_dir.join("daily_report_2026-03-08.json")).expect("remove");
        run_scheduled_reports(&context, monday, &mut last, &scope).await;
        assert!(!reports_dir.join("daily_report_2026-03-08.json").exists());
    }

    #[tokio::test]
    async fn interrupted_runs_are_retried() {
        let dir = tempdir().expect("temp dir");
        let context = MetricsContext::open(MonitorConfig {
            db_path: dir.path().join("metrics.db"),
            reports_dir: dir.path().join("reports"),
            ..MonitorConfig::default()
        })
        .await
        .expect("open context");

        let scope = QueryScope::unbounded();
        scope.cancel();
        let mut last = None;
        run_scheduled_reports(
            &context,
            NaiveDate::from_ymd_opt(2026, 3, 11).expect("valid date"),
            &mut last,
            &scope,
        )
        .await;
        assert_eq!(last, None);
    }

    #[tokio::test]
    async fn interrupted_weekly_report_leaves_the_day_pending() {
        let (_dir, storage) = temp_storage().await;
        let token = CancellationToken::new();
        let sink = Arc::new(CancelAfterDaily {
            token: token.clone(),
            published: Mutex::new(Vec::new()),
        });
        let context = MetricsContext::with_parts(
            MonitorConfig::default(),
            storage,
            Arc::new(PricingCatalog::default()),
            sink.clone(),
        );

        let monday = NaiveDate::from_ymd_opt(2026, 3, 9).expect("valid date");
        let mut last = None;
        let scope = QueryScope::with_token(token);
        run_scheduled_reports(&context, monday, &mut last, &scope).await;

        assert_eq!(
            sink.published.lock().clone(),
            vec!["daily_report_2026-03-08".to_string()]
        );
        assert_eq!(last, None);
    }

    #[tokio::test]
    async fn scheduler_tasks_stop_on_shutdown() {
        let dir = tempdir().expect("temp dir");
        let context = MetricsContext::open(MonitorConfig {
            db_path: dir.path().join("metrics.db"),
            reports_dir: dir.path().join("reports"),
            ..MonitorConfig::default()
        })
        .await
        .expect("open context");

        MonitorScheduler::new(context.clone()).start();
        tokio::time::timeout(StdDuration::from_secs(5), context.shutdown())
            .await
            .expect("scheduler stops promptly");
    }
}
