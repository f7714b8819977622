use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use tempfile::{tempdir, TempDir};

use translation_metrics::stats::{TREND_REQUESTS, TREND_RESPONSE_TIME, TREND_SUCCESS_RATE};
use translation_metrics::{
    AlertSeverity, AlertState, AlertType, CostEstimate, MetricEvent, MetricsContext, MonitorConfig,
    QueryScope, Trend,
};

async fn open_context() -> (TempDir, Arc<MetricsContext>) {
    let dir = tempdir().expect("temp dir");
    let context = MetricsContext::open(MonitorConfig {
        db_path: dir.path().join("metrics.db"),
        reports_dir: dir.path().join("reports"),
        ..MonitorConfig::default()
    })
    .await
    .expect("open context");
    (dir, context)
}

fn noon(date: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).expect("valid time"))
}

#[tokio::test]
async fn recorded_events_feed_health_and_daily_statistics() {
    let (_dir, context) = open_context().await;

    for response_time in [1.0, 2.0, 3.0] {
        context
            .record_translation(
                "deepl",
                "translate",
                true,
                response_time,
                100,
                120,
                0.9,
                None,
                Some(0.01),
            )
            .await;
    }

    let health = context.health().get_health("deepl");
    assert_eq!(health.total_requests, 3);
    assert_eq!(health.success_rate, 1.0);
    assert!((health.avg_response_time - 2.0).abs() < 1e-9);
    assert!(health.is_healthy);

    let today = Utc::now().date_naive();
    let daily = context.stats().daily(today).await.expect("daily statistics");
    assert_eq!(daily.overall.total_requests, 3);
    assert_eq!(daily.by_service["deepl"].total_requests, 3);
    assert!((daily.overall.total_cost - 0.03).abs() < 1e-9);
}

#[tokio::test]
async fn slow_call_raises_one_warning_with_the_observed_time() {
    let (_dir, context) = open_context().await;

    context
        .record(MetricEvent::new("google", "translate", true, 10.0))
        .await;

    let alerts = context
        .alerts()
        .recent_alerts(1, Utc::now())
        .await
        .expect("recent alerts");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::HighResponseTime);
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    assert!(alerts[0].message.contains("10.00s"), "{}", alerts[0].message);
}

#[tokio::test]
async fn failures_above_the_error_rate_raise_a_critical_alert() {
    let (_dir, context) = open_context().await;

    for _ in 0..3 {
        context
            .record(MetricEvent::new("google", "translate", true, 0.4))
            .await;
    }
    context
        .record(MetricEvent::new("google", "translate", false, 0.4).with_error("HTTP 503"))
        .await;

    let alerts = context
        .alerts()
        .recent_alerts(1, Utc::now())
        .await
        .expect("recent alerts");
    let critical: Vec<_> = alerts
        .iter()
        .filter(|alert| alert.alert_type == AlertType::HighErrorRate)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].severity, AlertSeverity::Critical);
    assert!(critical[0].message.contains("25.0%"), "{}", critical[0].message);
}

#[tokio::test]
async fn dates_without_traffic_report_zeros() {
    let (_dir, context) = open_context().await;

    let date = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date");
    let daily = context.stats().daily(date).await.expect("daily statistics");
    assert_eq!(daily.date, date);
    assert_eq!(daily.overall.total_requests, 0);
    assert_eq!(daily.overall.success_rate, 0.0);
    assert_eq!(daily.overall.avg_response_time, 0.0);
    assert!(daily.by_service.is_empty());
}

#[tokio::test]
async fn one_thousand_tokens_each_way_cost_one_input_and_one_output_unit() {
    let (_dir, context) = open_context().await;

    let pricing = context.pricing().current();
    let price = *pricing.lookup("openai", None).expect("openai default price");
    let event = MetricEvent::new("openai", "translate", true, 0.5).with_lengths(1000, 1000);

    assert_eq!(
        context.estimate_cost(&event),
        CostEstimate::Priced(price.input_price + price.output_price)
    );
    assert_eq!(
        context.estimate_cost(&MetricEvent::new("babelfish", "translate", true, 0.5)),
        CostEstimate::Unpriced
    );
}

#[tokio::test]
async fn eight_successes_and_two_failures_leave_a_service_unhealthy() {
    let (_dir, context) = open_context().await;

    for _ in 0..8 {
        context
            .record(MetricEvent::new("azure", "translate", true, 0.3))
            .await;
    }
    for _ in 0..2 {
        context
            .record(MetricEvent::new("azure", "translate", false, 0.3).with_error("timeout"))
            .await;
    }

    let health = context.health().get_health("azure");
    assert_eq!(health.total_requests, 10);
    assert_eq!(health.error_count, 2);
    assert!((health.success_rate - 0.8).abs() < 1e-9);
    assert!(!health.is_healthy);
    assert_eq!(health.last_error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn repeated_alerts_inside_the_cooldown_are_suppressed() {
    let (_dir, context) = open_context().await;

    for _ in 0..3 {
        context
            .record(MetricEvent::new("deepl", "translate", true, 8.0))
            .await;
    }

    let now = Utc::now();
    let visible = context
        .alerts()
        .recent_alerts(1, now)
        .await
        .expect("recent alerts");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].state, AlertState::Open);

    let history = context
        .alerts()
        .alert_history(1, now)
        .await
        .expect("alert history");
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|alert| alert.is_suppressed()).count(), 2);
}

#[tokio::test]
async fn sweep_flags_unhealthy_services_and_resolves_them_on_recovery() {
    let (_dir, context) = open_context().await;

    context
        .record(MetricEvent::new("google", "translate", false, 0.2).with_error("HTTP 500"))
        .await;

    let raised = context.run_sweep(Utc::now()).await;
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].alert_type, AlertType::ServiceUnhealthy);

    for _ in 0..20 {
        context
            .record(MetricEvent::new("google", "translate", true, 0.2))
            .await;
    }
    assert!(context.health().get_health("google").is_healthy);
    assert!(context.run_sweep(Utc::now()).await.is_empty());

    let history = context
        .alerts()
        .alert_history(1, Utc::now())
        .await
        .expect("alert history");
    assert!(!history.is_empty());
    assert!(history
        .iter()
        .filter(|alert| !alert.is_suppressed())
        .all(|alert| alert.resolved()));
}

#[tokio::test]
async fn cancelled_cost_report_is_interrupted() {
    let (_dir, context) = open_context().await;

    let scope = QueryScope::unbounded();
    scope.cancel();
    let error = context
        .costs()
        .generate_cost_report(30, Utc::now(), &scope)
        .await
        .expect_err("cancelled report");
    assert!(error.is_interrupted());
}

#[tokio::test]
async fn weekly_statistics_classify_trends_per_metric() {
    let (_dir, context) = open_context().await;

    let end = Utc::now().date_naive() - Duration::days(1);
    for offset in 0..7 {
        let date = end - Duration::days(6 - offset);
        let (requests, response_time) = if offset < 3 { (1, 2.0) } else { (3, 1.0) };
        for _ in 0..requests {
            context
                .record(MetricEvent::new("deepl", "translate", true, response_time).at(noon(date)))
                .await;
        }
    }

    let weekly = context
        .stats()
        .weekly(end, &QueryScope::unbounded())
        .await
        .expect("weekly statistics");
    assert_eq!(weekly.days.len(), 7);
    assert_eq!(weekly.totals.total_requests, 15);
    assert_eq!(weekly.trend(TREND_REQUESTS), Trend::Improving);
    assert_eq!(weekly.trend(TREND_SUCCESS_RATE), Trend::Stable);
    assert_eq!(weekly.trend(TREND_RESPONSE_TIME), Trend::Improving);
}
