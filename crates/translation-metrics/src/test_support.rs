use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::{tempdir, TempDir};

use crate::error::{MetricsError, MetricsResult};
use crate::storage::{MetricsStorage, SqliteMetricsStorage, WindowCounts};
use crate::types::{Alert, DailyStatistics, MetricEvent};

pub async fn temp_storage() -> (TempDir, Arc<dyn MetricsStorage>) {
    let dir = tempdir().expect("temp dir");
    let storage = SqliteMetricsStorage::new(dir.path().join("metrics.db"));
    storage.init().await.expect("init storage");
    (dir, Arc::new(storage))
}

/// A store whose every call fails, standing in for a locked or missing
/// database file.
pub struct FailingStorage;

fn offline<T>() -> MetricsResult<T> {
    Err(MetricsError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "storage offline",
    )))
}

#[async_trait]
impl MetricsStorage for FailingStorage {
    async fn init(&self) -> MetricsResult<()> {
        offline()
    }

    async fn append_event(&self, _event: &MetricEvent) -> MetricsResult<()> {
        offline()
    }

    async fn events_between(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _service: Option<&str>,
    ) -> MetricsResult<Vec<MetricEvent>> {
        offline()
    }

    async fn events_on(&self, _date: NaiveDate) -> MetricsResult<Vec<MetricEvent>> {
        offline()
    }

    async fn service_window(
        &self,
        _service: &str,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> MetricsResult<WindowCounts> {
        offline()
    }

    async fn daily_rollup(&self, _date: NaiveDate) -> MetricsResult<DailyStatistics> {
        offline()
    }

    async fn append_alert(&self, _alert: &Alert) -> MetricsResult<()> {
        offline()
    }

    async fn alerts_since(
        &self,
        _since: DateTime<Utc>,
        _include_suppressed: bool,
    ) -> MetricsResult<Vec<Alert>> {
        offline()
    }

    async fn alerts_between_dates(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> MetricsResult<Vec<Alert>> {
        offline()
    }

    async fn resolve_open_alerts(
        &self,
        _service: &str,
        _resolved_at: DateTime<Utc>,
    ) -> MetricsResult<u64> {
        offline()
    }
}
