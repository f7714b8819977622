use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{MetricsError, MetricsResult};
use crate::types::{
    Alert, AlertSeverity, AlertState, AlertType, DailyStatistics, MetricEvent, RequestStats,
};

/// Request and failure counts for one service inside a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub total: u64,
    pub errors: u64,
}

impl WindowCounts {
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64
        }
    }
}

/// Durable, append-only home of events and alerts.
///
/// Every "current" view (health, statistics, costs) is derived from these two
/// tables at read time.
#[async_trait]
pub trait MetricsStorage: Send + Sync {
    async fn init(&self) -> MetricsResult<()>;

    /// Appends one event. Re-appending an event id is a no-op.
    async fn append_event(&self, event: &MetricEvent) -> MetricsResult<()>;

    /// Events with `start <= timestamp <= end`, oldest first.
    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        service: Option<&str>,
    ) -> MetricsResult<Vec<MetricEvent>>;

    async fn events_on(&self, date: NaiveDate) -> MetricsResult<Vec<MetricEvent>>;

    async fn service_window(
        &self,
        service: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> MetricsResult<WindowCounts>;

    async fn daily_rollup(&self, date: NaiveDate) -> MetricsResult<DailyStatistics>;

    async fn append_alert(&self, alert: &Alert) -> MetricsResult<()>;

    /// Alerts created at or after `since`, newest first.
    async fn alerts_since(
        &self,
        since: DateTime<Utc>,
        include_suppressed: bool,
    ) -> MetricsResult<Vec<Alert>>;

    /// Alerts whose creation date falls in `[start, end]`, newest first.
    async fn alerts_between_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MetricsResult<Vec<Alert>>;

    async fn alerts_on(&self, date: NaiveDate) -> MetricsResult<Vec<Alert>> {
        self.alerts_between_dates(date, date).await
    }

    /// Moves every open alert of `service` to the resolved state.
    async fn resolve_open_alerts(
        &self,
        service: &str,
        resolved_at: DateTime<Utc>,
    ) -> MetricsResult<u64>;
}

#[derive(Debug, Clone)]
pub struct SqliteMetricsStorage {
    db_path: PathBuf,
}

impl SqliteMetricsStorage {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, func: F) -> MetricsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> MetricsResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open_connection(&db_path)?;
            func(&connection)
        })
        .await
        .map_err(|error| MetricsError::Task(error.to_string()))?
    }
}

const EVENT_COLUMNS: &str = concat!(
    "event_id, recorded_at, service_name, operation_type, model, success, response_time, ",
    "input_length, output_length, confidence_score, error_message, cost_estimate"
);

const ALERT_COLUMNS: &str =
    "alert_id, service_name, alert_type, severity, message, created_at, state, resolved_at";

#[async_trait]
impl MetricsStorage for SqliteMetricsStorage {
    async fn init(&self) -> MetricsResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS translation_events (
                    event_id TEXT PRIMARY KEY,
                    recorded_at TEXT NOT NULL,
                    recorded_at_ms INTEGER NOT NULL,
                    day TEXT NOT NULL,
                    service_name TEXT NOT NULL,
                    operation_type TEXT NOT NULL,
                    model TEXT,
                    success INTEGER NOT NULL,
                    response_time REAL NOT NULL DEFAULT 0,
                    input_length INTEGER NOT NULL DEFAULT 0,
                    output_length INTEGER NOT NULL DEFAULT 0,
                    confidence_score REAL NOT NULL DEFAULT 0,
                    error_message TEXT,
                    cost_estimate REAL NOT NULL DEFAULT 0 CHECK (cost_estimate >= 0)
                );

                CREATE TABLE IF NOT EXISTS translation_alerts (
                    alert_id TEXT PRIMARY KEY,
                    service_name TEXT NOT NULL,
                    alert_type TEXT NOT NULL,
                    severity TEXT NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    created_at_ms INTEGER NOT NULL,
                    day TEXT NOT NULL,
                    state TEXT NOT NULL DEFAULT 'open',
                    resolved_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_events_day ON translation_events(day);
                CREATE INDEX IF NOT EXISTS idx_events_service_time ON translation_events(service_name, recorded_at_ms);
                CREATE INDEX IF NOT EXISTS idx_alerts_created ON translation_alerts(created_at_ms);
                CREATE INDEX IF NOT EXISTS idx_alerts_day ON translation_alerts(day);
                CREATE INDEX IF NOT EXISTS idx_alerts_service_state ON translation_alerts(service_name, state);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    async fn append_event(&self, event: &MetricEvent) -> MetricsResult<()> {
        let event = event.clone();

        self.with_connection(move |connection| {
            connection.execute(
                r#"
                INSERT INTO translation_events (
                    event_id, recorded_at, recorded_at_ms, day, service_name, operation_type,
                    model, success, response_time, input_length, output_length,
                    confidence_score, error_message, cost_estimate
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ON CONFLICT(event_id) DO NOTHING
                "#,
                params![
                    event.event_id,
                    format_timestamp(event.timestamp),
                    event.timestamp.timestamp_millis(),
                    event.date().to_string(),
                    event.service_name,
                    event.operation_type,
                    event.model,
                    event.success,
                    event.response_time,
                    event.input_length as i64,
                    event.output_length as i64,
                    event.confidence_score,
                    event.error_message,
                    event.cost_estimate,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        service: Option<&str>,
    ) -> MetricsResult<Vec<MetricEvent>> {
        let service = service.map(str::to_string);

        self.with_connection(move |connection| {
            let mut sql = format!(
                "SELECT {} FROM translation_events WHERE recorded_at_ms BETWEEN ?1 AND ?2",
                EVENT_COLUMNS
            );
            if service.is_some() {
                sql.push_str(" AND service_name = ?3");
            }
            sql.push_str(" ORDER BY recorded_at_ms ASC");

            let mut stmt = connection.prepare(&sql)?;
            let mut rows = match &service {
                Some(service) => stmt.query(params![
                    start.timestamp_millis(),
                    end.timestamp_millis(),
                    service
                ])?,
                None => stmt.query(params![start.timestamp_millis(), end.timestamp_millis()])?,
            };

            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(read_event(row)?);
            }
            Ok(events)
        })
        .await
    }

    async fn events_on(&self, date: NaiveDate) -> MetricsResult<Vec<MetricEvent>> {
        self.with_connection(move |connection| {
            let sql = format!(
                "SELECT {} FROM translation_events WHERE day = ?1 ORDER BY recorded_at_ms ASC",
                EVENT_COLUMNS
            );
            let mut stmt = connection.prepare(&sql)?;
            let mut rows = stmt.query(params![date.to_string()])?;

            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(read_event(row)?);
            }
            Ok(events)
        })
        .await
    }

    async fn service_window(
        &self,
        service: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> MetricsResult<WindowCounts> {
        let service = service.to_string();

        self.with_connection(move |connection| {
            let counts = connection.query_row(
                r#"
                SELECT COUNT(*), COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0)
                FROM translation_events
                WHERE service_name = ?1 AND recorded_at_ms BETWEEN ?2 AND ?3
                "#,
                params![service, since.timestamp_millis(), until.timestamp_millis()],
                |row| {
                    Ok(WindowCounts {
                        total: row.get::<_, i64>(0)? as u64,
                        errors: row.get::<_, i64>(1)? as u64,
                    })
                },
            )?;
            Ok(counts)
        })
        .await
    }

    async fn daily_rollup(&self, date: NaiveDate) -> MetricsResult<DailyStatistics> {
        self.with_connection(move |connection| {
            let mut stmt = connection.prepare(
                r#"
                SELECT
                    service_name,
                    COALESCE(SUM(success), 0) AS success_count,
                    COUNT(*) - COALESCE(SUM(success), 0) AS error_count,
                    COALESCE(SUM(response_time), 0) AS response_time_sum,
                    COALESCE(SUM(confidence_score), 0) AS confidence_sum,
                    COALESCE(SUM(cost_estimate), 0) AS total_cost
                FROM translation_events
                WHERE day = ?1
                GROUP BY service_name
                ORDER BY service_name ASC
                "#,
            )?;

            let mut rows = stmt.query(params![date.to_string()])?;
            let mut by_service = BTreeMap::new();

            while let Some(row) = rows.next()? {
                by_service.insert(
                    row.get::<_, String>(0)?,
                    RequestStats::from_sums(
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ),
                );
            }

            Ok(DailyStatistics::from_services(date, by_service))
        })
        .await
    }

    async fn append_alert(&self, alert: &Alert) -> MetricsResult<()> {
        let alert = alert.clone();

        self.with_connection(move |connection| {
            let resolved_at = match alert.state {
                AlertState::Resolved { at } => Some(format_timestamp(at)),
                _ => None,
            };
            connection.execute(
                r#"
                INSERT INTO translation_alerts (
                    alert_id, service_name, alert_type, severity, message,
                    created_at, created_at_ms, day, state, resolved_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(alert_id) DO NOTHING
                "#,
                params![
                    alert.alert_id,
                    alert.service_name,
                    alert.alert_type.as_str(),
                    alert.severity.as_str(),
                    alert.message,
                    format_timestamp(alert.timestamp),
                    alert.timestamp.timestamp_millis(),
                    alert.timestamp.date_naive().to_string(),
                    alert.state.as_str(),
                    resolved_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn alerts_since(
        &self,
        since: DateTime<Utc>,
        include_suppressed: bool,
    ) -> MetricsResult<Vec<Alert>> {
        self.with_connection(move |connection| {
            let mut sql = format!(
                "SELECT {} FROM translation_alerts WHERE created_at_ms >= ?1",
                ALERT_COLUMNS
            );
            if !include_suppressed {
                sql.push_str(" AND state != 'suppressed'");
            }
            sql.push_str(" ORDER BY created_at_ms DESC");

            let mut stmt = connection.prepare(&sql)?;
            let mut rows = stmt.query(params![since.timestamp_millis()])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(read_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    async fn alerts_between_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MetricsResult<Vec<Alert>> {
        self.with_connection(move |connection| {
            let sql = format!(
                "SELECT {} FROM translation_alerts WHERE day BETWEEN ?1 AND ?2 ORDER BY created_at_ms DESC",
                ALERT_COLUMNS
            );
            let mut stmt = connection.prepare(&sql)?;
            let mut rows = stmt.query(params![start.to_string(), end.to_string()])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(read_alert(row)?);
            }
            Ok(alerts)
        })
        .await
    }

    async fn resolve_open_alerts(
        &self,
        service: &str,
        resolved_at: DateTime<Utc>,
    ) -> MetricsResult<u64> {
        let service = service.to_string();

        self.with_connection(move |connection| {
            let updated = connection.execute(
                "UPDATE translation_alerts SET state = 'resolved', resolved_at = ?1 WHERE service_name = ?2 AND state = 'open'",
                params![format_timestamp(resolved_at), service],
            )?;
            Ok(updated as u64)
        })
        .await
    }
}

fn open_connection(path: &Path) -> MetricsResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn parse_timestamp(raw: String) -> MetricsResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(raw: Option<String>) -> MetricsResult<Option<DateTime<Utc>>> {
    raw.map(parse_timestamp).transpose()
}

fn read_event(row: &Row<'_>) -> MetricsResult<MetricEvent> {
    Ok(MetricEvent {
        event_id: row.get(0)?,
        timestamp: parse_timestamp(row.get::<_, String>(1)?)?,
        service_name: row.get(2)?,
        operation_type: row.get(3)?,
        model: row.get(4)?,
        success: row.get(5)?,
        response_time: row.get(6)?,
        input_length: row.get::<_, i64>(7)? as u64,
        output_length: row.get::<_, i64>(8)? as u64,
        confidence_score: row.get(9)?,
        error_message: row.get(10)?,
        cost_estimate: row.get(11)?,
    })
}

fn read_alert(row: &Row<'_>) -> MetricsResult<Alert> {
    let type_raw: String = row.get(2)?;
    let alert_type = AlertType::from_db(&type_raw)
        .ok_or_else(|| MetricsError::InvalidData(format!("unknown alert type: {}", type_raw)))?;
    let severity_raw: String = row.get(3)?;
    let severity = AlertSeverity::from_db(&severity_raw).ok_or_else(|| {
        MetricsError::InvalidData(format!("unknown alert severity: {}", severity_raw))
    })?;
    let state_raw: String = row.get(6)?;
    let resolved_at = parse_optional_timestamp(row.get::<_, Option<String>>(7)?)?;
    let state = AlertState::from_db(&state_raw, resolved_at)
        .ok_or_else(|| MetricsError::InvalidData(format!("unknown alert state: {}", state_raw)))?;

    Ok(Alert {
        alert_id: row.get(0)?,
        service_name: row.get(1)?,
        alert_type,
        severity,
        message: row.get(4)?,
        timestamp: parse_timestamp(row.get::<_, String>(5)?)?,
        state,
    })
}
