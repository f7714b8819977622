use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertEngine;
use crate::bus::MetricsBus;
use crate::config::MonitorConfig;
use crate::cost::CostAnalyzer;
use crate::error::MetricsResult;
use crate::events::{SystemEvent, TelemetryEvent};
use crate::health::HealthTracker;
use crate::pricing::{CostEstimate, PricingCatalog};
use crate::report::{FsReportSink, ReportGenerator, ReportSink};
use crate::ring::RecentEvents;
use crate::stats::StatisticsAggregator;
use crate::storage::{MetricsStorage, SqliteMetricsStorage};
use crate::types::{Alert, MetricEvent};
use crate::worker::MetricsWorker;

/// Owner of every monitoring component.
///
/// Built once with [`MetricsContext::open`] and torn down with
/// [`MetricsContext::shutdown`]. Health counters and the recent-event ring
/// live exactly as long as the context.
pub struct MetricsContext {
    config: MonitorConfig,
    storage: Arc<dyn MetricsStorage>,
    health: Arc<HealthTracker>,
    recent: Arc<Mutex<RecentEvents>>,
    alerts: Arc<AlertEngine>,
    stats: Arc<StatisticsAggregator>,
    costs: Arc<CostAnalyzer>,
    reports: Arc<ReportGenerator>,
    pricing: Arc<PricingCatalog>,
    bus: MetricsBus,
    receiver: Mutex<Option<mpsc::Receiver<TelemetryEvent>>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MetricsContext {
    /// Opens the SQLite store, loads pricing and wires every component.
    pub async fn open(config: MonitorConfig) -> MetricsResult<Arc<Self>> {
        config.validate()?;

        let storage = SqliteMetricsStorage::new(&config.db_path);
        storage.init().await?;
        log::info!("Metrics store ready at {:?}", storage.db_path());

        let pricing = match &config.pricing.path {
            Some(path) => PricingCatalog::from_file(path)?,
            None => PricingCatalog::default(),
        };
        log::info!("Using pricing table {}", pricing.version());

        let sink = FsReportSink::new(&config.reports_dir);
        Ok(Self::with_parts(
            config,
            Arc::new(storage),
            Arc::new(pricing),
            Arc::new(sink),
        ))
    }

    /// Wires a context around already-initialized parts.
    pub fn with_parts(
        config: MonitorConfig,
        storage: Arc<dyn MetricsStorage>,
        pricing: Arc<PricingCatalog>,
        sink: Arc<dyn ReportSink>,
    ) -> Arc<Self> {
        let recent = Arc::new(Mutex::new(RecentEvents::with_capacity(config.ring_capacity)));
        let health = Arc::new(HealthTracker::new(config.thresholds.clone()));
        let alerts = Arc::new(AlertEngine::new(
            config.thresholds.clone(),
            config.alerting.clone(),
            Arc::clone(&storage),
            Arc::clone(&recent),
        ));
        let stats = Arc::new(StatisticsAggregator::new(Arc::clone(&storage)));
        let costs = Arc::new(CostAnalyzer::new(Arc::clone(&storage), Arc::clone(&pricing)));
        let reports = Arc::new(ReportGenerator::new(
            Arc::clone(&stats),
            Arc::clone(&costs),
            Arc::clone(&alerts),
            sink,
        ));
        let (bus, receiver) = MetricsBus::new(config.bus_capacity);

        Arc::new(Self {
            config,
            storage,
            health,
            recent,
            alerts,
            stats,
            costs,
            reports,
            pricing,
            bus,
            receiver: Mutex::new(Some(receiver)),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Records one completed call. Never fails: a store error is logged,
    /// raised as an `ingestion_failure` alert and reported on the bus, and
    /// the in-memory views are still updated.
    pub async fn record(&self, event: MetricEvent) {
        if let Err(error) = self.storage.append_event(&event).await {
            log::error!(
                "Failed to persist metric event {} for {}: {}",
                event.event_id,
                event.service_name,
                error
            );
            self.bus.emit_system(SystemEvent::StorageError {
                error: error.to_string(),
                event_id: event.event_id.clone(),
                service_name: event.service_name.clone(),
            });
            self.alerts
                .raise_ingestion_failure(&event, &error.to_string())
                .await;
        }

        self.health.observe(&event);
        self.recent.lock().push(event.clone());
        self.alerts.evaluate_event(&event).await;

        log::debug!(
            "Recorded {} {} for {} ({:.2}s)",
            event.operation_type,
            if event.success { "success" } else { "failure" },
            event.service_name,
            event.response_time
        );
    }

    /// Builds and records an event. Without an explicit cost the estimate
    /// comes from the current pricing table.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_translation(
        &self,
        service_name: &str,
        operation_type: &str,
        success: bool,
        response_time: f64,
        input_length: u64,
        output_length: u64,
        confidence_score: f64,
        error_message: Option<&str>,
        cost_estimate: Option<f64>,
    ) -> MetricEvent {
        let mut event = MetricEvent::new(service_name, operation_type, success, response_time)
            .with_lengths(input_length, output_length)
            .with_confidence(confidence_score);
        if let Some(message) = error_message {
            event = event.with_error(message);
        }

        let cost = match cost_estimate {
            Some(cost) => cost,
            None => match self.estimate_cost(&event) {
                CostEstimate::Priced(amount) => amount,
                CostEstimate::Unpriced => 0.0,
            },
        };
        event = event.with_cost(cost);

        self.record(event.clone()).await;
        event
    }

    pub fn estimate_cost(&self, event: &MetricEvent) -> CostEstimate {
        self.costs.estimate_cost(
            &event.service_name,
            event.input_length,
            event.output_length,
            event.model.as_deref(),
        )
    }

    /// Runs the health sweep at `now`.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Vec<Alert> {
        self.alerts.sweep(&self.health, now).await
    }

    /// Newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<MetricEvent> {
        self.recent.lock().recent(limit)
    }

    /// Starts the bus worker. Only the first call spawns anything.
    pub fn start_worker(self: &Arc<Self>) -> bool {
        let Some(receiver) = self.receiver.lock().take() else {
            log::warn!("metrics worker already started");
            return false;
        };
        let handle =
            MetricsWorker::new(Arc::clone(self)).spawn(receiver, self.shutdown.child_token());
        self.track(handle);
        true
    }

    /// Starts hot reload of the pricing file, when one is configured and
    /// watching is enabled.
    pub fn watch_pricing(&self) -> MetricsResult<bool> {
        if !self.config.pricing.watch || self.config.pricing.path.is_none() {
            return Ok(false);
        }
        let handle = self.pricing.watch(self.shutdown.child_token())?;
        self.track(handle);
        Ok(true)
    }

    /// Registers a background task to be awaited on shutdown.
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    /// Cancels every background task and waits for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(error) = task.await {
                log::warn!("background task ended abnormally: {}", error);
            }
        }
        log::info!("Metrics context shut down");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn MetricsStorage> {
        &self.storage
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn stats(&self) -> &Arc<StatisticsAggregator> {
        &self.stats
    }

    pub fn costs(&self) -> &Arc<CostAnalyzer> {
        &self.costs
    }

    pub fn reports(&self) -> &Arc<ReportGenerator> {
        &self.reports
    }

    pub fn pricing(&self) -> &Arc<PricingCatalog> {
        &self.pricing
    }

    pub fn bus(&self) -> &MetricsBus {
        &self.bus
    }
}
