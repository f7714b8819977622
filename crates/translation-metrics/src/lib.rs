pub mod alerts;
pub mod bus;
pub mod config;
pub mod context;
pub mod cost;
pub mod error;
pub mod events;
pub mod health;
pub mod pricing;
pub mod query;
pub mod report;
pub mod ring;
pub mod scheduler;
pub mod scope;
pub mod stats;
pub mod storage;
pub mod trend;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use alerts::AlertEngine;
pub use bus::MetricsBus;
pub use config::{AlertSettings, HealthThresholds, MonitorConfig, PricingSettings, ReportSchedule};
pub use context::MetricsContext;
pub use cost::{
    CostAnalyzer, CostBreakdown, CostReport, CostSuggestion, DailyCostAnalysis,
    ServiceCostComparison, ServiceValue, SuggestionKind,
};
pub use error::{MetricsError, MetricsResult};
pub use events::{SystemEvent, TelemetryEvent};
pub use health::HealthTracker;
pub use pricing::{CostEstimate, ModelPrice, PricingCatalog, PricingTable};
pub use query::MonitoringQueries;
pub use report::{
    DailyReport, FsReportSink, QualityReport, ReportDocument, ReportGenerator, ReportSink,
    WeeklyReport,
};
pub use ring::RecentEvents;
pub use scheduler::MonitorScheduler;
pub use scope::QueryScope;
pub use stats::{PeriodStatistics, StatisticsAggregator};
pub use storage::{MetricsStorage, SqliteMetricsStorage, WindowCounts};
pub use trend::{HalfSplitTrend, Polarity, TrendPolicy};
pub use types::{
    Alert, AlertSeverity, AlertState, AlertType, DailyStatistics, MetricEvent, RequestStats,
    ServiceHealthStatus, Trend,
};
pub use worker::MetricsWorker;
