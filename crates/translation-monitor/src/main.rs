mod logging;

use anyhow::Context;
use translation_metrics::{MetricsContext, MonitorConfig, MonitorScheduler};

use logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MonitorConfig::load().context("failed to load monitor configuration")?;
    init_logging(config.debug);

    log::info!("Starting translation monitor");
    log::info!("  Database: {:?}", config.db_path);
    log::info!("  Reports: {:?}", config.reports_dir);
    log::info!(
        "  Thresholds: response time {:.1}s, error rate {:.1}%",
        config.thresholds.response_time_threshold,
        config.thresholds.error_rate_threshold * 100.0
    );
    if config.debug {
        log::debug!("Monitor configuration: {:?}", config);
    }

    let context = MetricsContext::open(config)
        .await
        .context("failed to open metrics context")?;

    match context.watch_pricing() {
        Ok(true) => log::info!("Watching pricing table for changes"),
        Ok(false) => {}
        Err(error) => log::warn!("pricing hot reload disabled: {}", error),
    }

    context.start_worker();
    MonitorScheduler::new(context.clone()).start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    log::info!("Shutdown requested");

    context.shutdown().await;
    Ok(())
}
