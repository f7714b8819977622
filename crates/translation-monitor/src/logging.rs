use std::io::Write;

use chrono::Utc;
use env_logger::Env;

/// Monitor crates log at `info` (or `debug`); dependencies stay at `warn`.
pub fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    format!("warn,translation_metrics={level},translation_monitor={level}")
}

/// Initializes `env_logger`. `RUST_LOG` replaces [`default_filter`].
/// Timestamps are UTC to line up with stored event times.
pub fn init_logging(debug: bool) {
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter(debug)))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {} - {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.module_path().unwrap_or_else(|| record.target()),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::default_filter;

    #[test]
    fn debug_raises_only_the_monitor_crates() {
        assert_eq!(
            default_filter(true),
            "warn,translation_metrics=debug,translation_monitor=debug"
        );
        assert!(default_filter(false).starts_with("warn,"));
        assert!(default_filter(false).contains("translation_metrics=info"));
    }
}
