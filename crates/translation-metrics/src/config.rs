use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, MetricsResult};

pub const CONFIG_PATH_ENV: &str = "TRANSLATION_MONITOR_CONFIG";
const CONFIG_FILE_PATH: &str = "translation-monitor.toml";
/// Upper bound for configured windows, roughly ten years.
const MAX_WINDOW_SECS: u64 = 10 * 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub db_path: PathBuf,
    pub reports_dir: PathBuf,
    pub thresholds: HealthThresholds,
    pub alerting: AlertSettings,
    /// Capacity of the in-memory recent-event ring.
    pub ring_capacity: usize,
    /// Capacity of the fire-and-forget ingestion channel.
    pub bus_capacity: usize,
    pub reports: ReportSchedule,
    pub pricing: PricingSettings,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthThresholds {
    /// Seconds.
    pub response_time_threshold: f64,
    /// Fraction in `[0, 1]`.
    pub error_rate_threshold: f64,
    /// A service whose last success is older than this is considered down.
    pub service_down_threshold_secs: u64,
    /// Staleness is only judged once a service has this many requests.
    /// Zero applies it unconditionally.
    pub staleness_min_requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    pub error_rate_window_secs: u64,
    pub error_rate_min_samples: u64,
    /// Zero disables the cooldown.
    pub cooldown_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportSchedule {
    pub enabled: bool,
    pub interval_hours: u64,
    pub weekly: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PricingSettings {
    /// TOML or JSON pricing table. Built-in prices are used when unset.
    pub path: Option<PathBuf>,
    pub watch: bool,
}

fn window_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

fn monitor_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".translation-monitor")
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let dir = monitor_dir();
        Self {
            db_path: dir.join("metrics.db"),
            reports_dir: dir.join("reports"),
            thresholds: HealthThresholds::default(),
            alerting: AlertSettings::default(),
            ring_capacity: 1_000,
            bus_capacity: 1_024,
            reports: ReportSchedule::default(),
            pricing: PricingSettings::default(),
            debug: false,
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            response_time_threshold: 5.0,
            error_rate_threshold: 0.1,
            service_down_threshold_secs: 300,
            staleness_min_requests: 10,
        }
    }
}

impl HealthThresholds {
    pub fn service_down_threshold(&self) -> chrono::Duration {
        window_seconds(self.service_down_threshold_secs)
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            error_rate_window_secs: 600,
            error_rate_min_samples: 1,
            cooldown_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl AlertSettings {
    pub fn error_rate_window(&self) -> chrono::Duration {
        window_seconds(self.error_rate_window_secs)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        window_seconds(self.cooldown_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.clamp(1, MAX_WINDOW_SECS))
    }
}

impl Default for ReportSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 24,
            weekly: true,
        }
    }
}

impl MonitorConfig {
    /// Loads the config file named by `TRANSLATION_MONITOR_CONFIG` (or
    /// `translation-monitor.toml` in the working directory), then applies
    /// environment overrides. A missing file yields the defaults.
    pub fn load() -> MetricsResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_PATH));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            log::debug!("no config file at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> MetricsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        log::info!("Loaded monitor config from {:?}", path);
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("TRANSLATION_MONITOR_DB") {
            self.db_path = PathBuf::from(db_path);
        }
        if let Some(reports_dir) = lookup("TRANSLATION_MONITOR_REPORTS_DIR") {
            self.reports_dir = PathBuf::from(reports_dir);
        }
        if let Some(pricing) = lookup("TRANSLATION_MONITOR_PRICING") {
            self.pricing.path = Some(PathBuf::from(pricing));
        }
        if let Some(value) = lookup("TRANSLATION_MONITOR_RESPONSE_TIME_THRESHOLD") {
            match value.trim().parse() {
                Ok(threshold) => self.thresholds.response_time_threshold = threshold,
                Err(_) => log::warn!("ignoring invalid response time threshold {:?}", value),
            }
        }
        if let Some(value) = lookup("TRANSLATION_MONITOR_ERROR_RATE_THRESHOLD") {
            match value.trim().parse() {
                Ok(threshold) => self.thresholds.error_rate_threshold = threshold,
                Err(_) => log::warn!("ignoring invalid error rate threshold {:?}", value),
            }
        }
        if let Some(debug) = lookup("TRANSLATION_MONITOR_DEBUG") {
            self.debug = parse_bool_env(&debug);
        }
    }

    pub fn validate(&self) -> MetricsResult<()> {
        let thresholds = &self.thresholds;
        if !(0.0..=1.0).contains(&thresholds.error_rate_threshold) {
            return Err(MetricsError::Config(format!(
                "error_rate_threshold must be within [0, 1], got {}",
                thresholds.error_rate_threshold
            )));
        }
        if !thresholds.response_time_threshold.is_finite()
            || thresholds.response_time_threshold < 0.0
        {
            return Err(MetricsError::Config(format!(
                "response_time_threshold must be a non-negative number, got {}",
                thresholds.response_time_threshold
            )));
        }
        if self.ring_capacity == 0 || self.bus_capacity == 0 {
            return Err(MetricsError::Config(
                "ring_capacity and bus_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn oversized_windows_are_capped() {
        let settings = AlertSettings {
            cooldown_secs: u64::MAX,
            ..AlertSettings::default()
        };
        assert_eq!(
            settings.cooldown(),
            chrono::Duration::seconds(MAX_WINDOW_SECS as i64)
        );
    }

    #[test]
    fn parse_bool_env_true_values() {
        for value in ["1", "true", "TRUE", " yes ", "Y", "on"] {
            assert!(parse_bool_env(value), "value {value:?} should be true");
        }
    }

    #[test]
    fn parse_bool_env_false_values() {
        for value in ["0", "false", "no", "off", "", "  "] {
            assert!(!parse_bool_env(value), "value {value:?} should be false");
        }
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let config: MonitorConfig = toml::from_str(
            r#"
            ring_capacity = 50

            [thresholds]
            response_time_threshold = 2.5

            [alerting]
            cooldown_secs = 0
            "#,
        )
        .expect("parse config");

        assert_eq!(config.ring_capacity, 50);
        assert_eq!(config.thresholds.response_time_threshold, 2.5);
        assert_eq!(config.thresholds.error_rate_threshold, 0.1);
        assert_eq!(config.alerting.cooldown_secs, 0);
        assert_eq!(config.alerting.error_rate_window_secs, 600);
    }

    #[test]
    fn environment_overrides_take_priority() {
        let env = HashMap::from([
            ("TRANSLATION_MONITOR_DB", "/tmp/monitor/metrics.db"),
            ("TRANSLATION_MONITOR_ERROR_RATE_THRESHOLD", "0.25"),
            ("TRANSLATION_MONITOR_RESPONSE_TIME_THRESHOLD", "not-a-number"),
            ("TRANSLATION_MONITOR_DEBUG", "yes"),
        ]);
        let mut config = MonitorConfig::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.db_path, PathBuf::from("/tmp/monitor/metrics.db"));
        assert_eq!(config.thresholds.error_rate_threshold, 0.25);
        assert_eq!(config.thresholds.response_time_threshold, 5.0);
        assert!(config.debug);
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        let mut config = MonitorConfig::default();
        config.thresholds.error_rate_threshold = 1.5;
        assert!(matches!(config.validate(), Err(MetricsError::Config(_))));
    }
}
