//! Versioned pricing table with hot reload.
//!
//! Prices are per 1,000 units of input/output length, keyed by service and
//! then by model, with a `default` model per service used as a fallback.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{MetricsError, MetricsResult};

pub const DEFAULT_MODEL: &str = "default";
pub const PRICING_UNIT: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPrice {
    pub input_price: f64,
    pub output_price: f64,
}

impl ModelPrice {
    pub const fn new(input_price: f64, output_price: f64) -> Self {
        Self {
            input_price,
            output_price,
        }
    }

    pub fn cost(&self, input_length: u64, output_length: u64) -> f64 {
        (input_length as f64 / PRICING_UNIT) * self.input_price
            + (output_length as f64 / PRICING_UNIT) * self.output_price
    }

    fn unit_cost(&self) -> f64 {
        self.input_price + self.output_price
    }
}

/// Result of pricing one call. `Unpriced` means the service or model is
/// missing from the table, which is not the same as being free.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum CostEstimate {
    Priced(f64),
    Unpriced,
}

impl CostEstimate {
    pub fn amount(&self) -> f64 {
        match self {
            Self::Priced(amount) => *amount,
            Self::Unpriced => 0.0,
        }
    }

    pub fn is_priced(&self) -> bool {
        matches!(self, Self::Priced(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingTable {
    pub version: String,
    pub services: BTreeMap<String, BTreeMap<String, ModelPrice>>,
}

impl PricingTable {
    pub fn builtin() -> Self {
        let entries: &[(&str, &[(&str, ModelPrice)])] = &[
            (
                "openai",
                &[
                    (DEFAULT_MODEL, ModelPrice::new(0.0015, 0.002)),
                    ("gpt-3.5-turbo", ModelPrice::new(0.0015, 0.002)),
                    ("gpt-4", ModelPrice::new(0.03, 0.06)),
                    ("gpt-4o", ModelPrice::new(0.0025, 0.01)),
                    ("gpt-4o-mini", ModelPrice::new(0.00015, 0.0006)),
                ],
            ),
            (
                "anthropic",
                &[
                    (DEFAULT_MODEL, ModelPrice::new(0.00025, 0.00125)),
                    ("claude-3-haiku", ModelPrice::new(0.00025, 0.00125)),
                    ("claude-3-5-sonnet", ModelPrice::new(0.003, 0.015)),
                ],
            ),
            ("deepl", &[(DEFAULT_MODEL, ModelPrice::new(0.02, 0.0))]),
            ("google", &[(DEFAULT_MODEL, ModelPrice::new(0.02, 0.0))]),
        ];

        let services = entries
            .iter()
            .map(|(service, models)| {
                let models = models
                    .iter()
                    .map(|(model, price)| (model.to_string(), *price))
                    .collect();
                (service.to_string(), models)
            })
            .collect();

        Self {
            version: "builtin-2024-06".to_string(),
            services,
        }
    }

    pub fn from_file(path: &Path) -> MetricsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let table: PricingTable = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> MetricsResult<()> {
        for (service, models) in &self.services {
            for (model, price) in models {
                let valid = [price.input_price, price.output_price]
                    .iter()
                    .all(|value| value.is_finite() && *value >= 0.0);
                if !valid {
                    return Err(MetricsError::Config(format!(
                        "invalid price for {}/{} in pricing table {}",
                        service, model, self.version
                    )));
                }
            }
        }
        Ok(())
    }

    /// Exact model first, then the service's `default` entry.
    pub fn lookup(&self, service: &str, model: Option<&str>) -> Option<&ModelPrice> {
        let models = self.services.get(service)?;
        model
            .and_then(|model| models.get(model))
            .or_else(|| models.get(DEFAULT_MODEL))
    }

    pub fn estimate_cost(
        &self,
        service: &str,
        input_length: u64,
        output_length: u64,
        model: Option<&str>,
    ) -> CostEstimate {
        match self.lookup(service, model) {
            Some(price) => CostEstimate::Priced(price.cost(input_length, output_length)),
            None => CostEstimate::Unpriced,
        }
    }

    /// Cheapest named model of `service` that costs less per unit than the
    /// model currently in use.
    pub fn cheaper_model(
        &self,
        service: &str,
        current: Option<&str>,
    ) -> Option<(String, ModelPrice)> {
        let current_price = self.lookup(service, current)?.unit_cost();
        self.services
            .get(service)?
            .iter()
            .filter(|(model, price)| {
                model.as_str() != DEFAULT_MODEL && price.unit_cost() < current_price
            })
            .min_by(|a, b| a.1.unit_cost().total_cmp(&b.1.unit_cost()))
            .map(|(model, price)| (model.clone(), *price))
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Shared handle to the current pricing table.
///
/// Readers take a cheap `Arc` snapshot; reloads swap the whole table so a
/// reader never observes a half-applied update.
#[derive(Debug)]
pub struct PricingCatalog {
    current: RwLock<Arc<PricingTable>>,
    path: Option<PathBuf>,
}

impl PricingCatalog {
    pub fn new(table: PricingTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
            path: None,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> MetricsResult<Self> {
        let path = path.into();
        let table = PricingTable::from_file(&path)?;
        log::info!("Loaded pricing table {} from {:?}", table.version, path);
        Ok(Self {
            current: RwLock::new(Arc::new(table)),
            path: Some(path),
        })
    }

    pub fn current(&self) -> Arc<PricingTable> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> String {
        self.current.read().version.clone()
    }

    pub fn replace(&self, table: PricingTable) -> MetricsResult<()> {
        table.validate()?;
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(table));
        log::info!(
            "Pricing table replaced: {} -> {}",
            previous.version,
            self.version()
        );
        Ok(())
    }

    /// Re-reads the backing file. A table that fails to parse or validate
    /// leaves the current one in place.
    pub fn reload(&self) -> MetricsResult<String> {
        let path = self.path.as_ref().ok_or_else(|| {
            MetricsError::Config("pricing catalog has no backing file".to_string())
        })?;
        let table = PricingTable::from_file(path)?;
        let version = table.version.clone();
        self.replace(table)?;
        Ok(version)
    }

    /// Reloads the table whenever its file changes, until `cancel` fires.
    pub fn watch(self: &Arc<Self>, cancel: CancellationToken) -> MetricsResult<JoinHandle<()>> {
        let path = self.path.clone().ok_or_else(|| {
            MetricsError::Config("pricing catalog has no backing file".to_string())
        })?;
        if !path.exists() {
            return Err(MetricsError::Config(format!(
                "pricing file not found: {:?}",
                path
            )));
        }

        let catalog = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<notify::Event>>(16);
            let forward = move |res: notify::Result<notify::Event>| {
                let _ = event_tx.blocking_send(res);
            };
            let mut watcher = match notify::recommended_watcher(forward) {
                Ok(watcher) => watcher,
                Err(error) => {
                    log::error!("Failed to create pricing file watcher: {}", error);
                    return;
                }
            };
            if let Err(error) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                log::error!("Failed to watch pricing file {:?}: {}", path, error);
                return;
            }
            log::info!("Watching pricing file: {:?}", path);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        match event {
                            Ok(event) if is_content_change(&event.kind) => {
                                catalog.reload_logged();
                            }
                            Ok(_) => {}
                            Err(error) => log::warn!("Pricing watch error: {}", error),
                        }
                    }
                }
            }
            log::debug!("Stopped watching pricing file {:?}", path);
        }))
    }
}

impl PricingCatalog {
    fn reload_logged(&self) {
        match self.reload() {
            Ok(version) => log::info!("Pricing table reloaded: {}", version),
            Err(error) => {
                log::warn!("Pricing reload rejected, keeping current table: {}", error)
            }
        }
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::new(PricingTable::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn one_full_unit_costs_input_plus_output_price() {
        let table = PricingTable::builtin();
        let price = *table.lookup("openai", Some("gpt-4")).expect("gpt-4 price");

        let estimate = table.estimate_cost("openai", 1000, 1000, Some("gpt-4"));
        assert_eq!(
            estimate,
            CostEstimate::Priced(price.input_price + price.output_price)
        );
    }

    #[test]
    fn unknown_model_falls_back_to_service_default() {
        let table = PricingTable::builtin();
        let default = table.lookup("openai", None).copied();
        assert_eq!(table.lookup("openai", Some("nonexistent")).copied(), default);
    }

    #[test]
    fn unknown_service_is_unpriced_rather_than_free() {
        let table = PricingTable::builtin();
        let estimate = table.estimate_cost("babelfish", 5000, 5000, None);
        assert_eq!(estimate, CostEstimate::Unpriced);
        assert!(!estimate.is_priced());
        assert_eq!(estimate.amount(), 0.0);
    }

    #[test]
    fn cheaper_model_picks_the_cheapest_alternative() {
        let table = PricingTable::builtin();
        let (model, _) = table
            .cheaper_model("openai", Some("gpt-4"))
            .expect("cheaper model");
        assert_eq!(model, "gpt-4o-mini");
        assert!(table.cheaper_model("openai", Some("gpt-4o-mini")).is_none());
        assert!(table.cheaper_model("deepl", None).is_none());
    }

    #[test]
    fn reload_swaps_the_table_and_rejects_invalid_prices() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("pricing.toml");
        std::fs::write(
            &path,
            r#"
            version = "v1"
            [services.deepl.default]
            input_price = 0.02
            output_price = 0.0
            "#,
        )
        .expect("write pricing");

        let catalog = PricingCatalog::from_file(&path).expect("load pricing");
        assert_eq!(catalog.version(), "v1");

        std::fs::write(
            &path,
            r#"
            version = "v2"
            [services.deepl.default]
            input_price = 0.025
            output_price = 0.0
            "#,
        )
        .expect("write pricing");
        assert_eq!(catalog.reload().expect("reload"), "v2");
        let snapshot = catalog.current();
        assert_eq!(
            snapshot.estimate_cost("deepl", 2000, 0, None),
            CostEstimate::Priced(0.05)
        );

        std::fs::write(
            &path,
            r#"
            version = "v3"
            [services.deepl.default]
            input_price = -1.0
            output_price = 0.0
            "#,
        )
        .expect("write pricing");
        assert!(catalog.reload().is_err());
        assert_eq!(catalog.version(), "v2");
    }

    #[test]
    fn catalog_without_file_cannot_reload() {
        let catalog = PricingCatalog::default();
        assert!(matches!(catalog.reload(), Err(MetricsError::Config(_))));
    }
}
