use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricsResult;
use crate::pricing::{CostEstimate, PricingCatalog, PricingTable};
use crate::scope::QueryScope;
use crate::stats::{dates_between, days_before, period_start};
use crate::storage::MetricsStorage;
use crate::types::MetricEvent;

const CHEAPER_MODEL_COST_PER_REQUEST: f64 = 0.01;
const BATCHING_MIN_REQUESTS: u64 = 100;
const BATCHING_MIN_COST: f64 = 1.0;
const CACHING_SHARE_PERCENT: f64 = 30.0;
const DAYS_PER_MONTH: f64 = 30.0;
const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub service_name: String,
    pub total_cost: f64,
    pub request_count: u64,
    pub avg_cost_per_request: f64,
    pub total_input_length: u64,
    pub total_output_length: u64,
    /// Share of the period's total cost, 0-100.
    pub percentage: f64,
    /// Requests whose service or model is missing from the pricing table.
    pub unpriced_requests: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    CheaperModel,
    Batching,
    Caching,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostSuggestion {
    pub kind: SuggestionKind,
    pub service_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyCostAnalysis {
    pub date: NaiveDate,
    pub pricing_version: String,
    pub total_cost: f64,
    pub total_requests: u64,
    pub unpriced_requests: u64,
    /// Most expensive first.
    pub services: Vec<CostBreakdown>,
    pub suggestions: Vec<CostSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceValue {
    pub service_name: String,
    pub total_cost: f64,
    pub request_count: u64,
    pub cost_per_request: f64,
    pub avg_confidence: f64,
    pub avg_response_time: f64,
    /// `None` for free and unpriced services.
    pub value_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceCostComparison {
    pub days: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Priced services, best value first.
    pub ranked: Vec<ServiceValue>,
    /// Priced services whose table price is zero.
    pub free: Vec<ServiceValue>,
    /// Services with no table price for any of their requests.
    pub unpriced: Vec<ServiceValue>,
    pub best_value: Option<String>,
    pub worst_value: Option<String>,
    /// Saving from serving the worst service's volume at the best service's
    /// cost per request.
    pub estimated_savings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyCost {
    pub date: NaiveDate,
    pub total_cost: f64,
    pub total_requests: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostReport {
    pub days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub pricing_version: String,
    pub daily_costs: Vec<DailyCost>,
    pub total_cost: f64,
    pub daily_average: f64,
    pub projected_monthly_cost: f64,
    pub projected_annual_cost: f64,
    pub comparison: ServiceCostComparison,
    pub suggestions: Vec<CostSuggestion>,
}

#[derive(Debug, Default)]
struct ServiceAccumulator {
    total_cost: f64,
    request_count: u64,
    unpriced_requests: u64,
    input_length: u64,
    output_length: u64,
    confidence_sum: f64,
    response_time_sum: f64,
    models: BTreeMap<String, u64>,
}

impl ServiceAccumulator {
    fn add(&mut self, event: &MetricEvent, cost: CostEstimate) {
        self.request_count += 1;
        self.total_cost += cost.amount();
        if !cost.is_priced() {
            self.unpriced_requests += 1;
        }
        self.input_length += event.input_length;
        self.output_length += event.output_length;
        self.confidence_sum += event.confidence_score;
        self.response_time_sum += event.response_time;
        if let Some(model) = &event.model {
            *self.models.entry(model.clone()).or_insert(0) += 1;
        }
    }

    fn average(&self, sum: f64) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            sum / self.request_count as f64
        }
    }

    fn dominant_model(&self) -> Option<&str> {
        self.models
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(model, _)| model.as_str())
    }
}

pub struct CostAnalyzer {
    storage: Arc<dyn MetricsStorage>,
    pricing: Arc<PricingCatalog>,
}

impl CostAnalyzer {
    pub fn new(storage: Arc<dyn MetricsStorage>, pricing: Arc<PricingCatalog>) -> Self {
        Self { storage, pricing }
    }

    pub fn pricing(&self) -> &Arc<PricingCatalog> {
        &self.pricing
    }

    pub fn estimate_cost(
        &self,
        service: &str,
        input_length: u64,
        output_length: u64,
        model: Option<&str>,
    ) -> CostEstimate {
        self.pricing
            .current()
            .estimate_cost(service, input_length, output_length, model)
    }

    pub async fn analyze_daily_costs(&self, date: NaiveDate) -> MetricsResult<DailyCostAnalysis> {
        let table = self.pricing.current();
        let events = self.storage.events_on(date).await?;
        let services = accumulate(&table, &events);

        let total_cost: f64 = services.values().map(|acc| acc.total_cost).sum();
        let breakdowns = breakdowns(&services, total_cost);
        let suggestions = suggestions(&table, &services, &breakdowns);

        log::debug!(
            "cost analysis for {}: {:.4} over {} services (pricing {})",
            date,
            total_cost,
            breakdowns.len(),
            table.version
        );

        Ok(DailyCostAnalysis {
            date,
            pricing_version: table.version.clone(),
            total_cost,
            total_requests: breakdowns.iter().map(|item| item.request_count).sum(),
            unpriced_requests: breakdowns.iter().map(|item| item.unpriced_requests).sum(),
            services: breakdowns,
            suggestions,
        })
    }

    pub async fn compare_service_costs(
        &self,
        days: u32,
        now: DateTime<Utc>,
        scope: &QueryScope,
    ) -> MetricsResult<ServiceCostComparison> {
        scope.check()?;
        let days = days.max(1);
        let start = days_before(now, days)?;
        let table = self.pricing.current();
        let events = self.storage.events_between(start, now, None).await?;
        let services = accumulate(&table, &events);

        let mut ranked = Vec::new();
        let mut free = Vec::new();
        let mut unpriced = Vec::new();
        for (service, acc) in &services {
            let cost_per_request = acc.average(acc.total_cost);
            let avg_confidence = acc.average(acc.confidence_sum);
            let avg_response_time = acc.average(acc.response_time_sum);
            let value_score = (cost_per_request > 0.0).then(|| {
                let speed_score = (10.0 - avg_response_time).max(0.0) / 10.0;
                (avg_confidence * 0.6 + speed_score * 0.4) * 100.0 / cost_per_request
            });

            let value = ServiceValue {
                service_name: service.clone(),
                total_cost: acc.total_cost,
                request_count: acc.request_count,
                cost_per_request,
                avg_confidence,
                avg_response_time,
                value_score,
            };
            if acc.unpriced_requests == acc.request_count {
                unpriced.push(value);
            } else if value.value_score.is_some() {
                ranked.push(value);
            } else {
                free.push(value);
            }
        }
        ranked.sort_by(|a, b| {
            b.value_score
                .unwrap_or(0.0)
                .total_cmp(&a.value_score.unwrap_or(0.0))
        });

        let (best_value, worst_value, estimated_savings) = match (ranked.first(), ranked.last()) {
            (Some(best), Some(worst)) if ranked.len() > 1 => {
                let savings = worst.request_count as f64
                    * (worst.cost_per_request - best.cost_per_request);
                (
                    Some(best.service_name.clone()),
                    Some(worst.service_name.clone()),
                    savings.max(0.0),
                )
            }
            (Some(only), _) => (
                Some(only.service_name.clone()),
                Some(only.service_name.clone()),
                0.0,
            ),
            _ => (None, None, 0.0),
        };

        Ok(ServiceCostComparison {
            days,
            start,
            end: now,
            ranked,
            free,
            unpriced,
            best_value,
            worst_value,
            estimated_savings,
        })
    }

    pub async fn generate_cost_report(
        &self,
        days: u32,
        now: DateTime<Utc>,
        scope: &QueryScope,
    ) -> MetricsResult<CostReport> {
        let days = days.max(1);
        let end_date = now.date_naive();
        let start_date = period_start(end_date, days)?;

        let mut daily_costs = Vec::new();
        let mut merged: BTreeMap<(SuggestionKind, String), CostSuggestion> = BTreeMap::new();
        let mut pricing_version = self.pricing.version();

        for date in dates_between(start_date, end_date) {
            scope.check()?;
            let analysis = self.analyze_daily_costs(date).await?;
            daily_costs.push(DailyCost {
                date,
                total_cost: analysis.total_cost,
                total_requests: analysis.total_requests,
            });
            // Later days win so the message reflects the most recent numbers.
            for suggestion in analysis.suggestions {
                merged.insert((suggestion.kind, suggestion.service_name.clone()), suggestion);
            }
            pricing_version = analysis.pricing_version;
        }

        let comparison = self.compare_service_costs(days, now, scope).await?;
        let total_cost: f64 = daily_costs.iter().map(|day| day.total_cost).sum();
        let daily_average = total_cost / f64::from(days);

        Ok(CostReport {
            days,
            start_date,
            end_date,
            pricing_version,
            daily_costs,
            total_cost,
            daily_average,
            projected_monthly_cost: daily_average * DAYS_PER_MONTH,
            projected_annual_cost: daily_average * DAYS_PER_YEAR,
            comparison,
            suggestions: merged.into_values().collect(),
        })
    }
}

/// Groups successful events by service. A stored estimate wins; otherwise the
/// cost is recomputed from the current table.
fn accumulate(
    table: &PricingTable,
    events: &[MetricEvent],
) -> BTreeMap<String, ServiceAccumulator> {
    let mut services: BTreeMap<String, ServiceAccumulator> = BTreeMap::new();
    for event in events.iter().filter(|event| event.success) {
        let cost = if event.cost_estimate > 0.0 {
            CostEstimate::Priced(event.cost_estimate)
        } else {
            table.estimate_cost(
                &event.service_name,
                event.input_length,
                event.output_length,
                event.model.as_deref(),
            )
        };
        services
            .entry(event.service_name.clone())
            .or_default()
            .add(event, cost);
    }
    services
}

fn breakdowns(
    services: &BTreeMap<String, ServiceAccumulator>,
    total_cost: f64,
) -> Vec<CostBreakdown> {
    let mut breakdowns: Vec<CostBreakdown> = services
        .iter()
        .map(|(service, acc)| CostBreakdown {
            service_name: service.clone(),
            total_cost: acc.total_cost,
            request_count: acc.request_count,
            avg_cost_per_request: acc.average(acc.total_cost),
            total_input_length: acc.input_length,
            total_output_length: acc.output_length,
            percentage: if total_cost > 0.0 {
                acc.total_cost / total_cost * 100.0
            } else {
                0.0
            },
            unpriced_requests: acc.unpriced_requests,
        })
        .collect();
    breakdowns.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
    breakdowns
}

fn suggestions(
    table: &PricingTable,
    services: &BTreeMap<String, ServiceAccumulator>,
    breakdowns: &[CostBreakdown],
) -> Vec<CostSuggestion> {
    let mut suggestions = Vec::new();

    for item in breakdowns {
        if item.avg_cost_per_request > CHEAPER_MODEL_COST_PER_REQUEST {
            let current = services
                .get(&item.service_name)
                .and_then(ServiceAccumulator::dominant_model);
            let message = match table.cheaper_model(&item.service_name, current) {
                Some((model, _)) => format!(
                    "{} averages ${:.4} per request; consider switching to {}",
                    item.service_name, item.avg_cost_per_request, model
                ),
                None => format!(
                    "{} averages ${:.4} per request; consider a cheaper model or service",
                    item.service_name, item.avg_cost_per_request
                ),
            };
            suggestions.push(CostSuggestion {
                kind: SuggestionKind::CheaperModel,
                service_name: item.service_name.clone(),
                message,
            });
        }

        if item.request_count > BATCHING_MIN_REQUESTS && item.total_cost > BATCHING_MIN_COST {
            suggestions.push(CostSuggestion {
                kind: SuggestionKind::Batching,
                service_name: item.service_name.clone(),
                message: format!(
                    "{} handled {} requests costing ${:.2}; batch small requests together",
                    item.service_name, item.request_count, item.total_cost
                ),
            });
        }

        if breakdowns.len() > 1 && item.percentage > CACHING_SHARE_PERCENT {
            suggestions.push(CostSuggestion {
                kind: SuggestionKind::Caching,
                service_name: item.service_name.clone(),
                message: format!(
                    "{} accounts for {:.1}% of spend; cache repeated translations",
                    item.service_name, item.percentage
                ),
            });
        }
    }

    suggestions
}
