use std::collections::HashMap;

use tracing::trace;

use crate::{Catalog, CounterState, DerivedMetric, Error, MetricDefinition, Result};

/// Metric definitions by campaign key.
///
/// Metrics are derived on every read and never cached, so a derived value
/// always matches the counters it was computed from.
#[derive(Clone, Debug, Default)]
pub struct FormulaRegistry {
    metrics: HashMap<String, Vec<MetricDefinition>>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        FormulaRegistry::default()
    }

    /// Registers the metrics of every campaign in the catalog.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut registry = FormulaRegistry::new();
        for campaign in catalog.iter() {
            registry.register(campaign.key.clone(), campaign.metrics.clone());
        }
        registry
    }

    /// Registers the metrics of a campaign, returning the ones it replaced.
    pub fn register(
        &mut self,
        campaign: impl Into<String>,
        metrics: Vec<MetricDefinition>,
    ) -> Option<Vec<MetricDefinition>> {
        let campaign = campaign.into();
        trace!(%campaign, metrics = metrics.len(), "registering metrics");
        self.metrics.insert(campaign, metrics)
    }

    pub fn contains(&self, campaign: &str) -> bool {
        self.metrics.contains_key(campaign)
    }

    pub fn metrics(&self, campaign: &str) -> Result<&[MetricDefinition]> {
        self.metrics
            .get(campaign)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownCampaign(campaign.to_string()))
    }

    /// Derives every metric of a campaign, in declaration order.
    pub fn derive(&self, campaign: &str, counters: &CounterState) -> Result<Vec<DerivedMetric>> {
        self.metrics(campaign)?
            .iter()
            .map(|metric| metric.derive(counters))
            .collect()
    }

    /// Combines the metrics derived for each entry of a campaign into
    /// campaign metrics, using each metric's [`Aggregation`](crate::Aggregation).
    ///
    /// `totals` must hold the summed counters of the same entries.
    pub fn combine(
        &self,
        campaign: &str,
        entries: &[&[DerivedMetric]],
        totals: &CounterState,
    ) -> Result<Vec<DerivedMetric>> {
        self.metrics(campaign)?
            .iter()
            .map(|definition| {
                let values: Vec<f64> = entries
                    .iter()
                    .filter_map(|metrics| {
                        metrics
                            .iter()
                            .find(|metric| metric.name == definition.name)
                            .map(|metric| metric.value)
                    })
                    .collect();
                definition.combine(&values, totals)
            })
            .collect()
    }

    /// Derives a single named metric.
    pub fn derive_one(&self, campaign: &str, metric: &str, counters: &CounterState) -> Result<f64> {
        let definition = self
            .metrics(campaign)?
            .iter()
            .find(|definition| definition.name == metric)
            .ok_or_else(|| Error::UnknownMetric {
                campaign: campaign.to_string(),
                metric: metric.to_string(),
            })?;
        definition.formula.evaluate(counters)
    }
}
