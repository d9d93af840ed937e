use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CounterState, DerivedMetric};

/// Read-only view over one or more campaigns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub generated_at: DateTime<Utc>,
    pub campaigns: Vec<CampaignSnapshot>,
    /// Each counter name summed across all listed campaigns.
    pub totals: CounterState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub campaign: String,
    pub name: String,
    /// One entry per sub-key, or a single entry.
    pub entries: Vec<EntrySnapshot>,
    pub totals: CounterState,
    /// Totals divided by the number of entries.
    pub averages: CounterState,
    /// Metrics derived from the totals.
    pub metrics: Vec<DerivedMetric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranking: Vec<RankingEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_key: Option<String>,
    pub name: String,
    pub counters: CounterState,
    pub metrics: Vec<DerivedMetric>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// 1 for the highest score.
    pub position: usize,
    pub campaign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_key: Option<String>,
    pub name: String,
    pub score: f64,
}

impl AggregateSnapshot {
    pub fn campaign(&self, key: &str) -> Option<&CampaignSnapshot> {
        self.campaigns.iter().find(|campaign| campaign.campaign == key)
    }
}

impl CampaignSnapshot {
    pub fn entry(&self, sub_key: Option<&str>) -> Option<&EntrySnapshot> {
        self.entries
            .iter()
            .find(|entry| entry.sub_key.as_deref() == sub_key)
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        find_metric(&self.metrics, name)
    }
}

impl EntrySnapshot {
    pub fn metric(&self, name: &str) -> Option<f64> {
        find_metric(&self.metrics, name)
    }
}

fn find_metric(metrics: &[DerivedMetric], name: &str) -> Option<f64> {
    metrics
        .iter()
        .find(|metric| metric.name == name)
        .map(|metric| metric.value)
}
