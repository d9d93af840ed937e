use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use esg_resource::{
    AggregateSnapshot, Campaign, CampaignSnapshot, CounterState, DerivedMetric, EntrySnapshot,
    FormulaRegistry, RankingEntry, Result, StateKey,
};

use crate::store::CampaignStateStore;

/// Read-only views over the store.
///
/// Metrics are derived from the counters read for each view and never
/// cached. Campaign metrics combine the entry metrics as each metric's
/// [`Aggregation`](esg_resource::Aggregation) says.
#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<FormulaRegistry>,
    store: Arc<CampaignStateStore>,
}

/// A state key pinned to counters already read, such as the result of a
/// commit.
pub type Pinned<'a> = Option<(&'a StateKey, &'a CounterState)>;

struct Candidate {
    campaign_position: usize,
    sub_key_position: usize,
    campaign: String,
    sub_key: Option<String>,
    name: String,
    score: f64,
}

impl Aggregator {
    pub fn new(registry: Arc<FormulaRegistry>, store: Arc<CampaignStateStore>) -> Self {
        Aggregator { registry, store }
    }

    /// Summarizes the listed campaigns, in the order given.
    ///
    /// Repeated keys are summarized once.
    pub fn summarize<S: AsRef<str>>(&self, campaigns: &[S]) -> Result<AggregateSnapshot> {
        self.summarize_with(campaigns, None)
    }

    /// Summarizes the listed campaigns, using `pinned` counters instead of
    /// reading that key from the store.
    pub fn summarize_with<S: AsRef<str>>(
        &self,
        campaigns: &[S],
        pinned: Pinned<'_>,
    ) -> Result<AggregateSnapshot> {
        let campaigns = self.resolve(campaigns)?;

        let mut snapshots = Vec::with_capacity(campaigns.len());
        let mut totals = BTreeMap::new();
        for (_, campaign) in campaigns {
            let snapshot = self.campaign_snapshot(campaign, pinned)?;
            accumulate(&mut totals, &snapshot.totals);
            snapshots.push(snapshot);
        }

        Ok(AggregateSnapshot {
            generated_at: Utc::now(),
            campaigns: snapshots,
            totals: totals.into_iter().collect(),
        })
    }

    /// Ranks every entry of the listed campaigns by `metric`, highest first.
    ///
    /// Ties keep campaign registration order, then sub-key declaration
    /// order. Every listed campaign must declare the metric.
    pub fn rank<S: AsRef<str>>(&self, campaigns: &[S], metric: &str) -> Result<Vec<RankingEntry>> {
        let campaigns = self.resolve(campaigns)?;

        let mut candidates = Vec::new();
        for (campaign_position, campaign) in campaigns {
            campaign.metric(metric)?;
            for (sub_key_position, key) in campaign.state_keys().into_iter().enumerate() {
                let counters = self.store.get(&key)?;
                candidates.push(Candidate {
                    campaign_position,
                    sub_key_position,
                    campaign: campaign.key.clone(),
                    sub_key: key.sub_key().map(str::to_string),
                    name: campaign.entry_name(key.sub_key()).to_string(),
                    score: self.registry.derive_one(&campaign.key, metric, &counters)?,
                });
            }
        }

        Ok(ranked(candidates))
    }

    fn resolve<'a, S: AsRef<str>>(&'a self, campaigns: &[S]) -> Result<Vec<(usize, &'a Campaign)>> {
        let catalog = self.store.catalog();
        let mut resolved: Vec<(usize, &Campaign)> = Vec::with_capacity(campaigns.len());
        for key in campaigns {
            let key = key.as_ref();
            let campaign = catalog.get(key)?;
            if resolved.iter().all(|(_, seen)| seen.key != key) {
                let position = catalog.position(key).unwrap_or_default();
                resolved.push((position, campaign));
            }
        }
        Ok(resolved)
    }

    fn campaign_snapshot(&self, campaign: &Campaign, pinned: Pinned<'_>) -> Result<CampaignSnapshot> {
        let mut entries = Vec::new();
        for key in campaign.state_keys() {
            let counters = match pinned {
                Some((pinned_key, counters)) if *pinned_key == key => counters.clone(),
                _ => self.store.get(&key)?,
            };
            entries.push(EntrySnapshot {
                sub_key: key.sub_key().map(str::to_string),
                name: campaign.entry_name(key.sub_key()).to_string(),
                metrics: self.registry.derive(&campaign.key, &counters)?,
                counters,
            });
        }

        let mut totals = BTreeMap::new();
        for entry in &entries {
            accumulate(&mut totals, &entry.counters);
        }
        let count = entries.len().max(1) as f64;
        let averages = totals
            .iter()
            .map(|(counter, total)| (counter.clone(), total / count))
            .collect();
        let totals: CounterState = totals.into_iter().collect();

        let ranking = match &campaign.ranking {
            Some(metric) => ranked(
                entries
                    .iter()
                    .enumerate()
                    .map(|(sub_key_position, entry)| Candidate {
                        campaign_position: 0,
                        sub_key_position,
                        campaign: campaign.key.clone(),
                        sub_key: entry.sub_key.clone(),
                        name: entry.name.clone(),
                        score: entry.metric(metric).unwrap_or_default(),
                    })
                    .collect(),
            ),
            None => Vec::new(),
        };

        let entry_metrics: Vec<&[DerivedMetric]> =
            entries.iter().map(|entry| entry.metrics.as_slice()).collect();
        let metrics = self
            .registry
            .combine(&campaign.key, &entry_metrics, &totals)?;

        Ok(CampaignSnapshot {
            campaign: campaign.key.clone(),
            name: campaign.name.clone(),
            metrics,
            entries,
            totals,
            averages,
            ranking,
        })
    }
}

fn accumulate(totals: &mut BTreeMap<String, f64>, counters: &CounterState) {
    for (counter, value) in counters {
        *totals.entry(counter.clone()).or_default() += value;
    }
}

fn ranked(mut candidates: Vec<Candidate>) -> Vec<RankingEntry> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.campaign_position.cmp(&b.campaign_position))
            .then_with(|| a.sub_key_position.cmp(&b.sub_key_position))
    });

    candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| RankingEntry {
            position: index + 1,
            campaign: candidate.campaign,
            sub_key: candidate.sub_key,
            name: candidate.name,
            score: candidate.score,
        })
        .collect()
}
