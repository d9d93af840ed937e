use std::sync::Arc;

use esg_resource::{
    AggregateSnapshot, CampaignInfo, Catalog, CounterState, FormulaRegistry, RankingEntry,
    RegistrationEvent, Result,
};
use tracing::{info, instrument, warn};

use crate::aggregate::Aggregator;
use crate::applier::EventApplier;
use crate::seed::SeedGenerator;
use crate::store::{CampaignStateStore, DEFAULT_MAX_RETRIES};

/// Owns the campaign state and every component acting on it.
///
/// Cheap to clone, and shared by every connection.
#[derive(Clone)]
pub struct Runtime {
    catalog: Arc<Catalog>,
    store: Arc<CampaignStateStore>,
    applier: EventApplier,
    aggregator: Aggregator,
}

impl Runtime {
    pub fn new(catalog: Catalog, seeder: Box<dyn SeedGenerator>) -> Self {
        Runtime::with_max_retries(catalog, seeder, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(
        catalog: Catalog,
        seeder: Box<dyn SeedGenerator>,
        max_retries: u32,
    ) -> Self {
        let registry = Arc::new(FormulaRegistry::from_catalog(&catalog));
        let catalog = Arc::new(catalog);
        let store = Arc::new(
            CampaignStateStore::new(Arc::clone(&catalog), seeder).with_max_retries(max_retries),
        );
        let aggregator = Aggregator::new(Arc::clone(&registry), Arc::clone(&store));
        let applier = EventApplier::new(registry, Arc::clone(&store), aggregator.clone());

        Runtime {
            catalog,
            store,
            applier,
            aggregator,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn campaigns(&self) -> Vec<CampaignInfo> {
        self.catalog.iter().map(CampaignInfo::from).collect()
    }

    #[instrument(skip(self), fields(campaign = %event.campaign, kind = %event.kind))]
    pub fn apply(&self, event: &RegistrationEvent) -> Result<AggregateSnapshot> {
        self.applier.apply(event).map_err(|err| {
            warn!("rejected event: {err}");
            err
        })
    }

    #[instrument(skip(self, seed))]
    pub fn reset(&self, campaign: &str, sub_key: Option<&str>, seed: CounterState) -> Result<()> {
        let key = self.catalog.get(campaign)?.state_key(sub_key)?;
        self.store.reset(&key, seed)?;
        info!(%key, "reset counters");
        Ok(())
    }

    /// Regenerates the counters of every key of a campaign.
    #[instrument(skip(self))]
    pub fn regenerate(&self, campaign: &str) -> Result<()> {
        let campaign = self.catalog.get(campaign)?;
        for key in campaign.state_keys() {
            self.store.reseed(&key)?;
        }
        info!(keys = campaign.state_keys().len(), "regenerated counters");
        Ok(())
    }

    /// Regenerates the counters of every campaign.
    #[instrument(skip(self))]
    pub fn seed_all(&self) -> Result<()> {
        for campaign in self.catalog.iter() {
            for key in campaign.state_keys() {
                self.store.reseed(&key)?;
            }
        }
        info!(campaigns = self.catalog.len(), "seeded counters");
        Ok(())
    }

    pub fn get(&self, campaign: &str, sub_key: Option<&str>) -> Result<CounterState> {
        let key = self.catalog.get(campaign)?.state_key(sub_key)?;
        self.store.get(&key)
    }

    pub fn summarize<S: AsRef<str>>(&self, campaigns: &[S]) -> Result<AggregateSnapshot> {
        self.aggregator.summarize(campaigns)
    }

    /// Summarizes every campaign, in registration order.
    pub fn summarize_all(&self) -> Result<AggregateSnapshot> {
        let keys: Vec<&str> = self.catalog.keys().collect();
        self.aggregator.summarize(keys.as_slice())
    }

    pub fn rank<S: AsRef<str>>(&self, campaigns: &[S], metric: &str) -> Result<Vec<RankingEntry>> {
        self.aggregator.rank(campaigns, metric)
    }
}
