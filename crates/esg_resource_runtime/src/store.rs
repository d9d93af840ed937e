use std::sync::Arc;
use std::thread;

use dashmap::DashMap;
use esg_resource::{Catalog, CounterState, Deltas, Error, Result, StateKey};
use tracing::{debug, trace, warn};

use crate::seed::SeedGenerator;

/// Retries after a version conflict before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// Counter state of every state key.
///
/// Updates use optimistic concurrency: a delta is validated against a
/// snapshot off-lock and committed only if the slot's version is unchanged.
/// Each committed update and each reset increments the version.
pub struct CampaignStateStore {
    catalog: Arc<Catalog>,
    seeder: Box<dyn SeedGenerator>,
    slots: DashMap<StateKey, Slot>,
    max_retries: u32,
}

#[derive(Clone, Debug)]
struct Slot {
    version: u64,
    counters: CounterState,
}

impl CampaignStateStore {
    pub fn new(catalog: Arc<Catalog>, seeder: Box<dyn SeedGenerator>) -> Self {
        CampaignStateStore {
            catalog,
            seeder,
            slots: DashMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the counters of a key, seeding it on first access.
    pub fn get(&self, key: &StateKey) -> Result<CounterState> {
        self.snapshot(key).map(|(_, counters)| counters)
    }

    /// Applies a group of deltas atomically.
    ///
    /// Either every delta is reflected in the returned state or none is.
    pub fn apply_delta(
        &self,
        key: &StateKey,
        deltas: &Deltas,
        allow_correction: bool,
    ) -> Result<CounterState> {
        self.apply_delta_with(key, deltas, allow_correction, |_| Ok(()))
    }

    /// Like [`apply_delta`](Self::apply_delta), but runs `check` against the
    /// candidate state before committing it. A failed check leaves the key
    /// unchanged.
    pub fn apply_delta_with<F>(
        &self,
        key: &StateKey,
        deltas: &Deltas,
        allow_correction: bool,
        check: F,
    ) -> Result<CounterState>
    where
        F: Fn(&CounterState) -> Result<()>,
    {
        let attempts = self.max_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let (version, current) = self.snapshot(key)?;
            let next = current.with_deltas(deltas, allow_correction)?;
            check(&next)?;

            if let Some(mut slot) = self.slots.get_mut(key) {
                if slot.version == version {
                    slot.version += 1;
                    slot.counters = next.clone();
                    trace!(%key, version = slot.version, "committed deltas");
                    return Ok(next);
                }
            }

            debug!(%key, attempt, "version conflict");
            thread::yield_now();
        }

        warn!(%key, attempts, "retries exhausted");
        Err(Error::ConcurrentUpdateConflict {
            key: key.clone(),
            attempts,
        })
    }

    /// Replaces the whole counter set of a key.
    ///
    /// Every seed counter must be declared by the campaign and hold a finite,
    /// non-negative value.
    pub fn reset(&self, key: &StateKey, seed: CounterState) -> Result<()> {
        let campaign = self.catalog.check(key)?;
        for (counter, value) in &seed {
            if !campaign.declares(counter) {
                return Err(Error::UnknownCounter {
                    campaign: campaign.key.clone(),
                    counter: counter.clone(),
                });
            }
            if !value.is_finite() || *value < 0.0 {
                return Err(Error::InvalidCounterValue {
                    counter: counter.clone(),
                    value: *value,
                });
            }
        }

        let mut slot = self.slots.entry(key.clone()).or_insert_with(|| Slot {
            version: 0,
            counters: CounterState::new(),
        });
        slot.version += 1;
        slot.counters = seed;
        trace!(%key, version = slot.version, "reset counters");

        Ok(())
    }

    /// Resets a key with freshly generated counters.
    pub fn reseed(&self, key: &StateKey) -> Result<CounterState> {
        let campaign = self.catalog.check(key)?;
        let seed = self.seeder.seed(campaign, key.sub_key());
        self.reset(key, seed.clone())?;
        Ok(seed)
    }

    fn snapshot(&self, key: &StateKey) -> Result<(u64, CounterState)> {
        let campaign = self.catalog.check(key)?;
        if let Some(slot) = self.slots.get(key) {
            return Ok((slot.version, slot.counters.clone()));
        }

        let seed = self.seeder.seed(campaign, key.sub_key());
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot {
                version: 0,
                counters: seed,
            });
        Ok((slot.version, slot.counters.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use esg_resource::{Catalog, CounterState, Deltas, Error, StateKey};
    use serde_json::json;
    use tracing_test::traced_test;

    use super::CampaignStateStore;
    use crate::seed::BaselineSeeder;

    fn store() -> CampaignStateStore {
        let catalog = Catalog::from_json_str(
            &json!({
                "campaigns": [{
                    "key": "zero_cup",
                    "name": "Zero cup",
                    "counters": ["participants", "N"],
                    "seed": { "participants": { "fixed": 10.0 }, "N": { "fixed": 4.0 } }
                }]
            })
            .to_string(),
        )
        .unwrap();
        CampaignStateStore::new(Arc::new(catalog), Box::new(BaselineSeeder))
    }

    fn key() -> StateKey {
        StateKey::new("zero_cup", None).unwrap()
    }

    fn deltas(values: &[(&str, f64)]) -> Deltas {
        values
            .iter()
            .map(|(counter, delta)| (counter.to_string(), *delta))
            .collect()
    }

    #[test]
    fn get_seeds_lazily() {
        let store = store();
        let counters = store.get(&key()).unwrap();
        assert_eq!(counters.get("participants"), Some(10.0));
        assert_eq!(counters.get("N"), Some(4.0));
    }

    #[test]
    fn apply_delta_commits_whole_group() {
        let store = store();
        let next = store
            .apply_delta(&key(), &deltas(&[("participants", 1.0), ("N", 2.0)]), false)
            .unwrap();
        assert_eq!(next.get("participants"), Some(11.0));
        assert_eq!(next.get("N"), Some(6.0));
        assert_eq!(store.get(&key()).unwrap(), next);
    }

    #[test]
    fn rejected_delta_leaves_state_unchanged() {
        let store = store();
        let before = store.get(&key()).unwrap();
        let err = store
            .apply_delta(&key(), &deltas(&[("participants", 1.0), ("W", 1.0)]), false)
            .unwrap_err();
        assert_eq!(err, Error::MissingCounter("W".to_string()));
        assert_eq!(store.get(&key()).unwrap(), before);
    }

    #[test]
    fn failed_check_leaves_state_unchanged() {
        let store = store();
        let before = store.get(&key()).unwrap();
        let err = store
            .apply_delta_with(&key(), &deltas(&[("N", 1.0)]), false, |_| {
                Err(Error::MissingCounter("R".to_string()))
            })
            .unwrap_err();
        assert_eq!(err, Error::MissingCounter("R".to_string()));
        assert_eq!(store.get(&key()).unwrap(), before);
    }

    #[test]
    fn reset_then_get_returns_seed() {
        let store = store();
        let seed: CounterState = [("participants", 3.0), ("N", 0.0)].into_iter().collect();
        store.reset(&key(), seed.clone()).unwrap();
        assert_eq!(store.get(&key()).unwrap(), seed);
    }

    #[test]
    fn reset_validates_seed() {
        let store = store();
        let unknown: CounterState = [("W", 1.0)].into_iter().collect();
        assert!(matches!(
            store.reset(&key(), unknown),
            Err(Error::UnknownCounter { .. })
        ));

        let negative: CounterState = [("N", -1.0)].into_iter().collect();
        assert!(matches!(
            store.reset(&key(), negative),
            Err(Error::InvalidCounterValue { .. })
        ));
    }

    #[test]
    fn unknown_campaign() {
        let store = store();
        let key = StateKey::new("recycling", None).unwrap();
        assert_eq!(
            store.get(&key),
            Err(Error::UnknownCampaign("recycling".to_string()))
        );
    }

    #[test]
    #[traced_test]
    fn retries_exhausted_on_constant_conflicts() {
        let store = store().with_max_retries(2);
        let err = store
            .apply_delta_with(&key(), &deltas(&[("N", 1.0)]), false, |_| {
                // Move the version on under every attempt.
                store.reseed(&key()).map(drop)
            })
            .unwrap_err();
        assert_eq!(
            err,
            Error::ConcurrentUpdateConflict {
                key: key(),
                attempts: 3,
            }
        );
        assert!(err.is_transient());

        logs_assert(|lines: &[&str]| {
            let conflicts: Vec<_> = lines
                .iter()
                .filter(|line| line.contains("version conflict"))
                .collect();
            if conflicts.len() != 3 {
                return Err(format!("expected 3 conflicts, got {}", conflicts.len()));
            }
            if conflicts.iter().any(|line| !line.contains("DEBUG")) {
                return Err("conflicts must be logged at debug".to_string());
            }
            match lines.iter().filter(|line| line.contains("WARN")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {n}")),
            }
        });
    }
}
