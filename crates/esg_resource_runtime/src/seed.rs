//! Initial counter values.
//!
//! Seeding is kept out of the deterministic core: the store asks a
//! [`SeedGenerator`] for the counters of a key it has never seen, and
//! [`Runtime::seed_all`](crate::Runtime::seed_all) regenerates every key on
//! demand.

use std::collections::BTreeMap;
use std::sync::Mutex;

use clap::ValueEnum;
use esg_resource::{Campaign, CounterState, SeedRule};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces the initial counters of a state key.
pub trait SeedGenerator: Send + Sync {
    fn seed(&self, campaign: &Campaign, sub_key: Option<&str>) -> CounterState;
}

/// Seeds every range at its lower bound.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaselineSeeder;

impl SeedGenerator for BaselineSeeder {
    fn seed(&self, campaign: &Campaign, sub_key: Option<&str>) -> CounterState {
        generate(campaign, sub_key, |low, _| low)
    }
}

/// Seeds ranges with sample data.
#[derive(Debug)]
pub struct RandomSeeder {
    rng: Mutex<StdRng>,
}

impl RandomSeeder {
    /// Creates a seeder, reproducible when `seed` is given.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomSeeder {
            rng: Mutex::new(rng),
        }
    }
}

impl SeedGenerator for RandomSeeder {
    fn seed(&self, campaign: &Campaign, sub_key: Option<&str>) -> CounterState {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        generate(campaign, sub_key, |low, high| rng.gen_range(low..high))
    }
}

/// Seed generator selected on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SeederKind {
    /// Lower bound of every range
    Baseline,
    /// Sample data from a random number generator
    #[default]
    Random,
}

impl SeederKind {
    pub fn build(self, rng_seed: Option<u64>) -> Box<dyn SeedGenerator> {
        match self {
            SeederKind::Baseline => Box::new(BaselineSeeder),
            SeederKind::Random => Box::new(RandomSeeder::new(rng_seed)),
        }
    }
}

/// Applies the seed rules in counter declaration order, so `sum` rules see
/// the counters declared before them. Counters without a rule start at zero.
fn generate(
    campaign: &Campaign,
    sub_key: Option<&str>,
    mut range: impl FnMut(i64, i64) -> i64,
) -> CounterState {
    let mut counters = BTreeMap::new();
    for counter in &campaign.counters {
        let value = match campaign.seed_rule(counter, sub_key) {
            Some(SeedRule::Fixed(value)) => *value,
            Some(SeedRule::Range { low, high }) if low < high => range(*low, *high) as f64,
            Some(SeedRule::Range { low, .. }) => *low as f64,
            Some(SeedRule::Sum(terms)) => terms
                .iter()
                .map(|(term, weight)| weight * counters.get(term).copied().unwrap_or(0.0))
                .sum(),
            None => 0.0,
        };
        counters.insert(counter.clone(), value);
    }

    counters.into_iter().collect()
}
