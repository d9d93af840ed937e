use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Serialize};

use crate::{DeltaRejection, Error, Result};

/// Counter name to delta, as produced by one registration event.
pub type Deltas = BTreeMap<String, f64>;

/// Counter values of one state key.
///
/// Values are non-negative. The only way to change them is
/// [`CounterState::with_deltas`], which validates the whole group of deltas
/// before returning a new state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterState(BTreeMap<String, f64>);

impl CounterState {
    pub fn new() -> Self {
        CounterState::default()
    }

    pub fn get(&self, counter: &str) -> Option<f64> {
        self.0.get(counter).copied()
    }

    /// Returns the counter value, failing with [`Error::MissingCounter`]
    /// instead of defaulting to zero.
    pub fn require(&self, counter: &str) -> Result<f64> {
        self.get(counter)
            .ok_or_else(|| Error::MissingCounter(counter.to_string()))
    }

    pub fn insert(&mut self, counter: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(counter.into(), value)
    }

    pub fn contains(&self, counter: &str) -> bool {
        self.0.contains_key(counter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.0.iter()
    }

    /// Applies a group of deltas, returning the resulting state.
    ///
    /// The group is all or nothing: the first rejected delta fails the whole
    /// call and `self` is never modified. Negative deltas require
    /// `allow_correction`, and no counter may end up below zero.
    pub fn with_deltas(&self, deltas: &Deltas, allow_correction: bool) -> Result<CounterState> {
        let mut next = self.clone();
        for (counter, delta) in deltas {
            let reject = |reason| Error::InvalidDelta {
                counter: counter.clone(),
                reason,
            };

            if !delta.is_finite() {
                return Err(reject(DeltaRejection::NotFinite));
            }
            if *delta < 0.0 && !allow_correction {
                return Err(reject(DeltaRejection::NegativeWithoutCorrection));
            }

            let value = next
                .0
                .get_mut(counter)
                .ok_or_else(|| Error::MissingCounter(counter.clone()))?;
            let updated = *value + delta;
            if updated < 0.0 {
                return Err(reject(DeltaRejection::BelowZero(updated)));
            }
            *value = updated;
        }

        Ok(next)
    }
}

impl FromIterator<(String, f64)> for CounterState {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        CounterState(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<(&'a str, f64)> for CounterState {
    fn from_iter<T: IntoIterator<Item = (&'a str, f64)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(counter, value)| (counter.to_string(), value))
            .collect()
    }
}

impl<'a> IntoIterator for &'a CounterState {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
