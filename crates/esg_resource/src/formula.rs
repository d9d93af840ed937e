//! Derivation formulas.
//!
//! A formula turns a [`CounterState`] into one number. Formulas are pure:
//! they read nothing but the counters and their own constants, so the same
//! counters always derive the same metrics. Constants default to the
//! emission factors used across the dashboard and can be overridden per
//! campaign in the campaign table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CounterState, Result};

/// Emissions of one single-use item (kgCO₂eq).
pub const A_SINGLE: f64 = 0.15;
/// Emissions of one use of a multi-use item (kgCO₂eq).
pub const A_MULTI: f64 = 0.02;
/// Emissions of one A4 sheet (kgCO₂eq).
pub const PAPER_PER_SHEET: f64 = 0.00288;
/// Power draw of one light fixture (kW).
pub const FIXTURE_KW: f64 = 0.05;
/// Grid emission factor (kgCO₂eq/kWh).
pub const EMISSION_FACTOR: f64 = 0.459;
/// Energy of one elevator ride (kWh).
pub const ELEVATOR_KWH: f64 = 0.05;
/// Emissions of one car commute (kgCO₂eq).
pub const CAR_EMISSION: f64 = 2.2;
/// Emissions of one public transit commute (kgCO₂eq).
pub const TRANSIT_EMISSION: f64 = 0.6;

/// A derivation formula and its constants.
///
/// String fields name the counters the formula reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Formula {
    /// `(a_single - a_multi) × items`
    SingleUseSwap {
        items: String,
        #[serde(default = "a_single")]
        a_single: f64,
        #[serde(default = "a_multi")]
        a_multi: f64,
    },
    /// `(reused + circular) / (waste + circular) × 100`
    ///
    /// The denominator leaves out `reused`, so the rate exceeds 100 when
    /// reuse outweighs waste. It is deliberately not clamped.
    CircularUseRate {
        reused: String,
        circular: String,
        waste: String,
    },
    /// `sheets × emission_per_sheet`
    PaperReduction {
        sheets: String,
        #[serde(default = "paper_per_sheet")]
        emission_per_sheet: f64,
    },
    /// `fixture_kw × hours × fixtures × emission_factor`
    LightingReduction {
        hours: String,
        fixtures: String,
        #[serde(default = "fixture_kw")]
        fixture_kw: f64,
        #[serde(default = "emission_factor")]
        emission_factor: f64,
    },
    /// `stairs × elevator_kwh × emission_factor
    ///  + transit × (car_emission - transit_emission)
    ///  + bike × car_emission`
    CommuteReduction {
        stairs: String,
        transit: String,
        bike: String,
        #[serde(default = "elevator_kwh")]
        elevator_kwh: f64,
        #[serde(default = "emission_factor")]
        emission_factor: f64,
        #[serde(default = "car_emission")]
        car_emission: f64,
        #[serde(default = "transit_emission")]
        transit_emission: f64,
    },
    /// `counter × factor`
    Linear { counter: String, factor: f64 },
    /// `numerator / denominator × scale`
    Ratio {
        numerator: String,
        denominator: String,
        #[serde(default = "one")]
        scale: f64,
    },
    /// `Σ weight × counter`
    WeightedScore { weights: BTreeMap<String, f64> },
}

impl Formula {
    /// Evaluates the formula against a counter snapshot.
    ///
    /// Fails with [`Error::MissingCounter`](crate::Error::MissingCounter) if
    /// a referenced counter is absent. A zero denominator yields `0.0`.
    pub fn evaluate(&self, counters: &CounterState) -> Result<f64> {
        let value = match self {
            Formula::SingleUseSwap {
                items,
                a_single,
                a_multi,
            } => (a_single - a_multi) * counters.require(items)?,
            Formula::CircularUseRate {
                reused,
                circular,
                waste,
            } => {
                let r = counters.require(reused)?;
                let c = counters.require(circular)?;
                let w = counters.require(waste)?;
                ratio(r + c, w + c, 100.0)
            }
            Formula::PaperReduction {
                sheets,
                emission_per_sheet,
            } => counters.require(sheets)? * emission_per_sheet,
            Formula::LightingReduction {
                hours,
                fixtures,
                fixture_kw,
                emission_factor,
            } => {
                fixture_kw * counters.require(hours)? * counters.require(fixtures)? * emission_factor
            }
            Formula::CommuteReduction {
                stairs,
                transit,
                bike,
                elevator_kwh,
                emission_factor,
                car_emission,
                transit_emission,
            } => {
                counters.require(stairs)? * elevator_kwh * emission_factor
                    + counters.require(transit)? * (car_emission - transit_emission)
                    + counters.require(bike)? * car_emission
            }
            Formula::Linear { counter, factor } => counters.require(counter)? * factor,
            Formula::Ratio {
                numerator,
                denominator,
                scale,
            } => ratio(
                counters.require(numerator)?,
                counters.require(denominator)?,
                *scale,
            ),
            Formula::WeightedScore { weights } => {
                let mut score = 0.0;
                for (counter, weight) in weights {
                    score += weight * counters.require(counter)?;
                }
                score
            }
        };

        Ok(value)
    }

    /// Names of the counters the formula reads.
    pub fn counters(&self) -> Vec<&str> {
        match self {
            Formula::SingleUseSwap { items, .. } => vec![items.as_str()],
            Formula::CircularUseRate {
                reused,
                circular,
                waste,
            } => vec![reused.as_str(), circular, waste],
            Formula::PaperReduction { sheets, .. } => vec![sheets.as_str()],
            Formula::LightingReduction {
                hours, fixtures, ..
            } => vec![hours.as_str(), fixtures],
            Formula::CommuteReduction {
                stairs,
                transit,
                bike,
                ..
            } => vec![stairs.as_str(), transit, bike],
            Formula::Linear { counter, .. } => vec![counter.as_str()],
            Formula::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator],
            Formula::WeightedScore { weights } => weights.keys().map(String::as_str).collect(),
        }
    }

    /// How values derived per entry combine into one campaign value.
    pub fn aggregation(&self) -> Aggregation {
        match self {
            Formula::SingleUseSwap { .. }
            | Formula::PaperReduction { .. }
            | Formula::LightingReduction { .. }
            | Formula::CommuteReduction { .. }
            | Formula::Linear { .. } => Aggregation::Sum,
            Formula::CircularUseRate { .. } | Formula::Ratio { .. } => Aggregation::Pooled,
            Formula::WeightedScore { .. } => Aggregation::Mean,
        }
    }
}

/// Combination of per-entry metric values into a campaign value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Sum of the entry values.
    Sum,
    /// Mean of the entry values.
    Mean,
    /// The formula evaluated once over the summed counters.
    Pooled,
}

fn ratio(numerator: f64, denominator: f64, scale: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator * scale
}

/// A named metric of a campaign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub formula: Formula,
    /// Overrides the formula's own [`Formula::aggregation`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Aggregation>,
}

impl MetricDefinition {
    pub fn derive(&self, counters: &CounterState) -> Result<DerivedMetric> {
        Ok(DerivedMetric {
            name: self.name.clone(),
            value: self.formula.evaluate(counters)?,
            unit: self.unit.clone(),
        })
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregate.unwrap_or_else(|| self.formula.aggregation())
    }

    /// Combines the values derived for each entry of a campaign.
    ///
    /// `totals` holds the summed counters of the same entries and is only
    /// read by pooled metrics. No entries combine to `0.0`.
    pub fn combine(&self, values: &[f64], totals: &CounterState) -> Result<DerivedMetric> {
        let value = match self.aggregation() {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Mean if values.is_empty() => 0.0,
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Pooled => return self.derive(totals),
        };
        Ok(DerivedMetric {
            name: self.name.clone(),
            value,
            unit: self.unit.clone(),
        })
    }
}

/// A metric value computed from a counter snapshot. Never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

fn a_single() -> f64 {
    A_SINGLE
}

fn a_multi() -> f64 {
    A_MULTI
}

fn paper_per_sheet() -> f64 {
    PAPER_PER_SHEET
}

fn fixture_kw() -> f64 {
    FIXTURE_KW
}

fn emission_factor() -> f64 {
    EMISSION_FACTOR
}

fn elevator_kwh() -> f64 {
    ELEVATOR_KWH
}

fn car_emission() -> f64 {
    CAR_EMISSION
}

fn transit_emission() -> f64 {
    TRANSIT_EMISSION
}

fn one() -> f64 {
    1.0
}
