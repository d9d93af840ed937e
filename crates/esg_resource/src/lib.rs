//! Campaign metrics for the Re:source ESG dashboard.
//!
//! Each campaign accumulates raw participation counters (participants,
//! stamps, kilograms of collected waste) and derives environmental-impact
//! metrics from them. This crate holds the static side of that model:
//! campaign definitions, counter state, the formulas and the snapshots
//! handed to presentation code. The mutable side lives in
//! `esg_resource_runtime`.

mod campaign;
mod counter;
mod error;
mod event;
pub mod formula;
mod registry;
mod snapshot;
mod state_key;

pub use campaign::*;
pub use counter::*;
pub use error::*;
pub use event::*;
pub use formula::{Aggregation, DerivedMetric, Formula, MetricDefinition};
pub use registry::*;
pub use snapshot::*;
pub use state_key::*;
