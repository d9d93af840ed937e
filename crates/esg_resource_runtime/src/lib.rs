mod aggregate;
mod applier;
pub mod config;
pub mod interface;
mod runtime;
pub mod seed;
mod store;

pub use aggregate::{Aggregator, Pinned};
pub use applier::EventApplier;
pub use runtime::Runtime;
pub use store::{CampaignStateStore, DEFAULT_MAX_RETRIES};
