use anyhow::{bail, Result};
use clap::Args;
use esg_resource::CounterState;
use esg_resource_runtime::interface::message::Request;

use super::parse_key_value;

/// Replace the counters of a campaign or one of its sub-keys
#[derive(Args, Clone, Debug)]
pub struct Reset {
    /// Campaign key
    campaign: String,
    /// Sub-key of partitioned campaigns
    #[clap(short, long)]
    sub_key: Option<String>,
    /// Counter value as name=value
    #[clap(long = "set", value_parser = parse_key_value, required = true)]
    counters: Vec<(String, f64)>,
}

impl Reset {
    pub fn request(self) -> Result<Request> {
        if let Some((name, value)) = self.counters.iter().find(|(_, value)| *value < 0.0) {
            bail!("counter `{name}` cannot be set to {value}");
        }

        let seed: CounterState = self.counters.into_iter().collect();
        Ok(Request::Reset {
            campaign: self.campaign,
            sub_key: self.sub_key,
            seed,
        })
    }
}

/// Regenerate the counters of a campaign with sample data
#[derive(Args, Clone, Debug)]
pub struct Regenerate {
    /// Campaign key
    campaign: String,
}

impl Regenerate {
    pub fn request(self) -> Request {
        Request::Regenerate {
            campaign: self.campaign,
        }
    }
}
