use anyhow::{bail, Result};
use clap::Args;
use esg_resource::RegistrationEvent;
use esg_resource_runtime::interface::message::Request;

use super::parse_key_value;

/// Register an event with a campaign
#[derive(Args, Clone, Debug)]
pub struct Apply {
    /// Campaign key
    campaign: String,
    /// Event kind, such as `lunchbox` or `sell_item`
    kind: String,
    /// Sub-key of partitioned campaigns
    #[clap(short, long)]
    sub_key: Option<String>,
    /// Event parameter as name=value, such as kwh=12.5
    #[clap(short, long = "param", value_parser = parse_key_value)]
    params: Vec<(String, f64)>,
}

impl Apply {
    pub fn request(self) -> Result<Request> {
        if self.campaign.is_empty() || self.kind.is_empty() {
            bail!("campaign and event kind must not be empty");
        }

        let mut event = RegistrationEvent::new(self.campaign, self.kind);
        event.sub_key = self.sub_key;
        event.params.extend(self.params);
        Ok(Request::Apply { event })
    }
}
