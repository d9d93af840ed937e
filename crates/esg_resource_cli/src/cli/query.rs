use clap::Args;
use esg_resource_runtime::interface::message::Request;

/// Summarize campaigns, or every campaign when none is given
#[derive(Args, Clone, Debug)]
pub struct Summary {
    /// Campaign keys
    campaigns: Vec<String>,
}

impl Summary {
    pub fn request(self) -> Request {
        Request::Summary {
            campaigns: self.campaigns,
        }
    }
}

/// Show the counters of a campaign or one of its sub-keys
#[derive(Args, Clone, Debug)]
pub struct Get {
    /// Campaign key
    campaign: String,
    /// Sub-key of partitioned campaigns
    #[clap(short, long)]
    sub_key: Option<String>,
}

impl Get {
    pub fn request(self) -> Request {
        Request::Get {
            campaign: self.campaign,
            sub_key: self.sub_key,
        }
    }
}

/// Rank the entries of campaigns by a metric
#[derive(Args, Clone, Debug)]
pub struct Rank {
    /// Metric to rank by
    metric: String,
    /// Campaign keys
    #[clap(required = true)]
    campaigns: Vec<String>,
}

impl Rank {
    pub fn request(self) -> Request {
        Request::Rank {
            campaigns: self.campaigns,
            metric: self.metric,
        }
    }
}
