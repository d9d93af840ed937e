use serde::{Deserialize, Serialize};

use crate::Params;

/// A registration made from the dashboard, such as a lunchbox brought to
/// the canteen or a flea market sale.
///
/// Events are transient. Only their effect on the counters is kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationEvent {
    pub campaign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_key: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

impl RegistrationEvent {
    pub fn new(campaign: impl Into<String>, kind: impl Into<String>) -> Self {
        RegistrationEvent {
            campaign: campaign.into(),
            sub_key: None,
            kind: kind.into(),
            params: Params::new(),
        }
    }

    pub fn with_sub_key(mut self, sub_key: impl Into<String>) -> Self {
        self.sub_key = Some(sub_key.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}
