//! State keys identify one counter record.
//!
//! Every campaign keeps its counters under one or more state keys. A state
//! key is a campaign key, and optionally a sub-key naming a location the
//! campaign keeps separate counters for, such as a building, a café or a
//! department. When present, the sub-key is prefixed by a dash (-) character.
//!
//! # Example State Keys
//!
//! `zero_cup`
//!
//! The single counter record of the reusable cup challenge.
//!
//! `stair_climbing-jamsil`
//!
//! Stair climbing counters of the Jamsil building only.
//!
//! `stair_climbing`
//!
//! For a campaign with sub-keys this is not a state key on its own; the
//! campaign's counters are the sum of all of its sub-keys.

use std::{fmt, str};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A state key containing a campaign key, and optionally a sub-key.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    campaign: String,
    sub_key: Option<String>,
}

impl StateKey {
    /// Sub-key separator.
    ///
    /// Only the first `-` is the separator, so sub-keys may contain `-`
    /// characters while campaign keys may not.
    ///
    /// # Example
    ///
    /// `campaign-sub_key`
    pub const SUB_KEY_SEPARATOR: char = '-';

    pub fn new(campaign: impl Into<String>, sub_key: Option<&str>) -> Result<Self, InvalidStateKey> {
        let campaign = campaign.into();
        if campaign.is_empty() {
            return Err(InvalidStateKey::EmptyCampaign);
        }
        if campaign.contains(Self::SUB_KEY_SEPARATOR) {
            return Err(InvalidStateKey::Separator(campaign));
        }
        if sub_key.map(str::is_empty).unwrap_or(false) {
            return Err(InvalidStateKey::EmptySubKey);
        }

        Ok(StateKey {
            campaign,
            sub_key: sub_key.map(str::to_string),
        })
    }

    pub fn campaign(&self) -> &str {
        &self.campaign
    }

    pub fn sub_key(&self) -> Option<&str> {
        self.sub_key.as_deref()
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_key {
            Some(sub_key) => write!(f, "{}{}{sub_key}", self.campaign, Self::SUB_KEY_SEPARATOR),
            None => write!(f, "{}", self.campaign),
        }
    }
}

impl str::FromStr for StateKey {
    type Err = InvalidStateKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(Self::SUB_KEY_SEPARATOR) {
            Some((campaign, sub_key)) => StateKey::new(campaign, Some(sub_key)),
            None => StateKey::new(s, None),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidStateKey {
    #[error("empty campaign key")]
    EmptyCampaign,
    #[error("campaign key '{0}' contains the sub-key separator")]
    Separator(String),
    #[error("empty sub-key")]
    EmptySubKey,
}
