use thiserror::Error;

use crate::{InvalidStateKey, StateKey};

/// Type alias for `Result<T, esg_resource::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents all the ways a campaign operation can fail.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// The campaign key is not registered.
    #[error("unknown campaign '{0}'")]
    UnknownCampaign(String),

    #[error("campaign '{campaign}' has no sub-key '{sub_key}'")]
    UnknownSubKey { campaign: String, sub_key: String },

    #[error("campaign '{0}' keeps counters per sub-key, but none was given")]
    MissingSubKey(String),

    #[error("campaign '{campaign}' has no event kind '{kind}'")]
    UnknownEventKind { campaign: String, kind: String },

    #[error("campaign '{campaign}' has no counter '{counter}'")]
    UnknownCounter { campaign: String, counter: String },

    #[error("campaign '{campaign}' has no metric '{metric}'")]
    UnknownMetric { campaign: String, metric: String },

    /// A formula or delta referenced a counter absent from the state.
    #[error("missing counter '{0}'")]
    MissingCounter(String),

    #[error("event kind '{kind}' requires parameter '{param}'")]
    MissingParam { kind: String, param: String },

    /// The delta was rejected and the state left unchanged.
    #[error("invalid delta for counter '{counter}': {reason}")]
    InvalidDelta {
        counter: String,
        reason: DeltaRejection,
    },

    #[error("invalid value {value} for counter '{counter}'")]
    InvalidCounterValue { counter: String, value: f64 },

    /// Optimistic retries were exhausted.
    #[error("concurrent update conflict on '{key}' after {attempts} attempts")]
    ConcurrentUpdateConflict { key: StateKey, attempts: u32 },

    #[error("invalid campaign configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidStateKey(#[from] InvalidStateKey),
}

/// Why a delta was rejected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DeltaRejection {
    #[error("not a finite number")]
    NotFinite,
    #[error("negative delta on an event that does not permit corrections")]
    NegativeWithoutCorrection,
    #[error("counter would drop to {0}")]
    BelowZero(f64),
    #[error("parameter `{param}` is {value}, but parameters must not be negative")]
    NegativeParam { param: String, value: f64 },
}

impl Error {
    /// Returns whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ConcurrentUpdateConflict { .. })
    }

    /// Stable, machine readable name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownCampaign(_) => "unknown_campaign",
            Error::UnknownSubKey { .. } => "unknown_sub_key",
            Error::MissingSubKey(_) => "missing_sub_key",
            Error::UnknownEventKind { .. } => "unknown_event_kind",
            Error::UnknownCounter { .. } => "unknown_counter",
            Error::UnknownMetric { .. } => "unknown_metric",
            Error::MissingCounter(_) => "missing_counter",
            Error::MissingParam { .. } => "missing_param",
            Error::InvalidDelta { .. } => "invalid_delta",
            Error::InvalidCounterValue { .. } => "invalid_counter_value",
            Error::ConcurrentUpdateConflict { .. } => "concurrent_update_conflict",
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidStateKey(_) => "invalid_state_key",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
