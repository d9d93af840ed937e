use anyhow::{bail, Result};
use bytes::Bytes;
use esg_resource::{
    AggregateSnapshot, CampaignInfo, CounterState, Error, RankingEntry, RegistrationEvent,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Apply {
        event: RegistrationEvent,
    },
    Reset {
        campaign: String,
        sub_key: Option<String>,
        seed: CounterState,
    },
    Regenerate {
        campaign: String,
    },
    Summary {
        campaigns: Vec<String>,
    },
    Get {
        campaign: String,
        sub_key: Option<String>,
    },
    Rank {
        campaigns: Vec<String>,
        metric: String,
    },
    Campaigns,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Snapshot(AggregateSnapshot),
    Reset,
    Counters(CounterState),
    Ranking(Vec<RankingEntry>),
    Campaigns(Vec<CampaignInfo>),
}

/// A request rejected by the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({kind})")]
pub struct ErrorReply {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub transient: bool,
}

/// What the runtime sends back for every request.
pub type Reply = Result<Response, ErrorReply>;

impl ErrorReply {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ErrorReply {
            kind: "invalid_request".to_string(),
            message: message.into(),
            transient: false,
        }
    }
}

impl From<&Error> for ErrorReply {
    fn from(err: &Error) -> Self {
        ErrorReply {
            kind: err.kind().to_string(),
            message: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// Largest frame body accepted from a peer.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Packs a message to be sent over the network.
pub fn pack<T>(data: &T) -> Result<[Bytes; 2]>
where
    T: Serialize,
{
    let data = serde_json::to_vec(data)?;
    pack_raw(data)
}

pub fn pack_raw(data: Vec<u8>) -> Result<[Bytes; 2]> {
    let size = u32::try_from(data.len())?;
    if size > MAX_FRAME_LEN {
        bail!("frame of {size} bytes exceeds the limit of {MAX_FRAME_LEN} bytes");
    }
    let size = size.to_le_bytes();
    let size: Bytes = Bytes::copy_from_slice(&size[..]);
    let bytes: Bytes = data.into();
    Ok([size, bytes])
}

pub async fn receive<T, R>(recv: &mut R) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    R: AsyncRead + Unpin,
{
    let buffer = receive_raw(recv).await?;
    Ok(serde_json::from_slice(&buffer)?)
}

pub async fn receive_raw<R>(recv: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut size = [0u8; 4];
    recv.read_exact(&mut size).await?;
    let size = u32::from_le_bytes(size);
    if size > MAX_FRAME_LEN {
        bail!("frame of {size} bytes exceeds the limit of {MAX_FRAME_LEN} bytes");
    }
    let mut buffer = vec![0u8; size as usize];
    recv.read_exact(&mut buffer).await?;
    Ok(buffer)
}
