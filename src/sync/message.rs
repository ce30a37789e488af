//! Wire messages exchanged between workers

use crate::error::{Error, Result};
use crate::types::{table_entries, PositionTable};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind tag carried by every position message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// A worker came online and announced its table
    Online,
    /// Inserted or updated positions
    PositionChange,
}

impl MessageKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Online => "ONLINE",
            MessageKind::PositionChange => "POSITION_CHANGE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ONLINE" => Ok(MessageKind::Online),
            "POSITION_CHANGE" => Ok(MessageKind::PositionChange),
            other => Err(Error::UnknownMessageKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// A position broadcast, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "positions", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionMessage {
    /// Full table of a worker that just started
    Online(#[serde(with = "table_entries")] PositionTable),
    /// Delta (or full table) of changed positions
    PositionChange(#[serde(with = "table_entries")] PositionTable),
}

impl PositionMessage {
    /// Kind tag of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            PositionMessage::Online(_) => MessageKind::Online,
            PositionMessage::PositionChange(_) => MessageKind::PositionChange,
        }
    }

    /// Positions carried by this message
    pub fn positions(&self) -> &PositionTable {
        match self {
            PositionMessage::Online(positions) | PositionMessage::PositionChange(positions) => {
                positions
            }
        }
    }

    /// Take the carried positions
    pub fn into_positions(self) -> PositionTable {
        match self {
            PositionMessage::Online(positions) | PositionMessage::PositionChange(positions) => {
                positions
            }
        }
    }

    /// Encode as JSON bytes
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode from JSON bytes.
    ///
    /// A well-formed payload with an unrecognized kind is reported as
    /// [`Error::UnknownMessageKind`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| Error::delivery(format!("Failed to decode position message: {e}")))?;

        Ok(match envelope.kind.parse::<MessageKind>()? {
            MessageKind::Online => PositionMessage::Online(envelope.positions),
            MessageKind::PositionChange => PositionMessage::PositionChange(envelope.positions),
        })
    }
}

/// Raw wire shape, before the kind is checked
#[derive(Deserialize)]
struct Envelope {
    kind: String,
    #[serde(default, with = "table_entries")]
    positions: PositionTable,
}
