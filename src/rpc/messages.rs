//! Wire messages.
//!
//! Client → server, one per line:
//! ```text
//! {"payload":{"action":"SET","target":0,"timestamp":1700000000000},"signature":"<64 hex>"}
//! ```
//! Server → client, one per line: `{"current":2,"target":0}`.
//!
//! The payload serializes with `action` first and no whitespace; those
//! bytes are what the signature covers (see [`auth`](super::auth)).

use serde::{Deserialize, Serialize};

use crate::app::commands::DoorCommand;
use crate::error::ProtocolError;
use crate::fsm::TargetState;

/// An authenticated request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ControlPacket {
    /// Ask for the current snapshot.
    #[serde(rename = "SYNC")]
    Sync { timestamp: u64 },
    /// Ask the door to move toward `target`.
    #[serde(rename = "SET")]
    Set { target: TargetState, timestamp: u64 },
}

impl ControlPacket {
    /// Sender's clock at send time (epoch milliseconds).
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Sync { timestamp } | Self::Set { timestamp, .. } => *timestamp,
        }
    }

    pub fn command(&self) -> DoorCommand {
        match self {
            Self::Sync { .. } => DoorCommand::Sync,
            Self::Set { target, .. } => DoorCommand::SetTarget(*target),
        }
    }
}

/// A payload plus its lowercase-hex HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub payload: ControlPacket,
    pub signature: String,
}

/// Parse and structurally validate one inbound frame.
///
/// Does not check the signature.
pub fn decode_envelope(frame: &[u8]) -> Result<SignedEnvelope, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_slice(frame).map_err(|_| ProtocolError::Json)?;
    let envelope: SignedEnvelope =
        serde_json::from_value(value).map_err(|_| ProtocolError::Schema)?;
    if envelope.payload.timestamp() == 0 {
        return Err(ProtocolError::Schema);
    }
    Ok(envelope)
}
