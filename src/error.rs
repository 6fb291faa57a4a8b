//! Unified error types for doorlink.
//!
//! One enum per failure domain. The domain variants are `Copy` so they can
//! be passed through the state machine and the RPC engine without
//! allocation; only the client-side error carries an owned I/O error.

use core::fmt;

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// Why an inbound frame was rejected.
///
/// Every variant is fail-closed: the server drops the connection and writes
/// nothing back. The reason is only ever logged locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Line exceeded the frame buffer or was not UTF-8 JSON text.
    Framing,
    /// The frame is not valid JSON.
    Json,
    /// Valid JSON that does not match the signed-envelope schema.
    Schema,
    /// HMAC signature did not verify against the shared secret.
    BadSignature,
    /// The session exhausted its token bucket.
    RateLimited,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing => write!(f, "framing error"),
            Self::Json => write!(f, "malformed JSON"),
            Self::Schema => write!(f, "schema violation"),
            Self::BadSignature => write!(f, "bad signature"),
            Self::RateLimited => write!(f, "rate limited"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

/// Failure reported by a [`DoorPort`](crate::app::ports::DoorPort) adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// A position sensor input could not be read.
    SensorRead,
    /// The relay output could not be driven.
    RelayWrite,
    /// A GPIO line could not be exported or configured.
    PinSetup(u32),
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorRead => write!(f, "sensor read failed"),
            Self::RelayWrite => write!(f, "relay write failed"),
            Self::PinSetup(line) => write!(f, "gpio line {} setup failed", line),
        }
    }
}

impl std::error::Error for HardwareError {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating [`DoorConfig`](crate::config::DoorConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    Io,
    /// The config file is not valid JSON for `DoorConfig`.
    Parse,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "config file unreadable"),
            Self::Parse => write!(f, "config file malformed"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Errors surfaced by [`ControlClient`](crate::rpc::client::ControlClient).
#[derive(Debug)]
pub enum ClientError {
    /// Socket-level failure.
    Io(std::io::Error),
    /// The server sent something that is not a state snapshot.
    Protocol(ProtocolError),
    /// The server closed the connection.
    ConnectionClosed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::ConnectionClosed => write!(f, "connection closed by server"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::ConnectionClosed => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
