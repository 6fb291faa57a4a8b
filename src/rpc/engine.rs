//! RPC engine: turns inbound frames into authenticated door commands.
//!
//! **Transport-decoupled**: the engine does not own a socket.  The I/O
//! runtime feeds `(client_id, frame)` pairs and receives either a
//! [`DoorCommand`] or the reason the connection must be dropped.
//!
//! Every frame passes through a four-gate pipeline:
//!
//! 1. **Rate limiting**: token bucket per connection (via `burster`).
//! 2. **Decode**: JSON envelope with a strictly typed payload.
//! 3. **Signature**: HMAC-SHA256 against the shared secret.
//! 4. **Freshness**: advisory timestamp check, logged but never fatal.
//!
//! Any failure in gates 1–3 is final for that connection.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::app::commands::DoorCommand;
use crate::error::ProtocolError;

use super::auth::{ClientId, Session, verify};
use super::messages::decode_envelope;

/// Transport-decoupled RPC engine with a per-client session table.
pub struct RpcEngine {
    secret: Vec<u8>,
    skew_warn_ms: u64,
    sessions: HashMap<ClientId, Session>,
}

impl RpcEngine {
    pub fn new(secret: &[u8], skew_warn_ms: u64) -> Self {
        Self {
            secret: secret.to_vec(),
            skew_warn_ms,
            sessions: HashMap::new(),
        }
    }

    /// Start tracking a newly accepted connection.
    pub fn open(&mut self, client_id: ClientId) {
        self.sessions
            .insert(client_id, Session::new(self.skew_warn_ms));
        debug!("RPC[{}]: session opened", client_id);
    }

    /// Forget a connection's session state.
    pub fn close(&mut self, client_id: ClientId) {
        if self.sessions.remove(&client_id).is_some() {
            debug!("RPC[{}]: session closed", client_id);
        }
    }

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run one frame through the pipeline.
    ///
    /// `now_ms` is the local wall clock, used only for the advisory
    /// freshness check.
    pub fn authenticate(
        &mut self,
        client_id: ClientId,
        frame: &[u8],
        now_ms: u64,
    ) -> Result<DoorCommand, ProtocolError> {
        let skew_warn_ms = self.skew_warn_ms;
        let session = self
            .sessions
            .entry(client_id)
            .or_insert_with(|| Session::new(skew_warn_ms));

        if !session.check_rate_limit() {
            warn!("RPC[{}]: rate limit exceeded", client_id);
            return Err(ProtocolError::RateLimited);
        }

        let envelope = decode_envelope(frame)?;

        if !verify(&envelope.payload, &envelope.signature, &self.secret) {
            return Err(ProtocolError::BadSignature);
        }

        session.observe_timestamp(envelope.payload.timestamp(), now_ms);

        let command = envelope.payload.command();
        info!("RPC[{}]: {:?}", client_id, command);
        Ok(command)
    }
}
