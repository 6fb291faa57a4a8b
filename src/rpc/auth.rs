//! Packet authentication: HMAC-SHA256 over the canonical payload.
//!
//! Every inbound packet carries `HMAC-SHA256(secret, canonical(payload))`
//! as 64 lowercase hex characters.  The canonical form is the compact
//! JSON serialization of the parsed payload (`action`, `target`,
//! `timestamp`, in that order), so verification never depends on how the
//! sender happened to format its JSON.
//!
//! Crypto is handled by the `hmac-sha256` crate (pure Rust, constant-time
//! verification).

use burster::Limiter;
use core::time::Duration;
use log::warn;

use crate::error::ProtocolError;

use super::messages::{ControlPacket, SignedEnvelope};

/// Client identifier, unique for the lifetime of the server.
pub type ClientId = u32;

/// Length of a hex-encoded HMAC-SHA256 tag.
pub const SIGNATURE_HEX_LEN: usize = 64;

// ── Signing ──────────────────────────────────────────────────

/// The exact bytes covered by the signature.
pub fn canonical_bytes(packet: &ControlPacket) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(packet).map_err(|_| ProtocolError::Json)
}

/// Lowercase hex HMAC-SHA256 of the canonical payload.
pub fn sign(packet: &ControlPacket, secret: &[u8]) -> Result<String, ProtocolError> {
    let input = canonical_bytes(packet)?;
    Ok(hex::encode(hmac_sha256::HMAC::mac(input, secret)))
}

/// Sign `packet` and wrap it for the wire.
pub fn seal(packet: ControlPacket, secret: &[u8]) -> Result<SignedEnvelope, ProtocolError> {
    let signature = sign(&packet, secret)?;
    Ok(SignedEnvelope {
        payload: packet,
        signature,
    })
}

/// Check `signature` against the canonical payload.
///
/// Uses `hmac_sha256::HMAC::verify` (constant time).  Anything other than
/// exactly 64 lowercase hex digits fails.
pub fn verify(packet: &ControlPacket, signature: &str, secret: &[u8]) -> bool {
    if signature.len() != SIGNATURE_HEX_LEN
        || !signature
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return false;
    }

    let mut tag = [0u8; 32];
    if hex::decode_to_slice(signature, &mut tag).is_err() {
        return false;
    }

    match canonical_bytes(packet) {
        Ok(input) => hmac_sha256::HMAC::verify(input, secret, &tag),
        Err(_) => false,
    }
}

// ── Per-connection session ───────────────────────────────────

/// Outcome of the advisory freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Older than the previous packet on this connection.
    Regressed,
    /// Further from local time than the configured tolerance.
    Skewed,
}

/// Per-connection state: rate limiter plus timestamp bookkeeping.
pub struct Session {
    rate_limiter: burster::TokenBucket<fn() -> Duration>,
    last_timestamp: Option<u64>,
    skew_warn_ms: u64,
}

impl Session {
    pub fn new(skew_warn_ms: u64) -> Self {
        Self {
            rate_limiter: burster::TokenBucket::new_with_time_provider(
                10,
                10, // 10 tokens per second, 10 burst capacity
                platform_now as fn() -> Duration,
            ),
            last_timestamp: None,
            skew_warn_ms,
        }
    }

    /// Consume one rate-limit token; returns `false` when exhausted.
    pub fn check_rate_limit(&mut self) -> bool {
        self.rate_limiter.try_consume(1).is_ok()
    }

    /// Record `timestamp` and report how it compares.  Never rejects:
    /// timestamps are a freshness hint, not replay protection.
    pub fn observe_timestamp(&mut self, timestamp: u64, now_ms: u64) -> Freshness {
        let previous = self.last_timestamp.replace(timestamp);

        if let Some(prev) = previous {
            if timestamp < prev {
                warn!("auth: timestamp regression (got {timestamp}, last {prev})");
                return Freshness::Regressed;
            }
        }

        let skew = timestamp.abs_diff(now_ms);
        if skew > self.skew_warn_ms {
            warn!("auth: timestamp skewed by {skew}ms");
            return Freshness::Skewed;
        }
        Freshness::Fresh
    }
}

// ── Platform time for rate limiter ───────────────────────────

fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

// ── Tests ────────────────────────────────────────────────────
