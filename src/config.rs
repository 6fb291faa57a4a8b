//! System configuration parameters
//!
//! All tunable parameters for the door controller.  Values come from an
//! optional JSON file; CLI flags override individual fields.

use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Acceptable stall timeout window (seconds).
pub const STALL_TIMEOUT_RANGE_SECS: core::ops::RangeInclusive<u16> = 20..=45;

/// Acceptable hardware poll interval window (milliseconds).
pub const POLL_INTERVAL_RANGE_MS: core::ops::RangeInclusive<u32> = 500..=5000;

/// How a request against a STOPPED door is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedRecovery {
    /// Target flips to the opposite of the last requested polarity; the
    /// motor controller reverses after a stop, so the next pulse moves
    /// the door back the way it came.
    ReverseLastMotion,
    /// Target becomes whatever the caller asked for.
    HonorRequest,
}

/// Linux GPIO line numbers for the door wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioPins {
    /// Switch closed when the door is fully open.
    pub open_sensor: u32,
    /// Switch closed when the door is fully closed.
    pub close_sensor: u32,
    /// Relay output that toggles the motor controller.
    pub relay: u32,
    /// Sensors read low when asserted.
    pub sensors_active_low: bool,
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            open_sensor: 5,
            close_sensor: 6,
            relay: 18,
            sensors_active_low: false,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorConfig {
    // --- Network ---
    /// Interface the control server binds to.
    pub bind_host: String,
    /// TCP port for the control server.
    pub port: u16,
    /// Warn when a packet timestamp is further than this from local time.
    pub timestamp_skew_warn_ms: u64,
    /// Per-connection outbound buffer cap before the client is dropped.
    pub max_outbound_bytes: usize,

    // --- Door ---
    /// Seconds a transition may take before it is forced to STOPPED.
    pub stall_timeout_secs: u16,
    /// Sensor poll interval (milliseconds).
    pub poll_interval_ms: u32,
    /// Relay pulse width (milliseconds).
    pub relay_pulse_ms: u32,
    /// Policy for requests against a STOPPED door.
    pub stopped_recovery: StoppedRecovery,
    pub gpio: GpioPins,

    // --- Simulation ---
    /// Base simulated travel time (milliseconds).
    pub sim_travel_ms: u32,
    /// Random extra travel time added to the base (milliseconds).
    pub sim_travel_jitter_ms: u32,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            // Network
            bind_host: "0.0.0.0".to_owned(),
            port: 11001,
            timestamp_skew_warn_ms: 30_000,
            max_outbound_bytes: 64 * 1024,

            // Door
            stall_timeout_secs: 20,
            poll_interval_ms: 1000, // 1 Hz
            relay_pulse_ms: 500,
            stopped_recovery: StoppedRecovery::ReverseLastMotion,
            gpio: GpioPins::default(),

            // Simulation
            sim_travel_ms: 5000,
            sim_travel_jitter_ms: 1000,
        }
    }
}

impl DoorConfig {
    /// Load from `path` (JSON), or defaults when no path is given.
    /// The result is validated either way.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|_| ConfigError::Io)?;
                let cfg: Self = serde_json::from_str(&raw).map_err(|_| ConfigError::Parse)?;
                info!("Config loaded from {}", p.display());
                cfg
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_host.is_empty() {
            return Err(ConfigError::ValidationFailed("bind_host is empty"));
        }
        if !STALL_TIMEOUT_RANGE_SECS.contains(&self.stall_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "stall_timeout_secs must be within 20..=45",
            ));
        }
        if !POLL_INTERVAL_RANGE_MS.contains(&self.poll_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_ms must be within 500..=5000",
            ));
        }
        if !(50..=2000).contains(&self.relay_pulse_ms) {
            return Err(ConfigError::ValidationFailed(
                "relay_pulse_ms must be within 50..=2000",
            ));
        }
        if self.sim_travel_ms == 0 {
            return Err(ConfigError::ValidationFailed("sim_travel_ms is zero"));
        }
        let worst_sim_ms = u64::from(self.sim_travel_ms) + u64::from(self.sim_travel_jitter_ms);
        if worst_sim_ms >= u64::from(self.stall_timeout_secs) * 1000 {
            return Err(ConfigError::ValidationFailed(
                "simulated travel must finish before the stall timeout",
            ));
        }
        let pins = &self.gpio;
        if pins.open_sensor == pins.close_sensor
            || pins.open_sensor == pins.relay
            || pins.close_sensor == pins.relay
        {
            return Err(ConfigError::ValidationFailed("gpio lines must be distinct"));
        }
        if self.max_outbound_bytes < 1024 {
            return Err(ConfigError::ValidationFailed(
                "max_outbound_bytes must be at least 1024",
            ));
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.stall_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }

    pub fn relay_pulse(&self) -> Duration {
        Duration::from_millis(u64::from(self.relay_pulse_ms))
    }
}
