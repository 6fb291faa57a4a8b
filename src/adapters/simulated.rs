//! Simulated door for `--dryRun` and tests.
//!
//! Has no sensors; every motion pulse is resolved by the service after a
//! randomized travel time.

use core::time::Duration;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::app::ports::DoorPort;
use crate::config::DoorConfig;
use crate::error::HardwareError;
use crate::fsm::SensorReading;

pub struct SimulatedHardware {
    rng: StdRng,
    travel_ms: u32,
    jitter_ms: u32,
    pulses: u32,
}

impl SimulatedHardware {
    pub fn new(travel_ms: u32, jitter_ms: u32) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            travel_ms,
            jitter_ms,
            pulses: 0,
        }
    }

    pub fn from_config(config: &DoorConfig) -> Self {
        Self::new(config.sim_travel_ms, config.sim_travel_jitter_ms)
    }

    /// Deterministic travel jitter.
    pub fn with_seed(travel_ms: u32, jitter_ms: u32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(travel_ms, jitter_ms)
        }
    }

    /// Relay pulses issued so far.
    pub fn pulses(&self) -> u32 {
        self.pulses
    }
}

impl DoorPort for SimulatedHardware {
    fn read_sensors(&mut self) -> Result<Option<SensorReading>, HardwareError> {
        Ok(None)
    }

    fn engage_relay(&mut self) -> Result<(), HardwareError> {
        self.pulses += 1;
        info!("SIM: relay pulse #{}", self.pulses);
        Ok(())
    }

    fn release_relay(&mut self) -> Result<(), HardwareError> {
        debug!("SIM: relay released");
        Ok(())
    }

    fn simulated_travel(&mut self) -> Option<Duration> {
        let jitter = self.rng.gen_range(0..=self.jitter_ms);
        Some(Duration::from_millis(u64::from(self.travel_ms + jitter)))
    }
}
