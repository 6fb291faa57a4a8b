//! Port traits: the hexagonal boundary between the door logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DoorService (domain)
//! ```
//!
//! Driven adapters (GPIO, simulator, timer runtime, event fan-out)
//! implement these traits.  The [`DoorService`](super::service::DoorService)
//! receives them at call sites, so the domain core never touches hardware,
//! sockets or clocks directly.

use core::time::Duration;

use crate::error::HardwareError;
use crate::fsm::SensorReading;

// ───────────────────────────────────────────────────────────────
// Door port (driven adapter: domain ↔ hardware)
// ───────────────────────────────────────────────────────────────

/// Sensor and relay access for one door.
pub trait DoorPort {
    /// Read both position switches.
    ///
    /// `Ok(None)` means the adapter has no sensors (simulated door); the
    /// service then resolves transitions with a simulated travel timer.
    fn read_sensors(&mut self) -> Result<Option<SensorReading>, HardwareError>;

    /// Close the relay.  Returns immediately; the service schedules the
    /// matching [`release_relay`](Self::release_relay) one pulse width later.
    fn engage_relay(&mut self) -> Result<(), HardwareError>;

    /// Open the relay again, ending the pulse.
    fn release_relay(&mut self) -> Result<(), HardwareError>;

    /// Travel time for the next simulated transition.  Only consulted when
    /// [`read_sensors`](Self::read_sensors) reports no sensors.
    fn simulated_travel(&mut self) -> Option<Duration> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Timer port (driven adapter: domain → runtime)
// ───────────────────────────────────────────────────────────────

/// Which deadline a timer represents.  At most one of each is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Forces STOPPED if a transition has not resolved in time.
    Stall,
    /// Completes a simulated transition.
    SimResolve,
    /// Ends the relay pulse in progress.
    RelayRelease,
}

/// A timer as handed back to [`DoorService::on_timer`](super::service::DoorService::on_timer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorTimer {
    pub kind: TimerKind,
    /// Transition generation the timer was armed in.  A fired timer whose
    /// epoch no longer matches is stale and ignored.
    ///
    /// For [`TimerKind::RelayRelease`] this is the pulse sequence number
    /// instead; pulses are numbered independently of transitions.
    pub epoch: u64,
}

/// One-shot deadline scheduling.
///
/// Arming a kind that is already pending replaces it.  The runtime calls
/// back into the service with the same [`DoorTimer`] when it fires.
pub trait TimerPort {
    fn arm(&mut self, timer: DoorTimer, after: Duration);

    /// Drop the pending timer of this kind, if any.
    fn cancel(&mut self, kind: TimerKind);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / clients)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`DoorEvent`](super::events::DoorEvent)s
/// through this port.  Adapters decide where they go (console log,
/// connected TCP clients, test recorders).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::DoorEvent);
}
