//! Door service: the hexagonal core.
//!
//! [`DoorService`] owns the [`DoorContext`] and applies every rule that
//! reconciles the requested target, the sensed position, relay pulses and
//! the stall/simulation timers.  All I/O flows through port traits injected
//! at call sites, so the whole machine runs against mock adapters in tests.
//!
//! ```text
//!   DoorPort ──▶ ┌────────────────────────┐ ──▶ EventSink
//!                │       DoorService       │
//!  TimerPort ◀── │  request · poll · timer │
//!                └────────────────────────┘
//! ```
//!
//! Every operation runs to completion before the next one starts.  Timers
//! carry the epoch they were armed in; any pulse or inferred manual
//! movement starts a new epoch, so a timer from an earlier transition can
//! never act on a later one.
//!
//! A relay pulse never blocks: the relay is engaged inside the operation
//! and released by a [`TimerKind::RelayRelease`] timer.  Requests that
//! arrive while it is engaged are deferred (latest wins) and replayed on
//! release, so pulses never overlap.

use core::time::Duration;

use log::{debug, info, warn};

use crate::config::{DoorConfig, StoppedRecovery};
use crate::error::HardwareError;
use crate::fsm::context::DoorContext;
use crate::fsm::{CurrentState, DoorSnapshot, SensorReading, SensorVerdict, TargetState};

use super::commands::DoorCommand;
use super::events::DoorEvent;
use super::ports::{DoorPort, DoorTimer, EventSink, TimerKind, TimerPort};

// ───────────────────────────────────────────────────────────────
// DoorService
// ───────────────────────────────────────────────────────────────

/// The door state machine.
pub struct DoorService {
    ctx: DoorContext,
    stall_timeout: Duration,
    relay_pulse: Duration,
    recovery: StoppedRecovery,
}

impl DoorService {
    /// A door believed closed, with nothing pending.
    pub fn new(config: &DoorConfig) -> Self {
        Self {
            ctx: DoorContext::new(TargetState::Close),
            stall_timeout: config.stall_timeout(),
            relay_pulse: config.relay_pulse(),
            recovery: config.stopped_recovery,
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Snapshot without touching hardware.
    pub fn snapshot(&self) -> DoorSnapshot {
        self.ctx.snapshot()
    }

    /// Current transition generation.
    pub fn epoch(&self) -> u64 {
        self.ctx.epoch
    }

    /// Whether a stall timer is outstanding for the current epoch.
    pub fn stall_armed(&self) -> bool {
        self.ctx.stall_armed
    }

    /// Whether a relay pulse is in progress.
    pub fn relay_busy(&self) -> bool {
        self.ctx.relay.is_engaged()
    }

    /// Whether the both-sensors fault is latched.
    pub fn sensor_fault(&self) -> bool {
        self.ctx.sensor_fault
    }

    /// Poll hardware, then return the snapshot.
    pub fn get_state(
        &mut self,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) -> DoorSnapshot {
        self.poll(hw, timers, sink);
        self.ctx.snapshot()
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an authenticated command.  Returns the snapshot to send
    /// back to the requester only, if the command calls for one.
    pub fn handle_command(
        &mut self,
        cmd: DoorCommand,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) -> Option<DoorSnapshot> {
        match cmd {
            DoorCommand::Sync => Some(self.get_state(hw, timers, sink)),
            DoorCommand::SetTarget(target) => {
                self.request_target(target, hw, timers, sink);
                None
            }
        }
    }

    /// The only externally triggered mutator.
    pub fn request_target(
        &mut self,
        requested: TargetState,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        if self.ctx.relay.is_engaged() {
            debug!("Relay busy, deferring request for {}", requested);
            self.ctx.relay.deferred = Some(requested);
            return;
        }

        self.poll(hw, timers, sink);

        match self.ctx.current {
            CurrentState::Stopped => {
                let target = match self.recovery {
                    StoppedRecovery::ReverseLastMotion => self.ctx.target.opposite(),
                    StoppedRecovery::HonorRequest => requested,
                };
                info!(
                    "Recovering from STOPPED: requested {}, moving toward {}",
                    requested, target
                );
                self.start_motion(target, hw, timers, sink);
            }
            CurrentState::Opening | CurrentState::Closing => {
                self.interrupt(hw, timers, sink);
            }
            CurrentState::Open | CurrentState::Close => {
                if requested == self.ctx.target {
                    debug!("Request for {} is a no-op", requested);
                    sink.emit(&DoorEvent::Unchanged(self.ctx.snapshot()));
                } else {
                    self.start_motion(requested, hw, timers, sink);
                }
            }
        }
    }

    // ── Hardware poll ─────────────────────────────────────────

    /// Read the sensors and reconcile `current` with them.  A no-op for a
    /// door without sensors.
    pub fn poll(
        &mut self,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        match hw.read_sensors() {
            Ok(Some(reading)) => self.apply_reading(reading, timers, sink),
            Ok(None) => {}
            Err(e) => self.hardware_fault(e, sink),
        }
    }

    // ── Timers ────────────────────────────────────────────────

    /// Called by the runtime when an armed timer fires.
    pub fn on_timer(
        &mut self,
        timer: DoorTimer,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        match timer.kind {
            TimerKind::RelayRelease => self.release_relay(timer.epoch, hw, timers, sink),
            _ if timer.epoch != self.ctx.epoch => {
                debug!(
                    "Dropping stale {:?} timer (epoch {}, now {})",
                    timer.kind, timer.epoch, self.ctx.epoch
                );
            }
            TimerKind::Stall => {
                self.ctx.stall_armed = false;
                if self.ctx.target_reached() {
                    return;
                }
                timers.cancel(TimerKind::SimResolve);
                if let Some(from) = self.ctx.set_current(CurrentState::Stopped) {
                    let snapshot = self.ctx.snapshot();
                    warn!(
                        "Stall timeout after {}s: {} did not reach {}",
                        self.stall_timeout.as_secs(),
                        from,
                        self.ctx.target
                    );
                    sink.emit(&DoorEvent::StallTimeout(snapshot));
                    sink.emit(&DoorEvent::CurrentChanged { from, snapshot });
                }
            }
            TimerKind::SimResolve => {
                if !self.ctx.current.is_moving() {
                    debug!("Simulated resolve with door {}, ignoring", self.ctx.current);
                    return;
                }
                self.settle(self.ctx.target.resting(), timers, sink);
            }
        }
    }

    // ── Internal ──────────────────────────────────────────────

    /// Pulse the relay and enter the transitional state for `target`.
    /// The pulse goes first; if it fails nothing changes.
    fn start_motion(
        &mut self,
        target: TargetState,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        if let Err(e) = self.engage_relay(hw, timers) {
            self.hardware_fault(e, sink);
            return;
        }

        let target_from = self.ctx.set_target(target);
        let current_from = self.ctx.set_current(target.transitional());
        let epoch = self.ctx.next_epoch();

        timers.arm(
            DoorTimer {
                kind: TimerKind::Stall,
                epoch,
            },
            self.stall_timeout,
        );
        self.ctx.stall_armed = true;

        if let Some(travel) = hw.simulated_travel() {
            debug!("Simulated travel {}ms", travel.as_millis());
            timers.arm(
                DoorTimer {
                    kind: TimerKind::SimResolve,
                    epoch,
                },
                travel,
            );
        }

        info!("Moving toward {} (epoch {})", target, epoch);
        self.emit_changes(target_from, current_from, sink);
    }

    /// A second request while moving: the same pulse halts the motor.
    fn interrupt(
        &mut self,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        if let Err(e) = self.engage_relay(hw, timers) {
            self.hardware_fault(e, sink);
            return;
        }

        let from = self.ctx.set_current(CurrentState::Stopped);
        let epoch = self.ctx.next_epoch();
        timers.cancel(TimerKind::Stall);
        timers.cancel(TimerKind::SimResolve);
        self.ctx.stall_armed = false;

        let snapshot = self.ctx.snapshot();
        info!("Transition interrupted, door STOPPED (epoch {})", epoch);
        sink.emit(&DoorEvent::Interrupted(snapshot));
        if let Some(from) = from {
            sink.emit(&DoorEvent::CurrentChanged { from, snapshot });
        }
    }

    /// Close the relay and schedule its release one pulse width later.
    fn engage_relay(
        &mut self,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
    ) -> Result<(), HardwareError> {
        hw.engage_relay()?;
        let seq = self.ctx.relay.engage();
        timers.arm(
            DoorTimer {
                kind: TimerKind::RelayRelease,
                epoch: seq,
            },
            self.relay_pulse,
        );
        debug!("Relay pulse #{} engaged for {}ms", seq, self.relay_pulse.as_millis());
        Ok(())
    }

    /// End pulse `seq`, then replay whatever request waited for it.
    fn release_relay(
        &mut self,
        seq: u64,
        hw: &mut impl DoorPort,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        if self.ctx.relay.engaged != Some(seq) {
            debug!("Dropping stale release for relay pulse #{}", seq);
            return;
        }
        self.ctx.relay.engaged = None;
        if let Err(e) = hw.release_relay() {
            self.hardware_fault(e, sink);
        }

        if let Some(requested) = self.ctx.relay.deferred.take() {
            debug!("Relay released, replaying request for {}", requested);
            self.request_target(requested, hw, timers, sink);
        }
    }

    fn apply_reading(
        &mut self,
        reading: SensorReading,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        let verdict = reading.verdict();

        if verdict == SensorVerdict::Implausible {
            if !self.ctx.sensor_fault {
                self.ctx.sensor_fault = true;
                warn!("Both position sensors asserted, holding {}", self.ctx.current);
                sink.emit(&DoorEvent::SensorFault(reading));
            }
            return;
        }
        if self.ctx.sensor_fault {
            self.ctx.sensor_fault = false;
            info!("Sensor fault cleared");
            sink.emit(&DoorEvent::SensorFaultCleared);
        }

        match verdict {
            SensorVerdict::Open => self.settle(CurrentState::Open, timers, sink),
            SensorVerdict::Close => self.settle(CurrentState::Close, timers, sink),
            SensorVerdict::Between => {
                if let Some(resting) = self.ctx.current.resting_target() {
                    self.manual_override(resting.opposite(), timers, sink);
                }
            }
            SensorVerdict::Implausible => {}
        }
    }

    /// The door left its resting position without a pulse from us.
    fn manual_override(
        &mut self,
        target: TargetState,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        let target_from = self.ctx.set_target(target);
        let current_from = self.ctx.set_current(target.transitional());
        let epoch = self.ctx.next_epoch();

        timers.arm(
            DoorTimer {
                kind: TimerKind::Stall,
                epoch,
            },
            self.stall_timeout,
        );
        self.ctx.stall_armed = true;

        info!("Manual movement detected, assuming target {}", target);
        sink.emit(&DoorEvent::ManualOverride { target });
        self.emit_changes(target_from, current_from, sink);
    }

    /// Record a confirmed resting position.
    fn settle(
        &mut self,
        resting: CurrentState,
        timers: &mut impl TimerPort,
        sink: &mut impl EventSink,
    ) {
        let from = self.ctx.set_current(resting);

        if self.ctx.stall_armed && self.ctx.target_reached() {
            timers.cancel(TimerKind::Stall);
            self.ctx.stall_armed = false;
            debug!("Target {} reached, stall timer cancelled", self.ctx.target);
        }

        if let Some(from) = from {
            info!("Door {} -> {}", from, resting);
            sink.emit(&DoorEvent::CurrentChanged {
                from,
                snapshot: self.ctx.snapshot(),
            });
        }
    }

    fn emit_changes(
        &self,
        target_from: Option<TargetState>,
        current_from: Option<CurrentState>,
        sink: &mut impl EventSink,
    ) {
        let snapshot = self.ctx.snapshot();
        if let Some(from) = target_from {
            sink.emit(&DoorEvent::TargetChanged { from, snapshot });
        }
        if let Some(from) = current_from {
            sink.emit(&DoorEvent::CurrentChanged { from, snapshot });
        }
    }

    fn hardware_fault(&self, error: HardwareError, sink: &mut impl EventSink) {
        warn!("Hardware fault: {}", error);
        sink.emit(&DoorEvent::HardwareFault(error));
    }
}
