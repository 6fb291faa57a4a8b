//! Mutable door context owned by [`DoorService`](crate::app::service::DoorService).
//!
//! Holds the abstract state plus the bookkeeping needed to keep timers
//! honest.  Setters report whether the value actually changed so the
//! service only emits events on real transitions.

use super::{CurrentState, DoorSnapshot, TargetState};

/// Relay bookkeeping.  A pulse spans two service operations (engage, then
/// a timer-driven release); requests arriving in between wait here.
#[derive(Debug, Clone, Default)]
pub struct RelayState {
    /// Sequence number of the pulse whose release is pending.
    pub engaged: Option<u64>,
    /// Last pulse sequence number handed out.
    pub seq: u64,
    /// Latest request received while the relay was engaged.
    pub deferred: Option<TargetState>,
}

impl RelayState {
    /// Number the next pulse and mark the relay engaged.
    pub fn engage(&mut self) -> u64 {
        self.seq = self.seq.wrapping_add(1);
        self.engaged = Some(self.seq);
        self.seq
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.is_some()
    }
}

/// The blackboard the state machine reads and writes.
#[derive(Debug, Clone)]
pub struct DoorContext {
    /// Desired stable position.
    pub target: TargetState,
    /// Believed physical position.
    pub current: CurrentState,
    /// Transition generation.  Bumped on every relay pulse and on every
    /// inferred manual movement; timers carry the epoch they were armed in.
    pub epoch: u64,
    /// A stall timer for `epoch` is outstanding.
    pub stall_armed: bool,
    /// The last poll saw both sensors asserted and the fault is unresolved.
    pub sensor_fault: bool,
    pub relay: RelayState,
}

impl DoorContext {
    /// A door believed to rest at `initial`.
    pub fn new(initial: TargetState) -> Self {
        Self {
            target: initial,
            current: initial.resting(),
            epoch: 0,
            stall_armed: false,
            sensor_fault: false,
            relay: RelayState::default(),
        }
    }

    pub fn snapshot(&self) -> DoorSnapshot {
        DoorSnapshot {
            current: self.current,
            target: self.target,
        }
    }

    /// Set `current`; returns the previous value if it changed.
    pub fn set_current(&mut self, next: CurrentState) -> Option<CurrentState> {
        let prev = self.current;
        if prev == next {
            return None;
        }
        self.current = next;
        Some(prev)
    }

    /// Set `target`; returns the previous value if it changed.
    pub fn set_target(&mut self, next: TargetState) -> Option<TargetState> {
        let prev = self.target;
        if prev == next {
            return None;
        }
        self.target = next;
        Some(prev)
    }

    /// Start a new transition generation and return it.
    pub fn next_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    /// `current` rests at `target`.
    pub fn target_reached(&self) -> bool {
        self.current == self.target.resting()
    }
}
