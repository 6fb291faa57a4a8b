//! Outbound door events.
//!
//! The [`DoorService`](super::service::DoorService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Anything that changes the
//! externally visible snapshot carries the new snapshot so sinks can push
//! it without querying back.

use crate::error::HardwareError;
use crate::fsm::{CurrentState, DoorSnapshot, SensorReading, TargetState};

/// Structured events emitted by the door core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoorEvent {
    /// The believed physical position changed.
    CurrentChanged {
        from: CurrentState,
        snapshot: DoorSnapshot,
    },

    /// The desired position changed.
    TargetChanged {
        from: TargetState,
        snapshot: DoorSnapshot,
    },

    /// A request changed nothing; the snapshot is rebroadcast so the
    /// requester still gets an answer.
    Unchanged(DoorSnapshot),

    /// The door moved without a command (sensors left the resting state).
    ManualOverride { target: TargetState },

    /// A transition was interrupted by an opposite request.
    Interrupted(DoorSnapshot),

    /// A transition did not resolve before the stall timeout.
    StallTimeout(DoorSnapshot),

    /// Both position switches asserted at once.
    SensorFault(SensorReading),

    /// The sensor fault is gone.
    SensorFaultCleared,

    /// A hardware adapter call failed; no state was changed.
    HardwareFault(HardwareError),
}

impl DoorEvent {
    /// The snapshot clients should see after this event, if it is one
    /// they need to be told about.
    pub fn broadcast_snapshot(&self) -> Option<DoorSnapshot> {
        match self {
            Self::CurrentChanged { snapshot, .. }
            | Self::TargetChanged { snapshot, .. }
            | Self::Unchanged(snapshot) => Some(*snapshot),
            _ => None,
        }
    }
}
