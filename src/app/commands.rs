//! Inbound commands to the door service.
//!
//! Produced by the RPC engine once a packet has been authenticated and
//! decoded; interpreted by [`DoorService`](super::service::DoorService).

use crate::fsm::TargetState;

/// Commands that external adapters can send into the door core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorCommand {
    /// Report the current snapshot to the requester only.
    Sync,

    /// Move toward `target`.
    SetTarget(TargetState),
}
