//! Log-based event sink adapter.
//!
//! [`LogEventSink`] implements [`EventSink`] by writing door events
//! through the `log` facade.  The binary installs `env_logger` as the
//! backend.

use log::{info, warn};

use crate::app::events::DoorEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`DoorEvent`].
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &DoorEvent) {
        match event {
            DoorEvent::CurrentChanged { from, snapshot } => {
                info!("STATE | {} -> {}", from, snapshot.current);
            }
            DoorEvent::TargetChanged { from, snapshot } => {
                info!("TARGET | {} -> {}", from, snapshot.target);
            }
            DoorEvent::Unchanged(snapshot) => {
                info!("SYNC | {}", snapshot);
            }
            DoorEvent::ManualOverride { target } => {
                info!("MANUAL | door moved by hand, target now {}", target);
            }
            DoorEvent::Interrupted(snapshot) => {
                info!("STOP | transition interrupted, {}", snapshot);
            }
            DoorEvent::StallTimeout(snapshot) => {
                warn!("STALL | transition timed out, {}", snapshot);
            }
            DoorEvent::SensorFault(reading) => {
                warn!(
                    "FAULT | both sensors asserted (open={} close={})",
                    reading.open_asserted, reading.close_asserted
                );
            }
            DoorEvent::SensorFaultCleared => {
                info!("FAULT | cleared");
            }
            DoorEvent::HardwareFault(e) => {
                warn!("FAULT | hardware: {}", e);
            }
        }
    }
}
