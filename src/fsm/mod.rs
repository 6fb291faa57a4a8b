//! Door state vocabulary.
//!
//! ```text
//!                 pulse                 sensor / sim resolve
//!   ┌───────┐ ───────────▶ ┌─────────┐ ─────────────────────▶ ┌───────┐
//!   │ CLOSE │              │ OPENING │                        │ OPEN  │
//!   └───────┘ ◀─────────── └─────────┘ ◀───────────────────── └───────┘
//!       ▲     sensor / sim  │  ▲   │  pulse (CLOSING mirrors this)
//!       │                   │  │   │
//!       │        interrupt  │  │   │ stall timeout
//!       │                   ▼  │   ▼
//!       │                ┌─────────┐
//!       └──── sensor ────│ STOPPED │  (recovery pulse re-enters a
//!                        └─────────┘   transitional state)
//! ```
//!
//! `OPEN`/`CLOSE` are resting states, `OPENING`/`CLOSING` are transitional,
//! `STOPPED` is the fault/interrupted state.  Both enums serialize as their
//! numeric wire codes.

pub mod context;

use core::fmt;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire-code conversion error
// ---------------------------------------------------------------------------

/// A numeric state code outside the defined range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStateCode(pub u8);

impl fmt::Display for InvalidStateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state code {}", self.0)
    }
}

impl std::error::Error for InvalidStateCode {}

// ---------------------------------------------------------------------------
// Target state
// ---------------------------------------------------------------------------

/// The desired stable door position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TargetState {
    Open = 0,
    Close = 1,
}

impl TargetState {
    /// The other polarity.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Open => Self::Close,
            Self::Close => Self::Open,
        }
    }

    /// The transitional state entered when moving toward this target.
    pub const fn transitional(self) -> CurrentState {
        match self {
            Self::Open => CurrentState::Opening,
            Self::Close => CurrentState::Closing,
        }
    }

    /// The resting state that confirms this target.
    pub const fn resting(self) -> CurrentState {
        match self {
            Self::Open => CurrentState::Open,
            Self::Close => CurrentState::Close,
        }
    }
}

impl TryFrom<u8> for TargetState {
    type Error = InvalidStateCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Open),
            1 => Ok(Self::Close),
            other => Err(InvalidStateCode(other)),
        }
    }
}

impl From<TargetState> for u8 {
    fn from(t: TargetState) -> Self {
        t as u8
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Current state
// ---------------------------------------------------------------------------

/// The machine's belief about the physical door position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum CurrentState {
    Open = 0,
    Close = 1,
    Opening = 2,
    Closing = 3,
    Stopped = 4,
}

impl CurrentState {
    /// `OPEN` or `CLOSE`: the actuator is not being driven.
    pub const fn is_resting(self) -> bool {
        matches!(self, Self::Open | Self::Close)
    }

    /// `OPENING` or `CLOSING`.
    pub const fn is_moving(self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }

    /// The target a resting state satisfies, if any.
    pub const fn resting_target(self) -> Option<TargetState> {
        match self {
            Self::Open => Some(TargetState::Open),
            Self::Close => Some(TargetState::Close),
            _ => None,
        }
    }
}

impl TryFrom<u8> for CurrentState {
    type Error = InvalidStateCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Open),
            1 => Ok(Self::Close),
            2 => Ok(Self::Opening),
            3 => Ok(Self::Closing),
            4 => Ok(Self::Stopped),
            other => Err(InvalidStateCode(other)),
        }
    }
}

impl From<CurrentState> for u8 {
    fn from(c: CurrentState) -> Self {
        c as u8
    }
}

impl fmt::Display for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Opening => "OPENING",
            Self::Closing => "CLOSING",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// `{current, target}` as pushed to every connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorSnapshot {
    pub current: CurrentState,
    pub target: TargetState,
}

impl DoorSnapshot {
    /// True when the door rests at its target.
    pub fn is_resolved(&self) -> bool {
        self.current == self.target.resting()
    }
}

impl fmt::Display for DoorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "current={} target={}", self.current, self.target)
    }
}

// ---------------------------------------------------------------------------
// Sensor reading
// ---------------------------------------------------------------------------

/// Raw state of the two position switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorReading {
    pub open_asserted: bool,
    pub close_asserted: bool,
}

/// What a [`SensorReading`] says about the door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorVerdict {
    /// Only the open switch is asserted.
    Open,
    /// Only the close switch is asserted.
    Close,
    /// Neither switch: the door is somewhere in between.
    Between,
    /// Both switches: physically impossible, wiring or switch fault.
    Implausible,
}

impl SensorReading {
    pub const fn verdict(self) -> SensorVerdict {
        match (self.open_asserted, self.close_asserted) {
            (true, false) => SensorVerdict::Open,
            (false, true) => SensorVerdict::Close,
            (false, false) => SensorVerdict::Between,
            (true, true) => SensorVerdict::Implausible,
        }
    }
}
