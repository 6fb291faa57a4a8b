//! Application core: hexagonal architecture.
//!
//! - [`ports`]: traits the domain requires from the outside world
//! - [`commands`]: inbound requests
//! - [`events`]: outbound notifications
//! - [`service`]: the door state machine

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
