//! doorlink library.
//!
//! Door state machine, authenticated control channel and hardware
//! adapters.  The binary in `main.rs` is a thin CLI over these modules;
//! everything is exposed for integration testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod rpc;
