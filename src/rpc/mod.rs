//! Authenticated control channel.
//!
//! Newline-delimited JSON over TCP, every request HMAC-signed.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         RPC Stack                              │
//! │                                                                │
//! │  ┌────────────┐   ┌──────────┐   ┌─────────────────────────┐   │
//! │  │ Transport  │──▶│  Codec   │──▶│  Engine (auth gates)    │   │
//! │  │ (TCP)      │   │ (lines)  │   │  → DoorService          │   │
//! │  └────────────┘   └──────────┘   └─────────────────────────┘   │
//! │        ▲                                     │                 │
//! │        │               ┌─────────────────────┘                 │
//! │        │               ▼                                       │
//! │  ┌────────────┐   ┌────────────┐                               │
//! │  │ Transport  │◀──│ SessionHub │   (snapshot broadcast)        │
//! │  │ (write)    │   │ (channels) │                               │
//! │  └────────────┘   └────────────┘                               │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod channels;
pub mod client;
pub mod codec;
pub mod engine;
pub mod io_task;
pub mod messages;
pub mod transport;
