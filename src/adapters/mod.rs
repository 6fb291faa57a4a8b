//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements       | Connects to                    |
//! |--------------|------------------|--------------------------------|
//! | `hardware`   | DoorPort         | `embedded-hal` pins, sysfs     |
//! | `simulated`  | DoorPort         | randomized travel, no sensors  |
//! | `log_sink`   | EventSink        | `log` facade                   |
//! | `time`       | —                | system wall clock              |

pub mod hardware;
pub mod log_sink;
pub mod simulated;
pub mod time;
