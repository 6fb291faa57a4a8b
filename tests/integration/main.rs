//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  Nothing here touches real GPIO or sockets.

mod door_service_tests;
mod hub_tests;
