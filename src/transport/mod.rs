//! Transport module - TCP connections to the controller.
//!
//! Provides:
//! - Connecting with a timeout (no busy-waiting on socket state)
//! - A generic read loop that feeds socket reads into a decode engine

mod tcp;

pub use tcp::{connect, connect_all, read_loop, DataConnections, DEFAULT_READ_BUFFER_SIZE};
