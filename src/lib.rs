//! # rhx-tcp-client
//!
//! Rust client for the TCP interface of Intan RHX acquisition controllers.
//!
//! The controller exposes three sockets:
//!
//! - **Command** (text): switches per-channel TCP output and the run mode,
//!   answers `get` queries
//! - **Waveform** (binary): fixed-size blocks of timestamped amplifier
//!   samples, consumed ten blocks at a time
//! - **Spike** (binary): 14-byte spike event records
//!
//! Each data socket is read by its own task. Bytes go through an
//! accumulator that reassembles whole units, a decoder that validates the
//! integrity markers, and a running state that is pushed to observers.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rhx_tcp_client::{Client, TracingObserver};
//!
//! #[tokio::main]
//! async fn main() -> rhx_tcp_client::Result<()> {
//!     let client = Client::builder()
//!         .observer(Arc::new(TracingObserver))
//!         .connect()
//!         .await?;
//!
//!     client.start_routine(16).await?;
//!     let stats = client.stats();
//!     client.wait_for_shutdown().await?;
//!     println!("{} blocks", stats.total_blocks_processed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod state;
pub mod transport;

mod client;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, Endpoint};
pub use engine::{ChunkSink, SpikeEngine, WaveformEngine};
pub use error::{Result, RhxError};
pub use observer::{NoopObserver, ObserverSet, StreamObserver, StreamStats, TracingObserver};
pub use protocol::{FramingPolicy, SampleCapture, SpikeRecord, WaveformLayout};
pub use state::{SpikeState, WaveformState};
