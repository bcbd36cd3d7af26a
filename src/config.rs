//! Client configuration.
//!
//! Every field has a default matching a stock RHX controller on the local
//! machine, so a config file only needs the values that differ:
//!
//! ```json
//! { "waveform": { "host": "10.0.0.5", "port": 5001 }, "framing": "strict" }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RhxError};
use crate::protocol::{FramingPolicy, SampleCapture, WaveformLayout, BLOCKS_PER_READ, CHANNEL_COUNT};
use crate::transport::DEFAULT_READ_BUFFER_SIZE;

/// Default controller host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default command port.
pub const DEFAULT_COMMAND_PORT: u16 = 5000;

/// Default waveform port.
pub const DEFAULT_WAVEFORM_PORT: u16 = 5001;

/// Default spike port.
pub const DEFAULT_SPIKE_PORT: u16 = 5002;

/// Default connect timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default pause between routine commands.
pub const DEFAULT_COMMAND_INTERVAL_MS: u64 = 100;

/// Largest accepted socket read buffer (16 MB).
pub const MAX_READ_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Host and port of one controller socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Endpoint on the default host.
    pub fn local(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything needed to connect to a controller and decode its streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Text command socket.
    pub command: Endpoint,
    /// Waveform data socket.
    pub waveform: Endpoint,
    /// Spike data socket.
    pub spike: Endpoint,
    /// Per-connection connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Pause between commands sent by the start routine, in milliseconds.
    pub command_interval_ms: u64,
    /// Socket read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Channels with waveform output enabled.
    pub channel_count: usize,
    /// Blocks per super-frame.
    pub blocks_per_read: usize,
    /// Reassembly policy for both data streams.
    pub framing: FramingPolicy,
    /// Whether decoded waveform samples are kept for observers.
    pub sample_capture: SampleCapture,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: Endpoint::local(DEFAULT_COMMAND_PORT),
            waveform: Endpoint::local(DEFAULT_WAVEFORM_PORT),
            spike: Endpoint::local(DEFAULT_SPIKE_PORT),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            command_interval_ms: DEFAULT_COMMAND_INTERVAL_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_count: CHANNEL_COUNT,
            blocks_per_read: BLOCKS_PER_READ,
            framing: FramingPolicy::default(),
            sample_capture: SampleCapture::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 || self.read_buffer_size > MAX_READ_BUFFER_SIZE {
            return Err(RhxError::Config(format!(
                "read_buffer_size must be between 1 and {}, got {}",
                MAX_READ_BUFFER_SIZE, self.read_buffer_size
            )));
        }
        self.layout().map(|_| ())
    }

    /// Waveform layout derived from `channel_count` and `blocks_per_read`.
    pub fn layout(&self) -> Result<WaveformLayout> {
        WaveformLayout::new(self.channel_count, self.blocks_per_read)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }
}
