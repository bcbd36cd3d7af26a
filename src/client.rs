//! Client builder and runtime loops.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring endpoints,
//! framing and observers. The [`Client`] manages the lifecycle:
//! 1. Connect the command, waveform and spike sockets concurrently
//! 2. Spawn one read task per data socket, each owning its engine
//! 3. Send text commands on request
//! 4. Stop when both data sockets close or on [`Client::shutdown`]
//!
//! # Example
//!
//! ```ignore
//! use rhx_tcp_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("192.168.0.20")
//!         .strict_framing()
//!         .connect()
//!         .await?;
//!
//!     client.start_routine(16).await?;
//!     client.wait_for_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};

use crate::config::{ClientConfig, Endpoint};
use crate::control::{routine_commands, CommandChannel, ControllerType, RunMode};
use crate::engine::{SpikeEngine, WaveformEngine};
use crate::error::{Result, RhxError};
use crate::observer::{ObserverSet, StreamObserver, StreamStats};
use crate::protocol::{FramingPolicy, SampleCapture};
use crate::state::{SpikeState, WaveformState};
use crate::transport::{connect_all, read_loop};

/// Builder for configuring and connecting a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    observers: ObserverSet,
}

impl ClientBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    /// Start from an existing configuration (e.g. loaded from JSON).
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            observers: ObserverSet::new(),
        }
    }

    /// Point all three sockets at `host`, keeping their ports.
    pub fn host(mut self, host: &str) -> Self {
        self.config.command.host = host.to_string();
        self.config.waveform.host = host.to_string();
        self.config.spike.host = host.to_string();
        self
    }

    /// Set the command socket endpoint.
    pub fn command(mut self, endpoint: Endpoint) -> Self {
        self.config.command = endpoint;
        self
    }

    /// Set the waveform socket endpoint.
    pub fn waveform(mut self, endpoint: Endpoint) -> Self {
        self.config.waveform = endpoint;
        self
    }

    /// Set the spike socket endpoint.
    pub fn spike(mut self, endpoint: Endpoint) -> Self {
        self.config.spike = endpoint;
        self
    }

    /// Set the per-connection connect timeout.
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the pause between routine commands.
    ///
    /// Default: 100 milliseconds
    pub fn command_interval(mut self, interval: Duration) -> Self {
        self.config.command_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the socket read buffer size.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the waveform layout.
    ///
    /// Default: 16 channels, 10 blocks per read
    pub fn layout(mut self, channel_count: usize, blocks_per_read: usize) -> Self {
        self.config.channel_count = channel_count;
        self.config.blocks_per_read = blocks_per_read;
        self
    }

    /// Set the framing policy for both streams.
    pub fn framing(mut self, policy: FramingPolicy) -> Self {
        self.config.framing = policy;
        self
    }

    /// Shorthand for `framing(FramingPolicy::Strict)`.
    pub fn strict_framing(self) -> Self {
        self.framing(FramingPolicy::Strict)
    }

    /// Keep or discard decoded waveform samples.
    pub fn sample_capture(mut self, capture: SampleCapture) -> Self {
        self.config.sample_capture = capture;
        self
    }

    /// Register an observer. May be called several times.
    pub fn observer(mut self, observer: Arc<dyn StreamObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validate the configuration, connect and start the read tasks.
    pub async fn connect(self) -> Result<Client> {
        Client::start(self.config, self.observers).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected RHX client.
///
/// Use `send_command()` / `request()` on the command socket.
/// Use `stats()` to poll the decoded counters.
/// Use `wait_for_shutdown()` to block until both data sockets close.
pub struct Client {
    config: ClientConfig,
    /// Command socket, serialized between callers.
    command: Mutex<CommandChannel<TcpStream>>,
    stats: StreamStats,
    waveform_task: JoinHandle<Result<WaveformState>>,
    spike_task: JoinHandle<Result<SpikeState>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect with `config` and no extra observers.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        ClientBuilder::from_config(config).connect().await
    }

    async fn start(config: ClientConfig, observers: ObserverSet) -> Result<Self> {
        config.validate()?;
        let layout = config.layout()?;

        // 1. Connect all three sockets
        let connections = connect_all(
            &config.command.to_string(),
            &config.waveform.to_string(),
            &config.spike.to_string(),
            config.connect_timeout(),
        )
        .await?;
        tracing::info!(
            "Connected to controller (command {}, waveform {}, spike {})",
            config.command,
            config.waveform,
            config.spike
        );

        // 2. Stats first, then user observers
        let stats = StreamStats::new();
        let mut all = ObserverSet::new().with(Arc::new(stats.clone()));
        all.push(Arc::new(observers));
        let observer: Arc<dyn StreamObserver> = Arc::new(all);

        // 3. Spawn read loops
        let buffer_size = config.read_buffer_size;
        let mut waveform_engine = WaveformEngine::new(
            layout,
            config.framing,
            config.sample_capture,
            observer.clone(),
        );
        let waveform_stream = connections.waveform;
        let waveform_task = tokio::spawn(async move {
            match read_loop(waveform_stream, &mut waveform_engine, buffer_size).await {
                Ok(total) => {
                    tracing::info!("Waveform connection closed after {} bytes", total);
                    Ok(*waveform_engine.state())
                }
                Err(e) => {
                    tracing::error!("Waveform read loop error: {}", e);
                    Err(e)
                }
            }
        });

        let mut spike_engine = SpikeEngine::new(config.framing, observer);
        let spike_stream = connections.spike;
        let spike_task = tokio::spawn(async move {
            match read_loop(spike_stream, &mut spike_engine, buffer_size).await {
                Ok(total) => {
                    tracing::info!("Spike connection closed after {} bytes", total);
                    Ok(*spike_engine.state())
                }
                Err(e) => {
                    tracing::error!("Spike read loop error: {}", e);
                    Err(e)
                }
            }
        });

        Ok(Client {
            config,
            command: Mutex::new(CommandChannel::new(connections.command)),
            stats,
            waveform_task,
            spike_task,
        })
    }

    /// Configuration the client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared live counters.
    pub fn stats(&self) -> StreamStats {
        self.stats.clone()
    }

    /// Send a command that expects no reply.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.command.lock().await.send(command).await
    }

    /// Send a `get` command and return the raw reply.
    pub async fn request(&self, command: &str) -> Result<String> {
        self.command.lock().await.request(command).await
    }

    /// Query the controller run mode.
    pub async fn run_mode(&self) -> Result<RunMode> {
        self.command.lock().await.run_mode().await
    }

    /// Query the amplifier sample rate in Hz.
    pub async fn sample_rate(&self) -> Result<f64> {
        self.command.lock().await.sample_rate().await
    }

    /// Change the controller run mode.
    pub async fn set_run_mode(&self, mode: RunMode) -> Result<()> {
        self.command.lock().await.set_run_mode(mode).await
    }

    /// Query the controller type.
    pub async fn controller_type(&self) -> Result<ControllerType> {
        self.command.lock().await.controller_type().await
    }

    /// Stop the controller if it is running, then clear all outputs, enable
    /// wide and spike output on the first `channel_count` channels and start
    /// acquisition.
    ///
    /// `channel_count` must equal the configured layout's channel count,
    /// otherwise the waveform stream would be framed with the wrong block
    /// size. Holds the command socket for the whole sequence.
    pub async fn start_routine(&self, channel_count: usize) -> Result<()> {
        if channel_count != self.config.channel_count {
            return Err(RhxError::Config(format!(
                "routine enables {} channel(s) but the waveform layout expects {}",
                channel_count, self.config.channel_count
            )));
        }
        let interval = self.config.command_interval();
        let mut channel = self.command.lock().await;

        if channel.stop_if_running().await? {
            tracing::info!("Controller was running, stopped it before configuring");
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
        for command in routine_commands(channel_count) {
            channel.send(&command).await?;
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
        tracing::info!("Started acquisition on {} channel(s)", channel_count);
        Ok(())
    }

    /// Check if both read tasks have ended.
    pub fn is_finished(&self) -> bool {
        self.waveform_task.is_finished() && self.spike_task.is_finished()
    }

    /// Stop both read tasks. Buffered partial data is dropped.
    pub fn shutdown(&self) {
        self.waveform_task.abort();
        self.spike_task.abort();
    }

    /// Wait until both data sockets close (or [`Client::shutdown`]).
    ///
    /// This consumes the client. Returns the first read-loop error, if any.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let waveform = join_read_task(self.waveform_task.await);
        let spike = join_read_task(self.spike_task.await);
        waveform?;
        spike?;
        Ok(())
    }
}

/// Map a read task outcome; an aborted task counts as a clean stop.
fn join_read_task<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result.map(|_| ()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(RhxError::Task(e.to_string())),
    }
}
