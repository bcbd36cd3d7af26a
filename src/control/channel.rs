//! Command socket I/O.
//!
//! # Important
//!
//! - Commands are written as-is and flushed immediately
//! - `get` replies arrive as a single read of at most
//!   [`COMMAND_BUFFER_SIZE`] bytes
//! - `set` and `execute` commands produce no reply; never call
//!   [`CommandChannel::request`] with them or it will wait forever

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::command::{
    get_run_mode, get_sample_rate, get_type, parse_run_mode_reply, parse_sample_rate_reply,
    parse_type_reply, set_run_mode, ControllerType, RunMode,
};
use crate::error::{Result, RhxError};

/// Maximum size of one command reply.
pub const COMMAND_BUFFER_SIZE: usize = 1024;

/// Text command channel over any async byte stream.
pub struct CommandChannel<S> {
    stream: S,
    buf: Vec<u8>,
}

impl<S> CommandChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: vec![0u8; COMMAND_BUFFER_SIZE],
        }
    }

    /// Send a command without waiting for a reply.
    pub async fn send(&mut self, command: &str) -> Result<()> {
        tracing::debug!("Sending command: {}", command);
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one reply.
    ///
    /// # Errors
    ///
    /// Returns [`RhxError::ConnectionClosed`] if the server hung up.
    pub async fn read_reply(&mut self) -> Result<String> {
        let n = self.stream.read(&mut self.buf).await?;
        if n == 0 {
            return Err(RhxError::ConnectionClosed);
        }
        let reply = String::from_utf8_lossy(&self.buf[..n]).into_owned();
        tracing::debug!("Command reply: {}", reply.trim_end());
        Ok(reply)
    }

    /// Send a `get` command and read its reply.
    pub async fn request(&mut self, command: &str) -> Result<String> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Query the current run mode.
    pub async fn run_mode(&mut self) -> Result<RunMode> {
        let reply = self.request(&get_run_mode()).await?;
        parse_run_mode_reply(&reply)
    }

    /// Query the amplifier sample rate in Hz.
    pub async fn sample_rate(&mut self) -> Result<f64> {
        let reply = self.request(&get_sample_rate()).await?;
        parse_sample_rate_reply(&reply)
    }

    /// Change the run mode.
    pub async fn set_run_mode(&mut self, mode: RunMode) -> Result<()> {
        self.send(&set_run_mode(mode)).await
    }

    /// Query the controller type.
    pub async fn controller_type(&mut self) -> Result<ControllerType> {
        let reply = self.request(&get_type()).await?;
        parse_type_reply(&reply)
    }

    /// Stop acquisition if it is running. Returns `true` if a stop was sent.
    ///
    /// Most settings are rejected by the controller while it runs.
    pub async fn stop_if_running(&mut self) -> Result<bool> {
        if self.run_mode().await? == RunMode::Stop {
            return Ok(false);
        }
        self.set_run_mode(RunMode::Stop).await?;
        Ok(true)
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}
