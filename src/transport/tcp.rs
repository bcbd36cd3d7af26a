//! TCP connection helpers and the data-socket read loop.
//!
//! # Example
//!
//! ```ignore
//! use rhx_tcp_client::engine::SpikeEngine;
//! use rhx_tcp_client::protocol::FramingPolicy;
//! use rhx_tcp_client::transport::{connect, read_loop, DEFAULT_READ_BUFFER_SIZE};
//!
//! let stream = connect("127.0.0.1:5002", Duration::from_secs(5)).await?;
//! let mut engine = SpikeEngine::with_policy(FramingPolicy::Strict);
//! read_loop(stream, &mut engine, DEFAULT_READ_BUFFER_SIZE).await?;
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::engine::ChunkSink;
use crate::error::{Result, RhxError};

/// Default socket read buffer (64KB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Connect to `addr`, giving up after `timeout`.
///
/// Nagle is disabled so short text commands go out immediately.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(RhxError::ConnectTimeout {
                addr: addr.to_string(),
            })
        }
    };
    stream.set_nodelay(true)?;
    tracing::info!("Connected to {}", addr);
    Ok(stream)
}

/// The three controller connections.
pub struct DataConnections {
    /// Text command socket.
    pub command: TcpStream,
    /// Waveform data socket.
    pub waveform: TcpStream,
    /// Spike data socket.
    pub spike: TcpStream,
}

/// Open the command, waveform and spike connections concurrently.
///
/// Fails as soon as any of the three fails; the others are dropped.
pub async fn connect_all(
    command: &str,
    waveform: &str,
    spike: &str,
    timeout: Duration,
) -> Result<DataConnections> {
    let (command, waveform, spike) = tokio::try_join!(
        connect(command, timeout),
        connect(waveform, timeout),
        connect(spike, timeout),
    )?;
    Ok(DataConnections {
        command,
        waveform,
        spike,
    })
}

/// Read until EOF, feeding every chunk into `sink`.
///
/// Each read is pushed as-is; reassembly is the sink's job. Returns the
/// total number of bytes read when the peer closes the connection.
pub async fn read_loop<R, S>(mut reader: R, sink: &mut S, buffer_size: usize) -> Result<u64>
where
    R: AsyncRead + Unpin,
    S: ChunkSink + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(total), // Connection closed
            Ok(n) => n,
            Err(e) => return Err(RhxError::Io(e)),
        };
        total += n as u64;

        sink.push_chunk(&buf[..n])?;
    }
}
