//! Byte accumulators for the waveform and spike streams.
//!
//! Uses `bytes::BytesMut` so released units are split off the front of the
//! buffer without copying. Both accumulators are content-agnostic: they
//! count bytes and never look at magic numbers.
//!
//! # Example
//!
//! ```
//! use rhx_tcp_client::protocol::{FramingPolicy, WaveformAccumulator, WaveformLayout};
//!
//! let layout = WaveformLayout::default();
//! let mut acc = WaveformAccumulator::for_layout(&layout, FramingPolicy::Strict);
//!
//! // Data arrives in chunks from the socket
//! let units = acc.push(&vec![0u8; 50_000]);
//! assert_eq!(units.len(), 1);
//! assert_eq!(units[0].len(), 46_120);
//! assert_eq!(acc.len(), 50_000 - 46_120);
//! ```

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::spike::complete_records;
use super::wire_format::{WaveformLayout, SPIKE_RECORD_SIZE};

/// Initial buffer capacity (64KB).
const INITIAL_CAPACITY: usize = 64 * 1024;

/// How units are released from the accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingPolicy {
    /// Matches the RHX example client bit for bit.
    ///
    /// - Waveform: decode only when the buffer holds *more than* one
    ///   super-frame, and release at most one super-frame per push.
    /// - Spike: decode whole records from each push and drop the remainder.
    #[default]
    Reference,
    /// Loss-free framing.
    ///
    /// - Waveform: release every complete super-frame (`>=` threshold).
    /// - Spike: keep a partial trailing record for the next push.
    Strict,
}

/// Accumulates waveform bytes and releases whole super-frames.
pub struct WaveformAccumulator {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Size of one super-frame.
    unit_size: usize,
    policy: FramingPolicy,
}

impl WaveformAccumulator {
    /// Create an accumulator for units of `unit_size` bytes.
    pub fn new(unit_size: usize, policy: FramingPolicy) -> Self {
        debug_assert!(unit_size > 0);
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY.max(unit_size.saturating_mul(2))),
            unit_size,
            policy,
        }
    }

    /// Create an accumulator sized for one super-frame of `layout`.
    pub fn for_layout(layout: &WaveformLayout, policy: FramingPolicy) -> Self {
        Self::new(layout.bytes_per_super_frame(), policy)
    }

    /// Push data into the buffer and release complete super-frames.
    ///
    /// Under [`FramingPolicy::Reference`] at most one super-frame is released
    /// per push, and only once the buffer holds strictly more than one
    /// super-frame. Under [`FramingPolicy::Strict`] every complete
    /// super-frame is released. Leftover bytes stay buffered either way.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut units = Vec::new();
        match self.policy {
            FramingPolicy::Reference => {
                if let Some(unit) = self.try_extract_one() {
                    units.push(unit);
                }
            }
            FramingPolicy::Strict => {
                while let Some(unit) = self.try_extract_one() {
                    units.push(unit);
                }
            }
        }
        units
    }

    /// Whether the buffered bytes cross the release threshold.
    #[inline]
    pub fn is_ready(&self) -> bool {
        match self.policy {
            FramingPolicy::Reference => self.buffer.len() > self.unit_size,
            FramingPolicy::Strict => self.buffer.len() >= self.unit_size,
        }
    }

    /// Split one super-frame off the front (zero-copy freeze).
    fn try_extract_one(&mut self) -> Option<Bytes> {
        if !self.is_ready() {
            return None;
        }
        Some(self.buffer.split_to(self.unit_size).freeze())
    }

    /// Size of one released unit.
    #[inline]
    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// Active policy.
    #[inline]
    pub fn policy(&self) -> FramingPolicy {
        self.policy
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Bytes released by one spike push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpikeRelease {
    /// Whole records, `len() % 14 == 0`.
    pub records: Bytes,
    /// Trailing bytes thrown away under [`FramingPolicy::Reference`].
    pub discarded: usize,
}

impl SpikeRelease {
    /// Number of complete records released.
    #[inline]
    pub fn record_count(&self) -> usize {
        complete_records(self.records.len())
    }
}

/// Accumulates spike bytes and releases whole records.
pub struct SpikeAccumulator {
    buffer: BytesMut,
    policy: FramingPolicy,
}

impl SpikeAccumulator {
    /// Create a spike accumulator.
    pub fn new(policy: FramingPolicy) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            policy,
        }
    }

    /// Push data and release every complete record now available.
    ///
    /// Runs on every push. Under [`FramingPolicy::Reference`] a partial
    /// trailing record is discarded and the buffer ends empty; under
    /// [`FramingPolicy::Strict`] it is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> SpikeRelease {
        self.buffer.extend_from_slice(data);

        let whole = complete_records(self.buffer.len()) * SPIKE_RECORD_SIZE;
        let records = self.buffer.split_to(whole).freeze();

        let discarded = match self.policy {
            FramingPolicy::Reference => {
                let dropped = self.buffer.len();
                if dropped > 0 {
                    tracing::debug!("Discarding {} trailing spike bytes", dropped);
                }
                self.buffer.clear();
                dropped
            }
            FramingPolicy::Strict => 0,
        };

        SpikeRelease { records, discarded }
    }

    /// Active policy.
    #[inline]
    pub fn policy(&self) -> FramingPolicy {
        self.policy
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for SpikeAccumulator {
    fn default() -> Self {
        Self::new(FramingPolicy::default())
    }
}
