//! Waveform super-frame decoder.
//!
//! A super-frame is `blocks_per_read` blocks laid end to end. Each block is
//! a magic number followed by 128 frames; each frame is a timestamp followed
//! by one sample per enabled channel. The framing is fixed-width, so a
//! corrupted magic number is reported and the block is still consumed by its
//! declared size, keeping the following blocks aligned.
//!
//! # Example
//!
//! ```
//! use rhx_tcp_client::protocol::{build_super_frame, SampleCapture, WaveformDecoder, WaveformLayout};
//!
//! let layout = WaveformLayout::default();
//! let bytes = build_super_frame(&layout, 1000, |_, _| 32768);
//!
//! let decoder = WaveformDecoder::new(layout, SampleCapture::Discard);
//! let decoded = decoder.decode(&bytes).unwrap();
//! assert_eq!(decoded.first_timestamp, 1000);
//! assert_eq!(decoded.blocks_decoded, 10);
//! ```

use bytes::{Buf, BufMut};

use super::wire_format::{
    MagicMismatch, StreamKind, WaveformLayout, SAMPLE_SIZE, WAVEFORM_MAGIC,
};
use crate::error::{Result, RhxError};

/// Whether decoded samples are kept or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleCapture {
    /// Advance past samples without storing them.
    #[default]
    Discard,
    /// Collect every frame into the decode result.
    Keep,
}

/// One timestamp plus one sample per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformFrame {
    /// Sample-clock timestamp.
    pub timestamp: i32,
    /// Raw amplifier samples, one per enabled channel.
    pub samples: Vec<u16>,
}

/// One magic-prefixed group of frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformBlock {
    /// Magic number as read (may be wrong).
    pub magic: u32,
    /// Decoded frames.
    pub frames: Vec<WaveformFrame>,
}

impl WaveformBlock {
    /// Whether the block carried the expected magic number.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == WAVEFORM_MAGIC
    }
}

/// Result of decoding one super-frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSuperFrame {
    /// Timestamp of the first frame of the first block.
    pub first_timestamp: i32,
    /// Number of blocks walked (always `blocks_per_read`).
    pub blocks_decoded: usize,
    /// Blocks whose magic number did not match.
    pub mismatches: Vec<MagicMismatch>,
    /// Decoded blocks. Empty unless capture is [`SampleCapture::Keep`].
    pub blocks: Vec<WaveformBlock>,
}

/// Stateless decoder for waveform super-frames of a fixed layout.
#[derive(Debug, Clone, Copy)]
pub struct WaveformDecoder {
    layout: WaveformLayout,
    capture: SampleCapture,
}

impl WaveformDecoder {
    /// Create a decoder for the given layout.
    pub fn new(layout: WaveformLayout, capture: SampleCapture) -> Self {
        Self { layout, capture }
    }

    /// Layout this decoder expects.
    #[inline]
    pub fn layout(&self) -> &WaveformLayout {
        &self.layout
    }

    /// Decode exactly one super-frame.
    ///
    /// Magic mismatches are logged and returned in the result; they never
    /// fail the call.
    ///
    /// # Errors
    ///
    /// Returns `RhxError::Protocol` if `buf` is not exactly one super-frame
    /// long. The accumulator never hands over anything else.
    pub fn decode(&self, buf: &[u8]) -> Result<DecodedSuperFrame> {
        let expected = self.layout.bytes_per_super_frame();
        if buf.len() != expected {
            return Err(RhxError::Protocol(format!(
                "Waveform super-frame must be {} bytes, got {}",
                expected,
                buf.len()
            )));
        }

        let keep = self.capture == SampleCapture::Keep;
        let blocks_per_read = self.layout.blocks_per_read();
        let channels = self.layout.channel_count();

        let mut cursor = buf;
        let mut first_timestamp = 0;
        let mut mismatches = Vec::new();
        let mut blocks = Vec::new();

        for block in 0..blocks_per_read {
            let magic = cursor.get_u32_le();
            if magic != WAVEFORM_MAGIC {
                tracing::warn!(
                    "Waveform magic number mismatch in block {}: read {:#010x}",
                    block,
                    magic
                );
                mismatches.push(MagicMismatch {
                    stream: StreamKind::Waveform,
                    index: block,
                    found: magic,
                });
            }

            let mut frames = Vec::new();

            for frame in 0..self.layout.frames_per_block() {
                let timestamp = cursor.get_i32_le();
                if block == 0 && frame == 0 {
                    first_timestamp = timestamp;
                }

                if keep {
                    let samples = (0..channels).map(|_| cursor.get_u16_le()).collect();
                    frames.push(WaveformFrame { timestamp, samples });
                } else {
                    cursor.advance(channels * SAMPLE_SIZE);
                }
            }

            if keep {
                blocks.push(WaveformBlock { magic, frames });
            }
        }

        debug_assert!(!cursor.has_remaining());

        Ok(DecodedSuperFrame {
            first_timestamp,
            blocks_decoded: blocks_per_read,
            mismatches,
            blocks,
        })
    }
}

/// Encode one waveform block.
///
/// Frames get consecutive timestamps starting at `first_timestamp`;
/// `sample(timestamp, channel)` supplies each sample.
pub fn build_waveform_block<F>(
    layout: &WaveformLayout,
    magic: u32,
    first_timestamp: i32,
    mut sample: F,
) -> Vec<u8>
where
    F: FnMut(i32, usize) -> u16,
{
    let mut buf = Vec::with_capacity(layout.bytes_per_block());
    buf.put_u32_le(magic);
    for frame in 0..layout.frames_per_block() {
        let timestamp = first_timestamp.wrapping_add(frame as i32);
        buf.put_i32_le(timestamp);
        for channel in 0..layout.channel_count() {
            buf.put_u16_le(sample(timestamp, channel));
        }
    }
    buf
}

/// Encode a full super-frame of valid blocks with consecutive timestamps.
pub fn build_super_frame<F>(layout: &WaveformLayout, first_timestamp: i32, mut sample: F) -> Vec<u8>
where
    F: FnMut(i32, usize) -> u16,
{
    let mut buf = Vec::with_capacity(layout.bytes_per_super_frame());
    for block in 0..layout.blocks_per_read() {
        let start = first_timestamp.wrapping_add((block * layout.frames_per_block()) as i32);
        buf.extend(build_waveform_block(layout, WAVEFORM_MAGIC, start, &mut sample));
    }
    buf
}
