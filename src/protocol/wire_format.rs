//! Wire format constants and stream layout.
//!
//! Waveform stream, one block:
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┐
//! │ Magic    │ 128 × frame                                  │
//! │ 4 bytes  │ ┌───────────┬──────────────────────────────┐ │
//! │ uint32 LE│ │ Timestamp │ N × sample                   │ │
//! │          │ │ int32 LE  │ uint16 LE (one per channel)  │ │
//! │          │ └───────────┴──────────────────────────────┘ │
//! └──────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Spike stream, one record:
//! ```text
//! ┌──────────┬──────────────┬───────────┬──────┐
//! │ Magic    │ Native name  │ Timestamp │ Id   │
//! │ uint32 LE│ 5 bytes text │ uint32 LE │ u8   │
//! └──────────┴──────────────┴───────────┴──────┘
//! ```
//!
//! All multi-byte integers are Little Endian.

use crate::error::{Result, RhxError};

/// Magic number prefixed to every waveform block.
pub const WAVEFORM_MAGIC: u32 = 0x2ef0_7a08;

/// Magic number prefixed to every spike record.
pub const SPIKE_MAGIC: u32 = 0x3ae2_710f;

/// Size of a magic number in bytes.
pub const MAGIC_SIZE: usize = 4;

/// Size of a frame timestamp in bytes.
pub const TIMESTAMP_SIZE: usize = 4;

/// Size of one amplifier sample in bytes.
pub const SAMPLE_SIZE: usize = 2;

/// Frames per waveform block. The controller always emits 128-frame blocks.
pub const FRAMES_PER_BLOCK: usize = 128;

/// Default number of channels enabled for waveform output.
pub const CHANNEL_COUNT: usize = 16;

/// Default number of blocks decoded per pass (one super-frame).
pub const BLOCKS_PER_READ: usize = 10;

/// Length of the fixed-width native channel name in a spike record.
pub const NATIVE_NAME_SIZE: usize = 5;

/// Size of one spike record in bytes (fixed, exactly 14).
pub const SPIKE_RECORD_SIZE: usize = MAGIC_SIZE + NATIVE_NAME_SIZE + TIMESTAMP_SIZE + 1;

/// Bytes per frame with the default channel count (36).
pub const WAVEFORM_BYTES_PER_FRAME: usize = TIMESTAMP_SIZE + SAMPLE_SIZE * CHANNEL_COUNT;

/// Bytes per block with the default channel count (4612).
pub const WAVEFORM_BYTES_PER_BLOCK: usize = FRAMES_PER_BLOCK * WAVEFORM_BYTES_PER_FRAME + MAGIC_SIZE;

/// Bytes per super-frame with the default layout (46120).
pub const WAVEFORM_BYTES_PER_SUPER_FRAME: usize = BLOCKS_PER_READ * WAVEFORM_BYTES_PER_BLOCK;

/// Largest channel count a layout accepts (every amplifier channel of a
/// fully populated controller).
pub const MAX_CHANNEL_COUNT: usize = 1024;

/// Largest number of blocks decoded per pass.
pub const MAX_BLOCKS_PER_READ: usize = 100;

/// Microvolts per amplifier LSB.
pub const MICROVOLTS_PER_BIT: f64 = 0.195;

/// Amplifier sample value corresponding to 0 µV.
pub const AMPLIFIER_ZERO_OFFSET: i32 = 32768;

/// Shape of the waveform stream for one connection.
///
/// The waveform stream is not self-describing: the number of channels with
/// TCP output enabled decides the frame width, so the client has to know it.
/// All sizes are computed once here and never change for the lifetime of an
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformLayout {
    channel_count: usize,
    blocks_per_read: usize,
    bytes_per_frame: usize,
    bytes_per_block: usize,
    bytes_per_super_frame: usize,
}

impl WaveformLayout {
    /// Create a layout for `channel_count` enabled channels, decoding
    /// `blocks_per_read` blocks per pass.
    ///
    /// # Errors
    ///
    /// Returns `RhxError::Config` if either value is zero or above
    /// [`MAX_CHANNEL_COUNT`] / [`MAX_BLOCKS_PER_READ`].
    ///
    /// # Example
    ///
    /// ```
    /// use rhx_tcp_client::protocol::WaveformLayout;
    ///
    /// // Single wideband channel, as in the RHX Python examples.
    /// let layout = WaveformLayout::new(1, 1).unwrap();
    /// assert_eq!(layout.bytes_per_frame(), 6);
    /// assert_eq!(layout.bytes_per_block(), 772);
    /// ```
    pub fn new(channel_count: usize, blocks_per_read: usize) -> Result<Self> {
        if channel_count == 0 || channel_count > MAX_CHANNEL_COUNT {
            return Err(RhxError::Config(format!(
                "channel count must be between 1 and {}, got {}",
                MAX_CHANNEL_COUNT, channel_count
            )));
        }
        if blocks_per_read == 0 || blocks_per_read > MAX_BLOCKS_PER_READ {
            return Err(RhxError::Config(format!(
                "blocks per read must be between 1 and {}, got {}",
                MAX_BLOCKS_PER_READ, blocks_per_read
            )));
        }

        let overflow = || RhxError::Config("waveform layout size overflows usize".to_string());
        let bytes_per_frame = SAMPLE_SIZE
            .checked_mul(channel_count)
            .and_then(|n| n.checked_add(TIMESTAMP_SIZE))
            .ok_or_else(overflow)?;
        let bytes_per_block = FRAMES_PER_BLOCK
            .checked_mul(bytes_per_frame)
            .and_then(|n| n.checked_add(MAGIC_SIZE))
            .ok_or_else(overflow)?;
        let bytes_per_super_frame = blocks_per_read
            .checked_mul(bytes_per_block)
            .ok_or_else(overflow)?;

        Ok(Self {
            channel_count,
            blocks_per_read,
            bytes_per_frame,
            bytes_per_block,
            bytes_per_super_frame,
        })
    }

    /// Number of channels per frame.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Number of blocks in one super-frame.
    #[inline]
    pub fn blocks_per_read(&self) -> usize {
        self.blocks_per_read
    }

    /// Frames per block (always 128).
    #[inline]
    pub fn frames_per_block(&self) -> usize {
        FRAMES_PER_BLOCK
    }

    /// Size of one frame in bytes.
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Size of one block in bytes, magic included.
    #[inline]
    pub fn bytes_per_block(&self) -> usize {
        self.bytes_per_block
    }

    /// Size of one super-frame in bytes.
    #[inline]
    pub fn bytes_per_super_frame(&self) -> usize {
        self.bytes_per_super_frame
    }
}

impl Default for WaveformLayout {
    /// 16 channels, 10 blocks per read.
    fn default() -> Self {
        Self {
            channel_count: CHANNEL_COUNT,
            blocks_per_read: BLOCKS_PER_READ,
            bytes_per_frame: WAVEFORM_BYTES_PER_FRAME,
            bytes_per_block: WAVEFORM_BYTES_PER_BLOCK,
            bytes_per_super_frame: WAVEFORM_BYTES_PER_SUPER_FRAME,
        }
    }
}

/// Which stream a unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Continuous waveform samples.
    Waveform,
    /// Discrete spike events.
    Spike,
}

impl StreamKind {
    /// Magic number expected at the start of each unit of this stream.
    #[inline]
    pub fn expected_magic(&self) -> u32 {
        match self {
            StreamKind::Waveform => WAVEFORM_MAGIC,
            StreamKind::Spike => SPIKE_MAGIC,
        }
    }
}

/// An integrity-marker mismatch found while decoding.
///
/// Never fatal: the decoder skips the unit by its fixed size and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicMismatch {
    /// Stream the unit belongs to.
    pub stream: StreamKind,
    /// Index of the unit within the decode pass (block or record index).
    pub index: usize,
    /// Value actually read.
    pub found: u32,
}

impl MagicMismatch {
    /// Magic number that was expected.
    #[inline]
    pub fn expected(&self) -> u32 {
        self.stream.expected_magic()
    }
}

/// Convert a raw amplifier sample to microvolts.
///
/// # Example
///
/// ```
/// use rhx_tcp_client::protocol::amplifier_microvolts;
///
/// assert_eq!(amplifier_microvolts(32768), 0.0);
/// assert!((amplifier_microvolts(32778) - 1.95).abs() < 1e-9);
/// ```
#[inline]
pub fn amplifier_microvolts(sample: u16) -> f64 {
    MICROVOLTS_PER_BIT * (i32::from(sample) - AMPLIFIER_ZERO_OFFSET) as f64
}

/// Convert a frame timestamp to seconds at the given sample rate.
#[inline]
pub fn timestamp_seconds(timestamp: i32, sample_rate_hz: f64) -> f64 {
    f64::from(timestamp) / sample_rate_hz
}
