//! Protocol module - wire format, accumulators and decoders.
//!
//! This module implements the binary side of the RHX TCP interface:
//! - Little-endian wire constants and the waveform stream layout
//! - Byte accumulators that reassemble fixed-size units from socket reads
//! - Waveform super-frame and spike record decoders

mod accumulator;
mod spike;
mod waveform;
mod wire_format;

pub use accumulator::{FramingPolicy, SpikeAccumulator, SpikeRelease, WaveformAccumulator};
pub use spike::{complete_records, decode_spike_run, DecodedSpikes, SpikeRecord};
pub use waveform::{
    build_super_frame, build_waveform_block, DecodedSuperFrame, SampleCapture, WaveformBlock,
    WaveformDecoder, WaveformFrame,
};
pub use wire_format::{
    amplifier_microvolts, timestamp_seconds, MagicMismatch, StreamKind, WaveformLayout,
    AMPLIFIER_ZERO_OFFSET, BLOCKS_PER_READ, CHANNEL_COUNT, FRAMES_PER_BLOCK, MAGIC_SIZE,
    MAX_BLOCKS_PER_READ, MAX_CHANNEL_COUNT, MICROVOLTS_PER_BIT, NATIVE_NAME_SIZE, SAMPLE_SIZE,
    SPIKE_MAGIC, SPIKE_RECORD_SIZE, TIMESTAMP_SIZE, WAVEFORM_BYTES_PER_BLOCK,
    WAVEFORM_BYTES_PER_FRAME, WAVEFORM_BYTES_PER_SUPER_FRAME, WAVEFORM_MAGIC,
};
