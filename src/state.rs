//! Per-connection stream state.
//!
//! Counters only ever grow for the lifetime of an engine. A reconnect
//! builds a fresh engine and therefore starts again from zero.

use serde::Serialize;

/// Running state of the waveform pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaveformState {
    /// Blocks decoded so far (grows by `blocks_per_read` per super-frame).
    pub total_blocks_processed: u64,
    /// First frame timestamp of the most recent super-frame.
    pub latest_timestamp: Option<i32>,
    /// Blocks whose magic number did not match.
    pub magic_mismatches: u64,
}

impl WaveformState {
    /// Super-frames decoded so far.
    pub fn super_frames(&self, blocks_per_read: usize) -> u64 {
        self.total_blocks_processed / blocks_per_read.max(1) as u64
    }
}

/// Running state of the spike pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpikeState {
    /// Spike records decoded so far.
    pub total_spikes_processed: u64,
    /// Records whose magic number did not match.
    pub magic_mismatches: u64,
    /// Trailing bytes dropped by the reference framing policy.
    pub bytes_discarded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_zero() {
        let waveform = WaveformState::default();
        assert_eq!(waveform.total_blocks_processed, 0);
        assert_eq!(waveform.latest_timestamp, None);

        let spike = SpikeState::default();
        assert_eq!(spike.total_spikes_processed, 0);
        assert_eq!(spike.bytes_discarded, 0);
    }

    #[test]
    fn test_super_frames() {
        let state = WaveformState {
            total_blocks_processed: 30,
            ..Default::default()
        };
        assert_eq!(state.super_frames(10), 3);
        assert_eq!(state.super_frames(0), 30);
    }

    #[test]
    fn test_state_serializes() {
        let state = WaveformState {
            total_blocks_processed: 10,
            latest_timestamp: Some(-5),
            magic_mismatches: 0,
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["total_blocks_processed"], 10);
        assert_eq!(json["latest_timestamp"], -5);
    }
}
