//! Decode engines: accumulator + decoder + state for one connection.
//!
//! An engine is created per connection and dropped on disconnect. It owns
//! its buffer exclusively, decodes synchronously inside [`ChunkSink::push_chunk`],
//! and reports to its observer after every decode pass. It never touches a
//! socket.
//!
//! ```text
//! transport ─► push_chunk ─► accumulator ─► decoder ─► state ─► observer
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::observer::{NoopObserver, StreamObserver};
use crate::protocol::{
    decode_spike_run, FramingPolicy, SampleCapture, SpikeAccumulator, WaveformAccumulator,
    WaveformDecoder, WaveformLayout,
};
use crate::state::{SpikeState, WaveformState};

/// Anything that consumes raw chunks read from a data socket.
pub trait ChunkSink: Send {
    /// Feed one chunk of arbitrary length.
    fn push_chunk(&mut self, chunk: &[u8]) -> Result<()>;
}

/// Waveform pipeline for one connection.
pub struct WaveformEngine {
    accumulator: WaveformAccumulator,
    decoder: WaveformDecoder,
    state: WaveformState,
    observer: Arc<dyn StreamObserver>,
}

impl WaveformEngine {
    /// Create an engine.
    pub fn new(
        layout: WaveformLayout,
        policy: FramingPolicy,
        capture: SampleCapture,
        observer: Arc<dyn StreamObserver>,
    ) -> Self {
        Self {
            accumulator: WaveformAccumulator::for_layout(&layout, policy),
            decoder: WaveformDecoder::new(layout, capture),
            state: WaveformState::default(),
            observer,
        }
    }

    /// Engine with the default 16-channel layout and no observer.
    pub fn with_policy(policy: FramingPolicy) -> Self {
        Self::new(
            WaveformLayout::default(),
            policy,
            SampleCapture::Discard,
            Arc::new(NoopObserver),
        )
    }

    /// Feed a chunk and decode whatever super-frames it completes.
    ///
    /// Returns the number of super-frames decoded by this call.
    pub fn push(&mut self, chunk: &[u8]) -> Result<usize> {
        let units = self.accumulator.push(chunk);
        let decoded = units.len();

        for unit in units {
            let frame = self.decoder.decode(&unit)?;

            self.state.total_blocks_processed += frame.blocks_decoded as u64;
            self.state.latest_timestamp = Some(frame.first_timestamp);
            self.state.magic_mismatches += frame.mismatches.len() as u64;

            for mismatch in &frame.mismatches {
                self.observer.magic_mismatch(mismatch);
            }
            if !frame.blocks.is_empty() {
                self.observer.waveform_blocks(&frame.blocks);
            }
            self.observer.waveform_updated(&self.state);
        }

        if decoded > 0 {
            tracing::trace!(
                "Decoded {} super-frame(s), {} bytes buffered",
                decoded,
                self.accumulator.len()
            );
        }

        Ok(decoded)
    }

    /// Current counters.
    #[inline]
    pub fn state(&self) -> &WaveformState {
        &self.state
    }

    /// Layout in use.
    #[inline]
    pub fn layout(&self) -> &WaveformLayout {
        self.decoder.layout()
    }

    /// Bytes waiting for the next super-frame.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }
}

impl ChunkSink for WaveformEngine {
    fn push_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.push(chunk).map(|_| ())
    }
}

/// Spike pipeline for one connection.
pub struct SpikeEngine {
    accumulator: SpikeAccumulator,
    state: SpikeState,
    observer: Arc<dyn StreamObserver>,
}

impl SpikeEngine {
    /// Create an engine.
    pub fn new(policy: FramingPolicy, observer: Arc<dyn StreamObserver>) -> Self {
        Self {
            accumulator: SpikeAccumulator::new(policy),
            state: SpikeState::default(),
            observer,
        }
    }

    /// Engine with no observer.
    pub fn with_policy(policy: FramingPolicy) -> Self {
        Self::new(policy, Arc::new(NoopObserver))
    }

    /// Feed a chunk and decode every complete record now available.
    ///
    /// Every call is a decode pass and ends with an observer update.
    /// Returns the number of records decoded by this call.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let release = self.accumulator.push(chunk);
        let decoded = decode_spike_run(&release.records);
        let count = decoded.records.len();

        self.state.total_spikes_processed += count as u64;
        self.state.magic_mismatches += decoded.mismatches.len() as u64;
        self.state.bytes_discarded += release.discarded as u64;

        for mismatch in &decoded.mismatches {
            self.observer.magic_mismatch(mismatch);
        }
        if count > 0 {
            self.observer.spike_records(&decoded.records);
        }
        self.observer.spike_updated(&self.state);

        count
    }

    /// Current counters.
    #[inline]
    pub fn state(&self) -> &SpikeState {
        &self.state
    }

    /// Bytes held back for the next push (always 0 under the reference policy).
    #[inline]
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }
}

impl ChunkSink for SpikeEngine {
    fn push_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.push(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::observer::StreamStats;
    use crate::protocol::{
        build_super_frame, MagicMismatch, SpikeRecord, WaveformBlock, WAVEFORM_BYTES_PER_BLOCK,
        WAVEFORM_BYTES_PER_SUPER_FRAME,
    };

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<WaveformState>>,
        blocks: Mutex<usize>,
        spikes: Mutex<Vec<SpikeRecord>>,
        mismatches: Mutex<Vec<MagicMismatch>>,
    }

    impl StreamObserver for Recorder {
        fn waveform_updated(&self, state: &WaveformState) {
            self.updates.lock().unwrap().push(*state);
        }

        fn waveform_blocks(&self, blocks: &[WaveformBlock]) {
            *self.blocks.lock().unwrap() += blocks.len();
        }

        fn spike_records(&self, records: &[SpikeRecord]) {
            self.spikes.lock().unwrap().extend_from_slice(records);
        }

        fn magic_mismatch(&self, mismatch: &MagicMismatch) {
            self.mismatches.lock().unwrap().push(*mismatch);
        }
    }

    fn spike_bytes(count: u32) -> Vec<u8> {
        (0..count)
            .flat_map(|i| SpikeRecord::new(*b"A-001", i, 1).encode())
            .collect()
    }

    #[test]
    fn test_waveform_counts_ten_blocks_per_super_frame() {
        let layout = WaveformLayout::default();
        let mut engine = WaveformEngine::with_policy(FramingPolicy::Strict);

        let decoded = engine
            .push(&build_super_frame(&layout, 777, |_, _| 0))
            .unwrap();

        assert_eq!(decoded, 1);
        assert_eq!(engine.state().total_blocks_processed, 10);
        assert_eq!(engine.state().latest_timestamp, Some(777));
    }

    #[test]
    fn test_waveform_latest_timestamp_tracks_last_super_frame() {
        let layout = WaveformLayout::default();
        let mut engine = WaveformEngine::with_policy(FramingPolicy::Strict);

        let mut bytes = build_super_frame(&layout, 0, |_, _| 0);
        bytes.extend(build_super_frame(&layout, 1280, |_, _| 0));
        engine.push(&bytes).unwrap();

        assert_eq!(engine.state().total_blocks_processed, 20);
        assert_eq!(engine.state().latest_timestamp, Some(1280));
    }

    #[test]
    fn test_waveform_reference_exact_size_waits() {
        let layout = WaveformLayout::default();
        let mut engine = WaveformEngine::with_policy(FramingPolicy::Reference);

        let decoded = engine
            .push(&build_super_frame(&layout, 1, |_, _| 0))
            .unwrap();

        assert_eq!(decoded, 0);
        assert_eq!(engine.state().total_blocks_processed, 0);
        assert_eq!(engine.state().latest_timestamp, None);
        assert_eq!(engine.buffered(), WAVEFORM_BYTES_PER_SUPER_FRAME);
    }

    #[test]
    fn test_waveform_reference_two_and_a_bit() {
        let layout = WaveformLayout::default();
        let mut engine = WaveformEngine::with_policy(FramingPolicy::Reference);

        let mut bytes = build_super_frame(&layout, 0, |_, _| 0);
        bytes.extend(build_super_frame(&layout, 1280, |_, _| 0));
        bytes.extend(vec![0u8; 100]);

        let decoded = engine.push(&bytes).unwrap();

        assert_eq!(decoded, 1);
        assert_eq!(engine.state().total_blocks_processed, 10);
        assert_eq!(engine.state().latest_timestamp, Some(0));
        assert_eq!(engine.buffered(), WAVEFORM_BYTES_PER_SUPER_FRAME + 100);
    }

    #[test]
    fn test_waveform_observer_sees_mismatch_and_update() {
        let layout = WaveformLayout::default();
        let recorder = Arc::new(Recorder::default());
        let mut engine = WaveformEngine::new(
            layout,
            FramingPolicy::Strict,
            SampleCapture::Keep,
            recorder.clone(),
        );

        let mut bytes = build_super_frame(&layout, 50, |_, _| 0);
        let offset = 7 * WAVEFORM_BYTES_PER_BLOCK;
        bytes[offset] ^= 0xFF;
        engine.push(&bytes).unwrap();

        let updates = recorder.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].total_blocks_processed, 10);
        assert_eq!(updates[0].magic_mismatches, 1);
        assert_eq!(*recorder.blocks.lock().unwrap(), 10);
        assert_eq!(recorder.mismatches.lock().unwrap()[0].index, 7);
    }

    #[test]
    fn test_spike_counts_records() {
        let mut engine = SpikeEngine::with_policy(FramingPolicy::Reference);

        assert_eq!(engine.push(&spike_bytes(5)), 5);
        assert_eq!(engine.push(&spike_bytes(3)), 3);

        assert_eq!(engine.state().total_spikes_processed, 8);
    }

    #[test]
    fn test_spike_reference_discards_31_byte_tail() {
        let mut engine = SpikeEngine::with_policy(FramingPolicy::Reference);
        let mut bytes = spike_bytes(3);
        bytes.truncate(31);

        assert_eq!(engine.push(&bytes), 2);
        assert_eq!(engine.state().bytes_discarded, 3);
        assert_eq!(engine.buffered(), 0);
    }

    #[test]
    fn test_spike_strict_keeps_31_byte_tail() {
        let mut engine = SpikeEngine::with_policy(FramingPolicy::Strict);
        let bytes = spike_bytes(3);

        assert_eq!(engine.push(&bytes[..31]), 2);
        assert_eq!(engine.buffered(), 3);
        assert_eq!(engine.push(&bytes[31..]), 1);
        assert_eq!(engine.state().total_spikes_processed, 3);
        assert_eq!(engine.state().bytes_discarded, 0);
    }

    #[test]
    fn test_spike_observer_gets_records_and_stats() {
        let recorder = Arc::new(Recorder::default());
        let stats = StreamStats::new();
        let observers = crate::observer::ObserverSet::new()
            .with(recorder.clone())
            .with(Arc::new(stats.clone()));
        let mut engine = SpikeEngine::new(FramingPolicy::Strict, Arc::new(observers));

        engine.push(&spike_bytes(4));

        let spikes = recorder.spikes.lock().unwrap();
        assert_eq!(spikes.len(), 4);
        assert_eq!(spikes[3].timestamp, 3);
        assert_eq!(stats.total_spikes_processed(), 4);
    }

    #[test]
    fn test_engines_as_chunk_sinks() {
        let layout = WaveformLayout::default();
        let mut sinks: Vec<Box<dyn ChunkSink>> = vec![
            Box::new(WaveformEngine::with_policy(FramingPolicy::Strict)),
            Box::new(SpikeEngine::with_policy(FramingPolicy::Strict)),
        ];

        sinks[0]
            .push_chunk(&build_super_frame(&layout, 0, |_, _| 0))
            .unwrap();
        sinks[1].push_chunk(&spike_bytes(1)).unwrap();
    }
}
