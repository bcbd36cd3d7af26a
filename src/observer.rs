//! Observers for decoded stream state.
//!
//! Engines call out to a [`StreamObserver`] after every decode pass. One
//! observer may be shared by the waveform and spike engines, which run on
//! separate tasks, so implementations must be `Send + Sync` and must not
//! assume any ordering between the two streams.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rhx_tcp_client::observer::{ObserverSet, StreamStats, TracingObserver};
//!
//! let stats = StreamStats::new();
//! let observers = ObserverSet::new()
//!     .with(Arc::new(stats.clone()))
//!     .with(Arc::new(TracingObserver));
//!
//! assert_eq!(stats.total_blocks_processed(), 0);
//! # let _ = observers;
//! ```

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::protocol::{MagicMismatch, SpikeRecord, WaveformBlock};
use crate::state::{SpikeState, WaveformState};

/// Receiver of stream updates.
///
/// Every method has a no-op default; implement only what you need.
/// Values are pushed last-write-wins, so repeated calls with the same state
/// must be harmless.
pub trait StreamObserver: Send + Sync {
    /// Waveform counters changed (called once per decoded super-frame).
    fn waveform_updated(&self, _state: &WaveformState) {}

    /// Spike counters after a spike decode pass.
    fn spike_updated(&self, _state: &SpikeState) {}

    /// An integrity marker did not match.
    fn magic_mismatch(&self, _mismatch: &MagicMismatch) {}

    /// Decoded waveform blocks (only when sample capture is on).
    fn waveform_blocks(&self, _blocks: &[WaveformBlock]) {}

    /// Decoded spike records of one pass.
    fn spike_records(&self, _records: &[SpikeRecord]) {}
}

impl<T: StreamObserver + ?Sized> StreamObserver for Arc<T> {
    fn waveform_updated(&self, state: &WaveformState) {
        (**self).waveform_updated(state)
    }

    fn spike_updated(&self, state: &SpikeState) {
        (**self).spike_updated(state)
    }

    fn magic_mismatch(&self, mismatch: &MagicMismatch) {
        (**self).magic_mismatch(mismatch)
    }

    fn waveform_blocks(&self, blocks: &[WaveformBlock]) {
        (**self).waveform_blocks(blocks)
    }

    fn spike_records(&self, records: &[SpikeRecord]) {
        (**self).spike_records(records)
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

/// Observer that logs every update through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl StreamObserver for TracingObserver {
    fn waveform_updated(&self, state: &WaveformState) {
        tracing::debug!(
            total_blocks = state.total_blocks_processed,
            timestamp = ?state.latest_timestamp,
            "Waveform data blocks received"
        );
    }

    fn spike_updated(&self, state: &SpikeState) {
        tracing::debug!(
            total_spikes = state.total_spikes_processed,
            "Total spikes received"
        );
    }
}

/// Fan-out to several observers, in registration order.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn StreamObserver>>,
}

impl ObserverSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer (builder style).
    pub fn with(mut self, observer: Arc<dyn StreamObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Add an observer.
    pub fn push(&mut self, observer: Arc<dyn StreamObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Check if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl StreamObserver for ObserverSet {
    fn waveform_updated(&self, state: &WaveformState) {
        for o in &self.observers {
            o.waveform_updated(state);
        }
    }

    fn spike_updated(&self, state: &SpikeState) {
        for o in &self.observers {
            o.spike_updated(state);
        }
    }

    fn magic_mismatch(&self, mismatch: &MagicMismatch) {
        for o in &self.observers {
            o.magic_mismatch(mismatch);
        }
    }

    fn waveform_blocks(&self, blocks: &[WaveformBlock]) {
        for o in &self.observers {
            o.waveform_blocks(blocks);
        }
    }

    fn spike_records(&self, records: &[SpikeRecord]) {
        for o in &self.observers {
            o.spike_records(records);
        }
    }
}

/// Sentinel stored while no timestamp has been seen.
const NO_TIMESTAMP: i64 = i64::MIN;

#[derive(Debug)]
struct StatsInner {
    total_blocks: AtomicU64,
    latest_timestamp: AtomicI64,
    waveform_mismatches: AtomicU64,
    total_spikes: AtomicU64,
    spike_mismatches: AtomicU64,
    spike_bytes_discarded: AtomicU64,
}

/// Lock-free, pollable copy of the latest counters.
///
/// Cheaply cloneable; every clone sees the same values. Suitable for a UI
/// or metrics poller on another thread.
#[derive(Debug, Clone)]
pub struct StreamStats {
    inner: Arc<StatsInner>,
}

impl StreamStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner {
                total_blocks: AtomicU64::new(0),
                latest_timestamp: AtomicI64::new(NO_TIMESTAMP),
                waveform_mismatches: AtomicU64::new(0),
                total_spikes: AtomicU64::new(0),
                spike_mismatches: AtomicU64::new(0),
                spike_bytes_discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Waveform blocks decoded.
    #[inline]
    pub fn total_blocks_processed(&self) -> u64 {
        self.inner.total_blocks.load(Ordering::Acquire)
    }

    /// Latest super-frame timestamp, if any super-frame was decoded.
    #[inline]
    pub fn latest_timestamp(&self) -> Option<i32> {
        match self.inner.latest_timestamp.load(Ordering::Acquire) {
            NO_TIMESTAMP => None,
            ts => Some(ts as i32),
        }
    }

    /// Spike records decoded.
    #[inline]
    pub fn total_spikes_processed(&self) -> u64 {
        self.inner.total_spikes.load(Ordering::Acquire)
    }

    /// Snapshot of the waveform side.
    pub fn waveform(&self) -> WaveformState {
        WaveformState {
            total_blocks_processed: self.total_blocks_processed(),
            latest_timestamp: self.latest_timestamp(),
            magic_mismatches: self.inner.waveform_mismatches.load(Ordering::Acquire),
        }
    }

    /// Snapshot of the spike side.
    pub fn spike(&self) -> SpikeState {
        SpikeState {
            total_spikes_processed: self.total_spikes_processed(),
            magic_mismatches: self.inner.spike_mismatches.load(Ordering::Acquire),
            bytes_discarded: self.inner.spike_bytes_discarded.load(Ordering::Acquire),
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamObserver for StreamStats {
    fn waveform_updated(&self, state: &WaveformState) {
        let inner = &self.inner;
        inner
            .total_blocks
            .store(state.total_blocks_processed, Ordering::Release);
        inner.latest_timestamp.store(
            state.latest_timestamp.map_or(NO_TIMESTAMP, i64::from),
            Ordering::Release,
        );
        inner
            .waveform_mismatches
            .store(state.magic_mismatches, Ordering::Release);
    }

    fn spike_updated(&self, state: &SpikeState) {
        let inner = &self.inner;
        inner
            .total_spikes
            .store(state.total_spikes_processed, Ordering::Release);
        inner
            .spike_mismatches
            .store(state.magic_mismatches, Ordering::Release);
        inner
            .spike_bytes_discarded
            .store(state.bytes_discarded, Ordering::Release);
    }
}
