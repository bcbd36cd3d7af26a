//! Integration tests for rhx-tcp-client.
//!
//! These tests drive the public API the way a socket would: arbitrary chunk
//! boundaries into the engines, and real loopback sockets into the client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use rhx_tcp_client::control::RunMode;
use rhx_tcp_client::protocol::{
    amplifier_microvolts, build_super_frame, timestamp_seconds, MagicMismatch, StreamKind,
    WaveformBlock, SPIKE_MAGIC, WAVEFORM_BYTES_PER_BLOCK, WAVEFORM_BYTES_PER_SUPER_FRAME,
};
use rhx_tcp_client::{
    Client, Endpoint, FramingPolicy, SampleCapture, SpikeEngine, SpikeRecord, StreamObserver,
    WaveformEngine, WaveformLayout, WaveformState,
};

fn pattern(timestamp: i32, channel: usize) -> u16 {
    timestamp as u16 ^ channel as u16
}

fn super_frames(first_timestamps: &[i32]) -> Vec<u8> {
    let layout = WaveformLayout::default();
    first_timestamps
        .iter()
        .flat_map(|&ts| build_super_frame(&layout, ts, pattern))
        .collect()
}

fn feed_in_pieces(engine: &mut WaveformEngine, bytes: &[u8], pieces: usize) {
    let step = bytes.len().div_ceil(pieces);
    for chunk in bytes.chunks(step) {
        engine.push(chunk).unwrap();
    }
}

/// Splitting the stream at 1, 2 or 4 boundaries gives the same counters.
#[test]
fn test_chunk_boundaries_do_not_matter() {
    let bytes = super_frames(&[0, 1280, 2560]);

    let mut states = Vec::new();
    for pieces in [1, 2, 4] {
        let mut engine = WaveformEngine::with_policy(FramingPolicy::Strict);
        feed_in_pieces(&mut engine, &bytes, pieces);
        states.push(*engine.state());
    }

    assert!(states.iter().all(|s| *s == states[0]), "{:?}", states);
    assert_eq!(states[0].total_blocks_processed, 30);
    assert_eq!(states[0].latest_timestamp, Some(2560));
}

/// Reference framing is split-independent while only one super-frame can
/// be released: every split crosses the threshold exactly once, on the
/// final push.
#[test]
fn test_chunk_boundaries_do_not_matter_reference() {
    let mut bytes = super_frames(&[640]);
    bytes.push(0);

    let mut states = Vec::new();
    for pieces in [1, 2, 4] {
        let mut engine = WaveformEngine::with_policy(FramingPolicy::Reference);
        feed_in_pieces(&mut engine, &bytes, pieces);
        states.push(*engine.state());
    }

    assert!(states.iter().all(|s| *s == states[0]), "{:?}", states);
    assert_eq!(states[0].total_blocks_processed, 10);
    assert_eq!(states[0].latest_timestamp, Some(640));
    assert_eq!(states[0].magic_mismatches, 0);
}

/// A super-frame split into single bytes still decodes once, in order.
#[test]
fn test_byte_at_a_time_strict() {
    let bytes = super_frames(&[4242]);
    let mut engine = WaveformEngine::with_policy(FramingPolicy::Strict);

    for b in &bytes {
        engine.push(std::slice::from_ref(b)).unwrap();
    }

    assert_eq!(engine.state().total_blocks_processed, 10);
    assert_eq!(engine.state().latest_timestamp, Some(4242));
    assert_eq!(engine.buffered(), 0);
}

#[test]
fn test_exact_super_frame_does_not_trigger_reference() {
    let mut engine = WaveformEngine::with_policy(FramingPolicy::Reference);

    assert_eq!(engine.push(&super_frames(&[1])).unwrap(), 0);
    assert_eq!(engine.state().total_blocks_processed, 0);

    // One more byte crosses the threshold.
    assert_eq!(engine.push(&[0]).unwrap(), 1);
    assert_eq!(engine.state().total_blocks_processed, 10);
    assert_eq!(engine.buffered(), 1);
}

#[test]
fn test_two_super_frames_plus_100_bytes_reference() {
    let mut engine = WaveformEngine::with_policy(FramingPolicy::Reference);
    let mut bytes = super_frames(&[0, 1280]);
    bytes.extend(vec![0xAB; 100]);

    assert_eq!(engine.push(&bytes).unwrap(), 1);
    assert_eq!(engine.state().total_blocks_processed, 10);
    assert_eq!(engine.state().latest_timestamp, Some(0));
    assert_eq!(engine.buffered(), WAVEFORM_BYTES_PER_SUPER_FRAME + 100);
}

#[test]
fn test_two_super_frames_plus_100_bytes_strict() {
    let mut engine = WaveformEngine::with_policy(FramingPolicy::Strict);
    let mut bytes = super_frames(&[0, 1280]);
    bytes.extend(vec![0xAB; 100]);

    assert_eq!(engine.push(&bytes).unwrap(), 2);
    assert_eq!(engine.state().total_blocks_processed, 20);
    assert_eq!(engine.state().latest_timestamp, Some(1280));
    assert_eq!(engine.buffered(), 100);
}

#[derive(Default)]
struct Recorder {
    mismatches: Mutex<Vec<MagicMismatch>>,
    blocks: Mutex<Vec<WaveformBlock>>,
    spikes: Mutex<Vec<SpikeRecord>>,
    updates: Mutex<Vec<WaveformState>>,
}

impl StreamObserver for Recorder {
    fn waveform_updated(&self, state: &WaveformState) {
        self.updates.lock().unwrap().push(*state);
    }

    fn magic_mismatch(&self, mismatch: &MagicMismatch) {
        self.mismatches.lock().unwrap().push(*mismatch);
    }

    fn waveform_blocks(&self, blocks: &[WaveformBlock]) {
        self.blocks.lock().unwrap().extend_from_slice(blocks);
    }

    fn spike_records(&self, records: &[SpikeRecord]) {
        self.spikes.lock().unwrap().extend_from_slice(records);
    }
}

/// A corrupted block consumes exactly one block; its neighbours decode.
#[test]
fn test_corrupted_block_keeps_alignment() {
    let layout = WaveformLayout::default();
    let recorder = Arc::new(Recorder::default());
    let mut engine = WaveformEngine::new(
        layout,
        FramingPolicy::Strict,
        SampleCapture::Keep,
        recorder.clone(),
    );

    let mut bytes = super_frames(&[0, 1280]);
    bytes[3 * WAVEFORM_BYTES_PER_BLOCK..3 * WAVEFORM_BYTES_PER_BLOCK + 4]
        .copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
    engine.push(&bytes).unwrap();

    assert_eq!(engine.state().total_blocks_processed, 20);
    assert_eq!(engine.state().magic_mismatches, 1);
    assert_eq!(engine.state().latest_timestamp, Some(1280));

    let mismatches = recorder.mismatches.lock().unwrap();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].stream, StreamKind::Waveform);
    assert_eq!(mismatches[0].index, 3);
    assert_eq!(mismatches[0].found, 0xDEADBEEF);

    let blocks = recorder.blocks.lock().unwrap();
    assert_eq!(blocks.len(), 20);
    assert!(!blocks[3].is_valid());
    // Block 4 still starts 4 * 128 frames after the super-frame start.
    assert_eq!(blocks[4].frames[0].timestamp, 512);
    assert_eq!(blocks[11].frames[0].timestamp, 1280 + 128);

    assert_eq!(recorder.updates.lock().unwrap().len(), 2);
}

#[test]
fn test_sample_values_survive_decode() {
    let layout = WaveformLayout::default();
    let recorder = Arc::new(Recorder::default());
    let mut engine = WaveformEngine::new(
        layout,
        FramingPolicy::Strict,
        SampleCapture::Keep,
        recorder.clone(),
    );

    engine
        .push(&build_super_frame(&layout, 100, |_, ch| 32768 + ch as u16 * 10))
        .unwrap();

    let blocks = recorder.blocks.lock().unwrap();
    let frame = &blocks[0].frames[0];
    assert_eq!(frame.timestamp, 100);
    assert_eq!(frame.samples.len(), 16);
    assert_eq!(amplifier_microvolts(frame.samples[0]), 0.0);
    assert!((amplifier_microvolts(frame.samples[2]) - 3.9).abs() < 1e-9);
    assert_eq!(timestamp_seconds(frame.timestamp, 20_000.0), 0.005);
}

/// The literal 14-byte record from the controller documentation.
#[test]
fn test_single_spike_record_bytes() {
    let mut bytes = Vec::new();
    bytes.extend(SPIKE_MAGIC.to_le_bytes());
    bytes.extend(b"A-001");
    bytes.extend([0x01, 0x00, 0x00, 0x00]);
    bytes.push(0x02);
    assert_eq!(bytes.len(), 14);

    let recorder = Arc::new(Recorder::default());
    let mut engine = SpikeEngine::new(FramingPolicy::Reference, recorder.clone());
    engine.push(&bytes);

    assert_eq!(engine.state().total_spikes_processed, 1);
    let spikes = recorder.spikes.lock().unwrap();
    assert_eq!(spikes[0].name(), "A-001");
    assert_eq!(spikes[0].timestamp, 1);
    assert_eq!(spikes[0].id, 2);
}

#[test]
fn test_spike_k_records() {
    for k in [0u32, 1, 7, 100] {
        let bytes: Vec<u8> = (0..k)
            .flat_map(|i| SpikeRecord::new(*b"B-015", i, 1).encode())
            .collect();
        let mut engine = SpikeEngine::with_policy(FramingPolicy::Reference);
        engine.push(&bytes);
        assert_eq!(engine.state().total_spikes_processed, u64::from(k));
    }
}

#[test]
fn test_31_spike_bytes_reference_discards() {
    let bytes: Vec<u8> = (0..3)
        .flat_map(|i| SpikeRecord::new(*b"A-001", i, 1).encode())
        .collect();
    let mut engine = SpikeEngine::with_policy(FramingPolicy::Reference);

    engine.push(&bytes[..31]);
    assert_eq!(engine.state().total_spikes_processed, 2);
    assert_eq!(engine.state().bytes_discarded, 3);

    // The rest of the third record arrives but its head is gone.
    engine.push(&bytes[31..]);
    assert_eq!(engine.state().total_spikes_processed, 2);
}

#[test]
fn test_31_spike_bytes_strict_retains() {
    let bytes: Vec<u8> = (0..3)
        .flat_map(|i| SpikeRecord::new(*b"A-001", i, 1).encode())
        .collect();
    let mut engine = SpikeEngine::with_policy(FramingPolicy::Strict);

    engine.push(&bytes[..31]);
    assert_eq!(engine.state().total_spikes_processed, 2);
    assert_eq!(engine.buffered(), 3);

    engine.push(&bytes[31..]);
    assert_eq!(engine.state().total_spikes_processed, 3);
    assert_eq!(engine.state().bytes_discarded, 0);
}

/// Minimal controller: a command port that answers `get` queries and two
/// data ports that send canned bytes and close.
struct FakeController {
    command: Endpoint,
    waveform: Endpoint,
    spike: Endpoint,
}

async fn fake_controller(waveform_bytes: Vec<u8>, spike_bytes: Vec<u8>) -> FakeController {
    async fn bind() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, Endpoint::new(addr.ip().to_string(), addr.port()))
    }

    let (command_listener, command) = bind().await;
    let (waveform_listener, waveform) = bind().await;
    let (spike_listener, spike) = bind().await;

    tokio::spawn(async move {
        let (mut socket, _) = command_listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            let text = String::from_utf8_lossy(&buf[..n]).to_lowercase();
            let reply: &[u8] = if text.contains("get runmode") {
                b"Return: RunMode Stop"
            } else if text.contains("get sampleratehertz") {
                b"Return: SampleRateHertz 30000"
            } else if text.contains("get type") {
                b"Return: Type ControllerStimRecord"
            } else {
                continue;
            };
            if socket.write_all(reply).await.is_err() {
                return;
            }
        }
    });
    for (listener, bytes) in [(waveform_listener, waveform_bytes), (spike_listener, spike_bytes)] {
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Odd-sized writes so reads land mid-unit.
            for chunk in bytes.chunks(997) {
                socket.write_all(chunk).await.unwrap();
            }
        });
    }

    FakeController {
        command,
        waveform,
        spike,
    }
}

#[tokio::test]
async fn test_client_end_to_end() {
    let spike_bytes: Vec<u8> = (0..40)
        .flat_map(|i| SpikeRecord::new(*b"A-003", i * 30, 1).encode())
        .collect();
    let controller = fake_controller(super_frames(&[0, 1280, 2560]), spike_bytes).await;

    let recorder = Arc::new(Recorder::default());
    let client = Client::builder()
        .command(controller.command)
        .waveform(controller.waveform)
        .spike(controller.spike)
        .connect_timeout(Duration::from_secs(5))
        .read_buffer_size(4096)
        .strict_framing()
        .observer(recorder.clone())
        .connect()
        .await
        .unwrap();

    assert_eq!(client.run_mode().await.unwrap(), RunMode::Stop);
    assert_eq!(client.sample_rate().await.unwrap(), 30000.0);
    let controller_type = client.controller_type().await.unwrap();
    assert_eq!(controller_type.file_suffix(), "rhs");

    let stats = client.stats();
    client.wait_for_shutdown().await.unwrap();

    assert_eq!(stats.total_blocks_processed(), 30);
    assert_eq!(stats.latest_timestamp(), Some(2560));
    assert_eq!(stats.total_spikes_processed(), 40);
    assert_eq!(stats.spike().bytes_discarded, 0);
    assert_eq!(recorder.spikes.lock().unwrap().len(), 40);
    assert_eq!(recorder.updates.lock().unwrap().len(), 3);
}
