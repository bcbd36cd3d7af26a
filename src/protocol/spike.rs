//! Spike record decoder.
//!
//! Spike records are 14 bytes each and are decoded record by record. A run
//! of bytes yields `len / 14` records; what happens to a trailing partial
//! record is up to the accumulator, not the decoder.

use bytes::{Buf, BufMut};

use super::wire_format::{
    MagicMismatch, StreamKind, NATIVE_NAME_SIZE, SPIKE_MAGIC, SPIKE_RECORD_SIZE,
};

/// One decoded spike event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeRecord {
    /// Magic number as read (may be wrong).
    pub magic: u32,
    /// Fixed-width native channel name, e.g. `A-001`. Not validated.
    pub native_name: [u8; NATIVE_NAME_SIZE],
    /// Sample-clock timestamp of the spike.
    pub timestamp: u32,
    /// Spike classification id.
    pub id: u8,
}

impl SpikeRecord {
    /// Create a record with the expected magic number.
    pub fn new(native_name: [u8; NATIVE_NAME_SIZE], timestamp: u32, id: u8) -> Self {
        Self {
            magic: SPIKE_MAGIC,
            native_name,
            timestamp,
            id,
        }
    }

    /// Decode one record from the front of `buf`.
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use rhx_tcp_client::protocol::SpikeRecord;
    ///
    /// let bytes = [0x0f, 0x71, 0xe2, 0x3a, b'A', b'-', b'0', b'0', b'1', 1, 0, 0, 0, 2];
    /// let record = SpikeRecord::decode(&bytes).unwrap();
    /// assert!(record.is_valid());
    /// assert_eq!(record.name(), "A-001");
    /// assert_eq!(record.timestamp, 1);
    /// assert_eq!(record.id, 2);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < SPIKE_RECORD_SIZE {
            return None;
        }
        let mut cursor = &buf[..SPIKE_RECORD_SIZE];
        let magic = cursor.get_u32_le();
        let mut native_name = [0u8; NATIVE_NAME_SIZE];
        cursor.copy_to_slice(&mut native_name);
        let timestamp = cursor.get_u32_le();
        let id = cursor.get_u8();
        Some(Self {
            magic,
            native_name,
            timestamp,
            id,
        })
    }

    /// Encode to wire bytes (Little Endian).
    pub fn encode(&self) -> [u8; SPIKE_RECORD_SIZE] {
        let mut buf = [0u8; SPIKE_RECORD_SIZE];
        let mut out = &mut buf[..];
        out.put_u32_le(self.magic);
        out.put_slice(&self.native_name);
        out.put_u32_le(self.timestamp);
        out.put_u8(self.id);
        buf
    }

    /// Whether the record carried the expected magic number.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == SPIKE_MAGIC
    }

    /// Native channel name as text (lossy, trailing NULs trimmed).
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.native_name)
            .trim_end_matches('\0')
            .to_string()
    }
}

/// Result of decoding a run of spike records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedSpikes {
    /// Every complete record in the run, in arrival order.
    pub records: Vec<SpikeRecord>,
    /// Records whose magic number did not match.
    pub mismatches: Vec<MagicMismatch>,
    /// Number of bytes consumed (`records.len() * 14`).
    pub consumed: usize,
}

/// Number of complete records in `len` bytes.
#[inline]
pub fn complete_records(len: usize) -> usize {
    len / SPIKE_RECORD_SIZE
}

/// Decode every complete record in `buf`.
///
/// Trailing bytes that do not form a whole record are left untouched and
/// reported through `consumed`. Magic mismatches are logged and returned,
/// never raised.
pub fn decode_spike_run(buf: &[u8]) -> DecodedSpikes {
    let count = complete_records(buf.len());
    let mut decoded = DecodedSpikes {
        records: Vec::with_capacity(count),
        mismatches: Vec::new(),
        consumed: count * SPIKE_RECORD_SIZE,
    };

    for (index, chunk) in buf.chunks_exact(SPIKE_RECORD_SIZE).enumerate() {
        let Some(record) = SpikeRecord::decode(chunk) else {
            break;
        };
        if !record.is_valid() {
            tracing::warn!(
                "Spike magic number mismatch in record {}: read {:#010x}",
                index,
                record.magic
            );
            decoded.mismatches.push(MagicMismatch {
                stream: StreamKind::Spike,
                index,
                found: record.magic,
            });
        }
        decoded.records.push(record);
    }

    decoded
}
