//! Journal file header and slot encoding.
//!
//! ```text
//! journal.dat
//! ┌─────────────────────┬────────┬────────┬─────┬─────────────────────┐
//! │ header (64 bytes)   │ slot 0 │ slot 1 │ ... │ slot capacity - 1   │
//! └─────────────────────┴────────┴────────┴─────┴─────────────────────┘
//!
//! header: "JELM" | major u16 | minor u16 | tag u8 | reserved (3)
//!         | slot_size u32 | capacity u64 | reserved to 64
//!
//! slot:   sequence u64 | transaction id u64 | checksum u32 | tag u8
//!         | flags u8 | reserved u16 | payload_len u32 | reserved u32
//!         | payload | stale bytes up to slot_size
//! ```
//!
//! The slot checksum covers the 32-byte slot header with the checksum field
//! skipped, followed by the payload. It is always computed with the
//! algorithm recorded in the file header.

use crate::checksum::ChecksumAlgorithm;
use crate::error::{CoreError, CoreResult};
use crate::types::{SequenceNumber, TransactionId};

/// Magic bytes at the start of the journal file.
pub const JOURNAL_MAGIC: [u8; 4] = *b"JELM";

/// Journal file format version (major, minor).
pub const JOURNAL_VERSION: (u16, u16) = (1, 0);

/// Size of the journal file header.
pub const JOURNAL_HEADER_SIZE: usize = 64;

/// Size of the fixed header at the start of every slot.
pub const SLOT_HEADER_SIZE: usize = 32;

const CHECKSUM_RANGE: std::ops::Range<usize> = 16..20;
const FLAG_COMMITTED: u8 = 0x01;

/// Layout parameters recorded in the journal file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    /// Checksum algorithm used by every slot.
    pub algorithm: ChecksumAlgorithm,
    /// Size in bytes of one slot.
    pub slot_size: u32,
    /// Number of slots.
    pub capacity: u64,
}

impl JournalHeader {
    /// Encodes the header into its 64-byte form.
    #[must_use]
    pub fn encode(&self) -> [u8; JOURNAL_HEADER_SIZE] {
        let mut buf = [0u8; JOURNAL_HEADER_SIZE];
        buf[0..4].copy_from_slice(&JOURNAL_MAGIC);
        buf[4..6].copy_from_slice(&JOURNAL_VERSION.0.to_le_bytes());
        buf[6..8].copy_from_slice(&JOURNAL_VERSION.1.to_le_bytes());
        buf[8] = self.algorithm.tag();
        buf[12..16].copy_from_slice(&self.slot_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.capacity.to_le_bytes());
        buf
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] on a bad magic, an unsupported
    /// major version, an unknown checksum tag or impossible dimensions.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < JOURNAL_HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "journal header truncated: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != JOURNAL_MAGIC {
            return Err(CoreError::invalid_format("bad journal magic"));
        }
        let major = u16::from_le_bytes([bytes[4], bytes[5]]);
        if major != JOURNAL_VERSION.0 {
            return Err(CoreError::invalid_format(format!(
                "unsupported journal version {major}"
            )));
        }
        let algorithm = ChecksumAlgorithm::from_tag(bytes[8]).ok_or_else(|| {
            CoreError::invalid_format(format!("unknown checksum tag {}", bytes[8]))
        })?;
        let slot_size = u32::from_le_bytes(read_array(&bytes[12..16]));
        let capacity = u64::from_le_bytes(read_array(&bytes[16..24]));
        if (slot_size as usize) <= SLOT_HEADER_SIZE || capacity == 0 {
            return Err(CoreError::invalid_format(format!(
                "invalid journal dimensions: slot size {slot_size}, capacity {capacity}"
            )));
        }
        Ok(Self {
            algorithm,
            slot_size,
            capacity,
        })
    }

    /// Total file size implied by the header.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        JOURNAL_HEADER_SIZE as u64 + u64::from(self.slot_size) * self.capacity
    }

    /// Largest payload one slot can hold.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.slot_size as usize - SLOT_HEADER_SIZE
    }

    /// Byte offset of the slot holding `sequence`.
    #[must_use]
    pub fn slot_offset(&self, sequence: SequenceNumber) -> u64 {
        JOURNAL_HEADER_SIZE as u64 + sequence.slot(self.capacity) * u64::from(self.slot_size)
    }
}

/// A decoded journal slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Sequence the entry was written under.
    pub sequence: SequenceNumber,
    /// Transaction that produced the entry.
    pub transaction_id: TransactionId,
    /// Stored checksum.
    pub checksum: u32,
    /// Algorithm that produced the checksum.
    pub algorithm: ChecksumAlgorithm,
    /// False for entries written in place of a failed or abandoned append.
    pub committed: bool,
    /// Encoded mutation set.
    pub payload: Vec<u8>,
}

impl JournalEntry {
    /// Builds a committed entry, computing its checksum.
    #[must_use]
    pub fn new(
        sequence: SequenceNumber,
        transaction_id: TransactionId,
        algorithm: ChecksumAlgorithm,
        payload: Vec<u8>,
    ) -> Self {
        Self::build(sequence, transaction_id, algorithm, true, payload)
    }

    /// Builds an aborted entry with an empty payload.
    ///
    /// Aborted entries fill a reserved sequence so the trailing counter can
    /// move past it; they are never applied.
    #[must_use]
    pub fn aborted(
        sequence: SequenceNumber,
        transaction_id: TransactionId,
        algorithm: ChecksumAlgorithm,
    ) -> Self {
        Self::build(sequence, transaction_id, algorithm, false, Vec::new())
    }

    fn build(
        sequence: SequenceNumber,
        transaction_id: TransactionId,
        algorithm: ChecksumAlgorithm,
        committed: bool,
        payload: Vec<u8>,
    ) -> Self {
        let mut entry = Self {
            sequence,
            transaction_id,
            checksum: 0,
            algorithm,
            committed,
            payload,
        };
        let header = entry.encode_header();
        entry.checksum = slot_checksum(algorithm, &header, &entry.payload);
        entry
    }

    /// Encoded size: slot header plus payload.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        SLOT_HEADER_SIZE + self.payload.len()
    }

    fn encode_header(&self) -> [u8; SLOT_HEADER_SIZE] {
        let mut buf = [0u8; SLOT_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf[8..16].copy_from_slice(&self.transaction_id.as_u64().to_le_bytes());
        buf[CHECKSUM_RANGE].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20] = self.algorithm.tag();
        buf[21] = if self.committed { FLAG_COMMITTED } else { 0 };
        buf[24..28].copy_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf
    }

    /// Serializes the entry. The result is at most one slot long when the
    /// payload respects the slot limit.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.encode_header());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes a slot and verifies its checksum with `algorithm`.
    ///
    /// `sequence` is the sequence the caller asked for; it is only used in
    /// error reports. Callers compare it with the decoded sequence
    /// themselves.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptEntry`] if the slot is truncated, its
    /// payload length is impossible, its checksum does not match or its
    /// tag disagrees with `algorithm`.
    pub fn decode(slot: &[u8], algorithm: ChecksumAlgorithm, sequence: u64) -> CoreResult<Self> {
        if slot.len() < SLOT_HEADER_SIZE {
            return Err(CoreError::corrupt_entry(sequence, "slot shorter than its header"));
        }
        let header: [u8; SLOT_HEADER_SIZE] = read_array(&slot[..SLOT_HEADER_SIZE]);
        let payload_len = u32::from_le_bytes(read_array(&header[24..28])) as usize;
        let available = slot.len() - SLOT_HEADER_SIZE;
        if payload_len > available {
            return Err(CoreError::corrupt_entry(
                sequence,
                format!("payload length {payload_len} exceeds slot capacity {available}"),
            ));
        }
        let payload = &slot[SLOT_HEADER_SIZE..SLOT_HEADER_SIZE + payload_len];

        let stored = u32::from_le_bytes(read_array(&header[CHECKSUM_RANGE]));
        let computed = slot_checksum(algorithm, &header, payload);
        if stored != computed {
            return Err(CoreError::corrupt_entry(
                sequence,
                format!("{algorithm} mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }
        if header[20] != algorithm.tag() {
            return Err(CoreError::corrupt_entry(
                sequence,
                format!("slot checksum tag {} does not match journal tag {}", header[20], algorithm.tag()),
            ));
        }

        Ok(Self {
            sequence: SequenceNumber::new(u64::from_le_bytes(read_array(&header[0..8]))),
            transaction_id: TransactionId::new(u64::from_le_bytes(read_array(&header[8..16]))),
            checksum: stored,
            algorithm,
            committed: header[21] & FLAG_COMMITTED != 0,
            payload: payload.to_vec(),
        })
    }
}

fn slot_checksum(algorithm: ChecksumAlgorithm, header: &[u8; SLOT_HEADER_SIZE], payload: &[u8]) -> u32 {
    algorithm.checksum_parts(&[
        &header[..CHECKSUM_RANGE.start],
        &header[CHECKSUM_RANGE.end..],
        payload,
    ])
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
