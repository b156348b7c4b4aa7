//! DataStore log records.
//!
//! ```text
//! ┌────────┬──────┬─────────┬─────────────┬───────┐
//! │ "EUDS" │ type │ len u32 │ payload     │ crc32 │
//! └────────┴──────┴─────────┴─────────────┴───────┘
//!
//! put:       sequence u64 | key_len u32 | key | value
//! delete:    sequence u64 | key
//! watermark: sequence u64
//! ```
//!
//! The CRC-32 covers everything before it, magic included.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;

/// Magic bytes at the start of every DataStore record.
pub const RECORD_MAGIC: [u8; 4] = *b"EUDS";

/// Bytes before the payload: magic, type and length.
pub const RECORD_HEADER_SIZE: usize = 9;

/// Bytes after the payload.
pub const RECORD_TRAILER_SIZE: usize = 4;

/// Type of a DataStore record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Key written.
    Put = 1,
    /// Key removed.
    Delete = 2,
    /// Journal entry fully applied.
    Watermark = 3,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Watermark),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A record in the DataStore log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRecord {
    /// Key set to value by the entry at `sequence`.
    Put {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
        /// Sequence of the journal entry that wrote it.
        sequence: SequenceNumber,
    },
    /// Key removed by the entry at `sequence`.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
        /// Sequence of the journal entry that removed it.
        sequence: SequenceNumber,
    },
    /// Every entry up to `sequence` has been applied.
    Watermark {
        /// Highest applied sequence.
        sequence: SequenceNumber,
    },
}

/// Outcome of decoding one record from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete, verified record and its encoded length.
    Record(DataRecord, usize),
    /// The buffer ends inside a record.
    Truncated,
}

impl DataRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Put { .. } => RecordType::Put,
            Self::Delete { .. } => RecordType::Delete,
            Self::Watermark { .. } => RecordType::Watermark,
        }
    }

    /// Returns the sequence carried by the record.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        match self {
            Self::Put { sequence, .. }
            | Self::Delete { sequence, .. }
            | Self::Watermark { sequence } => *sequence,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.sequence().as_u64().to_le_bytes());
        match self {
            Self::Put { key, value, .. } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(value);
            }
            Self::Delete { key, .. } => buf.extend_from_slice(key),
            Self::Watermark { .. } => {}
        }
        buf
    }

    /// Appends the framed record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let payload = self.encode_payload();
        let start = out.len();
        out.extend_from_slice(&RECORD_MAGIC);
        out.push(self.record_type().as_byte());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = crc32fast::hash(&out[start..]);
        out.extend_from_slice(&crc.to_le_bytes());
    }

    /// Encodes the framed record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Decodes the record at the front of `buf`.
    ///
    /// `offset` is the position of `buf` in the log and only appears in
    /// error messages.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DataStoreCorruption`] on a bad magic, a CRC
    /// mismatch, an unknown type or a malformed payload.
    pub fn decode(buf: &[u8], offset: u64) -> CoreResult<Decoded> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Ok(Decoded::Truncated);
        }
        if buf[0..4] != RECORD_MAGIC {
            return Err(CoreError::datastore_corruption(format!(
                "bad record magic at offset {offset}"
            )));
        }
        let len = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
        let total = RECORD_HEADER_SIZE + len + RECORD_TRAILER_SIZE;
        if buf.len() < total {
            return Ok(Decoded::Truncated);
        }

        let body_end = RECORD_HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            buf[body_end],
            buf[body_end + 1],
            buf[body_end + 2],
            buf[body_end + 3],
        ]);
        let computed = crc32fast::hash(&buf[..body_end]);
        if stored != computed {
            return Err(CoreError::datastore_corruption(format!(
                "record CRC mismatch at offset {offset}: stored {stored:#010x}, computed {computed:#010x}"
            )));
        }

        let record_type = RecordType::from_byte(buf[4]).ok_or_else(|| {
            CoreError::datastore_corruption(format!(
                "unknown record type {} at offset {offset}",
                buf[4]
            ))
        })?;
        let record = Self::decode_payload(record_type, &buf[RECORD_HEADER_SIZE..body_end])
            .ok_or_else(|| {
                CoreError::datastore_corruption(format!("malformed record payload at offset {offset}"))
            })?;
        Ok(Decoded::Record(record, total))
    }

    fn decode_payload(record_type: RecordType, payload: &[u8]) -> Option<Self> {
        let sequence = SequenceNumber::new(u64::from_le_bytes(payload.get(0..8)?.try_into().ok()?));
        let rest = &payload[8..];
        match record_type {
            RecordType::Put => {
                let key_len = u32::from_le_bytes(rest.get(0..4)?.try_into().ok()?) as usize;
                let key = rest.get(4..4 + key_len)?.to_vec();
                let value = rest[4 + key_len..].to_vec();
                Some(Self::Put {
                    key,
                    value,
                    sequence,
                })
            }
            RecordType::Delete => Some(Self::Delete {
                key: rest.to_vec(),
                sequence,
            }),
            RecordType::Watermark => rest.is_empty().then_some(Self::Watermark { sequence }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put() -> DataRecord {
        DataRecord::Put {
            key: b"key".to_vec(),
            value: b"value".to_vec(),
            sequence: SequenceNumber::new(7),
        }
    }

    #[test]
    fn decode_each_type() {
        let records = [
            put(),
            DataRecord::Delete {
                key: b"gone".to_vec(),
                sequence: SequenceNumber::new(8),
            },
            DataRecord::Watermark {
                sequence: SequenceNumber::new(8),
            },
        ];
        for record in records {
            let bytes = record.encode();
            assert_eq!(
                DataRecord::decode(&bytes, 0).unwrap(),
                Decoded::Record(record, bytes.len())
            );
        }
    }

    #[test]
    fn empty_key_and_value() {
        let record = DataRecord::Put {
            key: Vec::new(),
            value: Vec::new(),
            sequence: SequenceNumber::new(1),
        };
        let bytes = record.encode();
        assert!(matches!(
            DataRecord::decode(&bytes, 0).unwrap(),
            Decoded::Record(r, _) if r == record
        ));
    }

    #[test]
    fn partial_record_is_truncated() {
        let bytes = put().encode();
        for cut in 0..bytes.len() {
            assert_eq!(DataRecord::decode(&bytes[..cut], 0).unwrap(), Decoded::Truncated);
        }
    }

    #[test]
    fn crc_mismatch_is_corruption() {
        let mut bytes = put().encode();
        bytes[12] ^= 0x40;
        assert!(matches!(
            DataRecord::decode(&bytes, 128),
            Err(CoreError::DataStoreCorruption { .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = put().encode();
        bytes[0] = b'X';
        assert!(DataRecord::decode(&bytes, 0).is_err());
    }

    #[test]
    fn decodes_first_of_many() {
        let mut buf = Vec::new();
        put().encode_into(&mut buf);
        let first_len = buf.len();
        DataRecord::Watermark {
            sequence: SequenceNumber::new(7),
        }
        .encode_into(&mut buf);

        match DataRecord::decode(&buf, 0).unwrap() {
            Decoded::Record(record, len) => {
                assert_eq!(record, put());
                assert_eq!(len, first_len);
            }
            Decoded::Truncated => panic!("expected record"),
        }
    }
}
