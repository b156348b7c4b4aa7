//! Checksum algorithms for journal slots.
//!
//! The algorithm is chosen when a journal file is created and its tag is
//! written into the file header and into every slot, so readers never need
//! external configuration to validate existing data.

use std::fmt;
use std::str::FromStr;

/// Largest prime below 2^16, the Adler-32 modulus.
const ADLER_MOD: u32 = 65_521;

/// Bytes that can be summed before `b` may overflow a u32.
const ADLER_NMAX: usize = 5_552;

/// Checksum algorithm used to protect journal entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ChecksumAlgorithm {
    /// Adler-32 rolling checksum.
    #[default]
    Adler32 = 1,
    /// CRC-32 (IEEE polynomial).
    Crc32 = 2,
    /// CRC-32C (Castagnoli polynomial).
    Crc32c = 3,
}

impl ChecksumAlgorithm {
    /// All supported algorithms.
    pub const ALL: [Self; 3] = [Self::Adler32, Self::Crc32, Self::Crc32c];

    /// Converts an on-disk tag to an algorithm.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Adler32),
            2 => Some(Self::Crc32),
            3 => Some(Self::Crc32c),
            _ => None,
        }
    }

    /// Returns the on-disk tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Adler32 => "adler32",
            Self::Crc32 => "crc32",
            Self::Crc32c => "crc32c",
        }
    }

    /// Checksums a single buffer.
    #[must_use]
    pub fn checksum(self, data: &[u8]) -> u32 {
        self.checksum_parts(&[data])
    }

    /// Checksums the concatenation of `parts` without copying them together.
    #[must_use]
    pub fn checksum_parts(self, parts: &[&[u8]]) -> u32 {
        let mut hasher = Hasher::new(self);
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize()
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adler32" | "adler-32" => Ok(Self::Adler32),
            "crc32" | "crc-32" => Ok(Self::Crc32),
            "crc32c" | "crc-32c" => Ok(Self::Crc32c),
            other => Err(format!("unknown checksum algorithm: {other}")),
        }
    }
}

/// Incremental checksum state.
enum Hasher {
    Adler32 { a: u32, b: u32 },
    Crc32(crc32fast::Hasher),
    Crc32c(u32),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Adler32 => Self::Adler32 { a: 1, b: 0 },
            ChecksumAlgorithm::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => Self::Crc32c(0),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Adler32 { a, b } => {
                for chunk in data.chunks(ADLER_NMAX) {
                    for &byte in chunk {
                        *a += u32::from(byte);
                        *b += *a;
                    }
                    *a %= ADLER_MOD;
                    *b %= ADLER_MOD;
                }
            }
            Self::Crc32(hasher) => hasher.update(data),
            Self::Crc32c(crc) => *crc = crc32c::crc32c_append(*crc, data),
        }
    }

    fn finalize(self) -> u32 {
        match self {
            Self::Adler32 { a, b } => (b << 16) | a,
            Self::Crc32(hasher) => hasher.finalize(),
            Self::Crc32c(crc) => crc,
        }
    }
}
