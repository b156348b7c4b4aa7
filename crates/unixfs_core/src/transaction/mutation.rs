//! Mutations and the journal payload codec.
//!
//! ```text
//! payload:  version u8 | count u32 | mutation*
//! put:      kind 1 | key_len u32 | key | value_len u32 | value
//! delete:   kind 2 | key_len u32 | key
//! ```

use crate::error::{CoreError, CoreResult};

/// Version byte at the start of every encoded mutation set.
pub const MUTATION_FORMAT_VERSION: u8 = 1;

const KIND_PUT: u8 = 1;
const KIND_DELETE: u8 = 2;

/// A single staged change to the DataStore.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mutation {
    /// Set `key` to `value`.
    Put {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
}

impl Mutation {
    /// Creates a put mutation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a delete mutation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// The key this mutation touches.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Put { key, value } => 1 + 4 + key.len() + 4 + value.len(),
            Self::Delete { key } => 1 + 4 + key.len(),
        }
    }
}

/// Serializes a mutation list into a journal payload.
#[must_use]
pub fn encode_mutations(mutations: &[Mutation]) -> Vec<u8> {
    let size = 5 + mutations.iter().map(Mutation::encoded_len).sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    buf.push(MUTATION_FORMAT_VERSION);
    buf.extend_from_slice(&(mutations.len() as u32).to_le_bytes());
    for mutation in mutations {
        match mutation {
            Mutation::Put { key, value } => {
                buf.push(KIND_PUT);
                put_bytes(&mut buf, key);
                put_bytes(&mut buf, value);
            }
            Mutation::Delete { key } => {
                buf.push(KIND_DELETE);
                put_bytes(&mut buf, key);
            }
        }
    }
    buf
}

/// Parses a journal payload back into its mutation list.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPayload`] if the payload is truncated, has
/// trailing bytes, an unknown version or an unknown mutation kind.
pub fn decode_mutations(payload: &[u8]) -> CoreResult<Vec<Mutation>> {
    let mut reader = Reader { buf: payload, pos: 0 };
    let version = reader.u8()?;
    if version != MUTATION_FORMAT_VERSION {
        return Err(CoreError::invalid_payload(format!(
            "unsupported mutation format version {version}"
        )));
    }
    let count = reader.u32()? as usize;
    // Each mutation takes at least five bytes; reject absurd counts early.
    if count > payload.len() / 5 {
        return Err(CoreError::invalid_payload(format!(
            "mutation count {count} exceeds payload of {} bytes",
            payload.len()
        )));
    }

    let mut mutations = Vec::with_capacity(count);
    for _ in 0..count {
        let mutation = match reader.u8()? {
            KIND_PUT => {
                let key = reader.bytes()?;
                let value = reader.bytes()?;
                Mutation::Put { key, value }
            }
            KIND_DELETE => Mutation::Delete {
                key: reader.bytes()?,
            },
            kind => {
                return Err(CoreError::invalid_payload(format!(
                    "unknown mutation kind {kind}"
                )))
            }
        };
        mutations.push(mutation);
    }

    if reader.pos != payload.len() {
        return Err(CoreError::invalid_payload(format!(
            "{} trailing bytes after {count} mutations",
            payload.len() - reader.pos
        )));
    }
    Ok(mutations)
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> CoreResult<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                CoreError::invalid_payload(format!(
                    "truncated at offset {}: need {len} bytes, have {}",
                    self.pos,
                    self.buf.len() - self.pos
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_in_staged_order() {
        let mutations = vec![
            Mutation::put("a", "1"),
            Mutation::delete("b"),
            Mutation::put("a", "2"),
        ];
        let decoded = decode_mutations(&encode_mutations(&mutations)).unwrap();
        assert_eq!(decoded, mutations);
    }

    #[test]
    fn empty_set() {
        let payload = encode_mutations(&[]);
        assert_eq!(payload.len(), 5);
        assert!(decode_mutations(&payload).unwrap().is_empty());
    }

    #[test]
    fn rejects_truncation() {
        let payload = encode_mutations(&[Mutation::put("key", "value")]);
        for cut in 0..payload.len() {
            assert!(matches!(
                decode_mutations(&payload[..cut]),
                Err(CoreError::InvalidPayload { .. })
            ));
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut payload = encode_mutations(&[Mutation::delete("k")]);
        payload.push(0);
        assert!(decode_mutations(&payload).is_err());
    }

    #[test]
    fn rejects_unknown_kind_and_version() {
        let mut payload = encode_mutations(&[Mutation::delete("k")]);
        payload[5] = 9;
        assert!(decode_mutations(&payload).is_err());

        let mut payload = encode_mutations(&[]);
        payload[0] = 2;
        assert!(decode_mutations(&payload).is_err());
    }

    fn mutation_strategy() -> impl Strategy<Value = Mutation> {
        let key = proptest::collection::vec(any::<u8>(), 0..16);
        let value = proptest::collection::vec(any::<u8>(), 0..64);
        prop_oneof![
            (key.clone(), value).prop_map(|(k, v)| Mutation::put(k, v)),
            key.prop_map(Mutation::delete),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(mutations in proptest::collection::vec(mutation_strategy(), 0..20)) {
            prop_assert_eq!(decode_mutations(&encode_mutations(&mutations)).unwrap(), mutations);
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode_mutations(&bytes);
        }
    }
}
