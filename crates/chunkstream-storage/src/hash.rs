//! Integrity Hashing
//!
//! All integrity checks in the format use 64-bit keyed HighwayHash. The key
//! is fixed by the format (the ASCII bytes of `"Riegeli/records\n"` twice,
//! little-endian); files hashed with any other key are unreadable, so it is
//! a format constant, not a configuration knob.

use highway::{HighwayHash, HighwayHasher, Key};

use chunkstream_core::Chain;

/// Fixed format hash key.
const HASH_KEY: Key = Key([
    0x2f69_6c65_6765_6952, // "Riegeli/"
    0x0a73_6472_6f63_6572, // "records\n"
    0x2f69_6c65_6765_6952,
    0x0a73_6472_6f63_6572,
]);

/// 64-bit keyed hash of a contiguous byte slice.
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut hasher = HighwayHasher::new(HASH_KEY);
    hasher.append(data);
    hasher.finalize64()
}

/// 64-bit keyed hash of a chain's logical bytes, independent of its block
/// structure.
pub fn hash_chain(chain: &Chain) -> u64 {
    let mut hasher = HighwayHasher::new(HASH_KEY);
    for block in chain.blocks() {
        hasher.append(block);
    }
    hasher.finalize64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_key_spells_the_format_string() {
        let mut bytes = Vec::new();
        for word in HASH_KEY.0 {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        assert_eq!(&bytes, b"Riegeli/records\nRiegeli/records\n");
    }

    #[test]
    fn test_chain_hash_ignores_block_structure() {
        let mut split = Chain::new();
        split.append(Bytes::from_static(b"hello "));
        split.append(Bytes::from_static(b"world"));
        let flat = Chain::from(&b"hello world"[..]);
        assert_eq!(hash_chain(&split), hash_chain(&flat));
        assert_eq!(hash_chain(&flat), hash_bytes(b"hello world"));
    }

    #[test]
    fn test_single_bit_changes_hash() {
        let a = hash_bytes(b"record payload");
        let b = hash_bytes(b"record pbyload");
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_input_stable() {
        assert_eq!(hash_bytes(b""), hash_chain(&Chain::new()));
    }
}
