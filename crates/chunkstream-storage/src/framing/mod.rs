//! Block Framing
//!
//! The file is a sequence of 64 KiB blocks. Every block begins with a
//! 24-byte header:
//!
//! ```text
//! +---------------+----------------+----------------+
//! |  header_hash  | previous_chunk |   next_chunk   |
//! |    (8 bytes)  |    (8 bytes)   |    (8 bytes)   |
//! +---------------+----------------+----------------+
//! ```
//!
//! - `previous_chunk`: distance back to the start of the chunk that begins
//!   at or straddles this block (0 when a chunk begins exactly here)
//! - `next_chunk`: forward distance to the start of the next chunk
//! - `header_hash`: HighwayHash64 of the two distance fields
//!
//! Block headers are interleaved *inside* chunk byte streams: the writer
//! splits chunk bytes around every multiple of 65536, and the reader skips
//! (and verifies) the headers while reassembling chunks. Because each
//! header is self-authenticated and carries both distances, a reader
//! dropped at an arbitrary file offset can resynchronize at the next block
//! boundary.

mod chunk_reader;
mod chunk_writer;

pub use chunk_reader::ChunkReader;
pub use chunk_writer::ChunkWriter;

use bytes::{Buf, BufMut};
use chunkstream_core::{Error, Result};

use crate::hash;

pub const BLOCK_SIZE: u64 = 1 << 16;
pub const BLOCK_HEADER_SIZE: u64 = 24;
pub const USABLE_BLOCK_SIZE: u64 = BLOCK_SIZE - BLOCK_HEADER_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub previous_chunk: u64,
    pub next_chunk: u64,
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_SIZE as usize] {
        let mut fields = [0u8; 16];
        {
            let mut cursor = &mut fields[..];
            cursor.put_u64_le(self.previous_chunk);
            cursor.put_u64_le(self.next_chunk);
        }
        let mut out = [0u8; BLOCK_HEADER_SIZE as usize];
        out[..8].copy_from_slice(&hash::hash_bytes(&fields).to_le_bytes());
        out[8..].copy_from_slice(&fields);
        out
    }

    pub fn parse(bytes: &[u8; BLOCK_HEADER_SIZE as usize]) -> Result<Self> {
        let stored_hash = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        if hash::hash_bytes(&bytes[8..]) != stored_hash {
            return Err(Error::Corruption("block header hash mismatch".to_string()));
        }
        let mut cursor = &bytes[8..];
        Ok(Self {
            previous_chunk: cursor.get_u64_le(),
            next_chunk: cursor.get_u64_le(),
        })
    }
}

pub fn is_block_boundary(pos: u64) -> bool {
    pos % BLOCK_SIZE == 0
}

/// File position where a chunk of `content_len` logical bytes (header plus
/// data) ends when it begins at `chunk_begin`, accounting for every block
/// header interleaved on the way.
pub fn chunk_end_position(chunk_begin: u64, content_len: u64) -> u64 {
    let mut pos = chunk_begin;
    let mut remaining = content_len;
    if is_block_boundary(pos) {
        pos += BLOCK_HEADER_SIZE;
    }
    loop {
        let room = BLOCK_SIZE - pos % BLOCK_SIZE;
        if remaining <= room {
            return pos + remaining;
        }
        pos += room + BLOCK_HEADER_SIZE;
        remaining -= room;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_header_roundtrip() {
        let header = BlockHeader {
            previous_chunk: 12345,
            next_chunk: 67890,
        };
        let bytes = header.to_bytes();
        assert_eq!(BlockHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_block_header_tamper_detected() {
        let bytes = BlockHeader {
            previous_chunk: 0,
            next_chunk: 65,
        }
        .to_bytes();
        for offset in 0..bytes.len() {
            let mut tampered = bytes;
            tampered[offset] ^= 0x01;
            let err = BlockHeader::parse(&tampered).unwrap_err();
            assert!(err.to_string().contains("block header hash mismatch"));
        }
    }

    #[test]
    fn test_chunk_end_simple() {
        // Signature chunk at file start: block header + 40 + 1.
        assert_eq!(chunk_end_position(0, 41), 65);
        // Next small chunk does not reach the block boundary.
        assert_eq!(chunk_end_position(65, 100), 165);
    }

    #[test]
    fn test_chunk_end_spanning_blocks() {
        // Chunk starting at 65 that overflows the first block.
        let end = chunk_end_position(65, 70_000);
        assert_eq!(end, 65 + 70_000 + BLOCK_HEADER_SIZE);

        // Spanning several blocks.
        let end = chunk_end_position(65, 200_000);
        assert_eq!(end, 65 + 200_000 + 3 * BLOCK_HEADER_SIZE);
    }

    #[test]
    fn test_chunk_end_exactly_at_boundary() {
        let room = BLOCK_SIZE - 65;
        assert_eq!(chunk_end_position(65, room), BLOCK_SIZE);
    }

    #[test]
    fn test_chunk_end_starting_at_boundary() {
        assert_eq!(
            chunk_end_position(BLOCK_SIZE, 100),
            BLOCK_SIZE + BLOCK_HEADER_SIZE + 100
        );
    }
}
