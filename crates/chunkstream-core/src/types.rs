//! Format Enums
//!
//! The chunk type and compression type tags are part of the on-disk format:
//! both are closed, single-byte spaces. Unknown values are corruption, not
//! extension points.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// First byte of chunk data, identifying the chunk's payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    /// Must be the first chunk of every file; body is the single byte 0x73.
    FileSignature = 0x73,
    /// Optional chunk carrying user metadata.
    FileMetadata = 0x6D,
    /// Filler emitted to align the next chunk to a block boundary.
    Padding = 0x70,
    /// Compressed size vector + concatenated record payloads.
    Simple = 0x72,
    /// Column-shredded protobuf encoding.
    Transpose = 0x74,
}

impl TryFrom<u8> for ChunkType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x73 => Ok(ChunkType::FileSignature),
            0x6D => Ok(ChunkType::FileMetadata),
            0x70 => Ok(ChunkType::Padding),
            0x72 => Ok(ChunkType::Simple),
            0x74 => Ok(ChunkType::Transpose),
            _ => Err(Error::Corruption(format!("unknown chunk type: {value:#04x}"))),
        }
    }
}

/// Compression algorithm tag used by Simple and Transpose chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Brotli = 0x62,
    Zstd = 0x7A,
}

impl TryFrom<u8> for CompressionType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            0x62 => Ok(CompressionType::Brotli),
            0x7A => Ok(CompressionType::Zstd),
            _ => Err(Error::Corruption(format!(
                "unknown compression type: {value:#04x}"
            ))),
        }
    }
}
