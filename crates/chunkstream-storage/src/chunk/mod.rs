//! Chunks
//!
//! A chunk is the self-describing unit framing one or more records.
//! On-disk layout:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ ChunkHeader (40 bytes)                                   │
//! │ - data_size (8)                                          │
//! │ - data_hash (8)           HighwayHash64 of the data      │
//! │ - num_records (8)                                        │
//! │ - decoded_data_size (8)                                  │
//! │ - header_hash (8)         HighwayHash64 of bytes 0..32   │
//! ├──────────────────────────────────────────────────────────┤
//! │ Chunk data (data_size bytes)                             │
//! │ - chunk_type (1): 's' signature, 'm' metadata,           │
//! │   'p' padding, 'r' simple, 't' transpose                 │
//! │ - type-specific body                                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. Hashes authenticate the raw logical bytes,
//! before any block headers are interleaved by the framing layer.

pub mod decoder;
pub mod field_filter;
pub mod simple;
pub mod transpose;

pub use decoder::ChunkDecoder;
pub use simple::SimpleEncoder;
pub use transpose::TransposeEncoder;

use bytes::{Buf, BufMut};
use chunkstream_core::{Chain, ChunkType, Error, Result};

use crate::config::RecordWriterOptions;
use crate::hash;

pub const CHUNK_HEADER_SIZE: usize = 40;

/// Fixed 40-byte chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub data_size: u64,
    pub data_hash: u64,
    pub num_records: u64,
    pub decoded_data_size: u64,
}

impl ChunkHeader {
    /// Builds the header for finalized chunk data.
    pub fn new(data: &Chain, num_records: u64, decoded_data_size: u64) -> Self {
        Self {
            data_size: data.len() as u64,
            data_hash: hash::hash_chain(data),
            num_records,
            decoded_data_size,
        }
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut out = [0u8; CHUNK_HEADER_SIZE];
        {
            let mut cursor = &mut out[..];
            cursor.put_u64_le(self.data_size);
            cursor.put_u64_le(self.data_hash);
            cursor.put_u64_le(self.num_records);
            cursor.put_u64_le(self.decoded_data_size);
        }
        let header_hash = hash::hash_bytes(&out[..32]);
        out[32..].copy_from_slice(&header_hash.to_le_bytes());
        out
    }

    /// Parses and authenticates a serialized header.
    pub fn parse(bytes: &[u8; CHUNK_HEADER_SIZE]) -> Result<Self> {
        let stored_hash = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
        if hash::hash_bytes(&bytes[..32]) != stored_hash {
            return Err(Error::Corruption("chunk header hash mismatch".to_string()));
        }
        let mut cursor = &bytes[..];
        Ok(Self {
            data_size: cursor.get_u64_le(),
            data_hash: cursor.get_u64_le(),
            num_records: cursor.get_u64_le(),
            decoded_data_size: cursor.get_u64_le(),
        })
    }
}

/// A finalized chunk: header plus raw data.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub data: Chain,
}

impl Chunk {
    /// Assembles a chunk from finalized data.
    pub fn new(data: Chain, num_records: u64, decoded_data_size: u64) -> Self {
        let header = ChunkHeader::new(&data, num_records, decoded_data_size);
        Self { header, data }
    }

    /// The signature chunk that opens every file: body is the single type
    /// byte.
    pub fn file_signature() -> Self {
        Self::new(Chain::from(&[ChunkType::FileSignature as u8][..]), 0, 0)
    }

    /// A padding chunk whose data (type byte included) is `data_size` bytes.
    pub fn padding(data_size: u64) -> Self {
        assert!(data_size >= 1, "padding chunk needs room for its type byte");
        let mut data = vec![0u8; data_size as usize];
        data[0] = ChunkType::Padding as u8;
        Self::new(Chain::from(data), 0, 0)
    }

    /// A metadata chunk carrying an opaque user payload.
    pub fn file_metadata(payload: Chain) -> Self {
        let mut data = Chain::from(&[ChunkType::FileMetadata as u8][..]);
        data.append_chain(payload);
        Self::new(data, 0, 0)
    }

    pub fn chunk_type(&self) -> Result<ChunkType> {
        let first = self
            .data
            .blocks()
            .next()
            .map(|block| block[0])
            .ok_or_else(|| Error::Corruption("empty chunk data".to_string()))?;
        ChunkType::try_from(first)
    }

    /// Verifies the data hash against the header.
    pub fn verify_data(&self) -> Result<()> {
        if self.data.len() as u64 != self.header.data_size {
            return Err(Error::Corruption(format!(
                "chunk data size mismatch: header says {}, got {}",
                self.header.data_size,
                self.data.len()
            )));
        }
        if hash::hash_chain(&self.data) != self.header.data_hash {
            return Err(Error::Corruption("chunk data hash mismatch".to_string()));
        }
        Ok(())
    }

    /// Logical size on disk before block headers are interleaved.
    pub fn total_size(&self) -> u64 {
        CHUNK_HEADER_SIZE as u64 + self.header.data_size
    }
}

/// Either chunk encoder, chosen by the writer options.
pub enum ChunkEncoder {
    Simple(SimpleEncoder),
    Transpose(TransposeEncoder),
}

impl ChunkEncoder {
    pub fn new(options: &RecordWriterOptions) -> Self {
        if options.transpose {
            ChunkEncoder::Transpose(TransposeEncoder::new(options.compressor))
        } else {
            ChunkEncoder::Simple(SimpleEncoder::new(options.compressor))
        }
    }

    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.add_record(record),
            ChunkEncoder::Transpose(encoder) => encoder.add_record(record),
        }
    }

    pub fn num_records(&self) -> u64 {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.num_records(),
            ChunkEncoder::Transpose(encoder) => encoder.num_records(),
        }
    }

    /// Decoded bytes staged so far.
    pub fn decoded_size(&self) -> u64 {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.decoded_size(),
            ChunkEncoder::Transpose(encoder) => encoder.decoded_size(),
        }
    }

    /// Chunk-rolling measure: staged bytes plus roughly one size byte per
    /// record, so chunks of many tiny records still roll.
    pub fn estimated_size(&self) -> u64 {
        self.decoded_size().saturating_add(self.num_records())
    }

    pub fn is_empty(&self) -> bool {
        self.num_records() == 0
    }

    pub fn encode_and_close(self) -> Result<Chunk> {
        match self {
            ChunkEncoder::Simple(encoder) => encoder.encode_and_close(),
            ChunkEncoder::Transpose(encoder) => encoder.encode_and_close(),
        }
    }
}
