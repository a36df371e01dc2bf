//! Simple Chunk Encoder
//!
//! The Simple layout stores two independently compressed streams: the
//! record sizes (as varints) and the concatenated record payloads.
//!
//! ```text
//! 0x72                                   chunk type
//! compression_type:u8
//! compressed_sizes_len:varint
//! compressed_sizes:bytes                 varint sizes, one per record
//! compressed_values:bytes                all payloads, concatenated
//! ```
//!
//! Splitting sizes from values keeps the size stream tiny and highly
//! compressible, and lets the decoder rebuild the record index without
//! touching payload bytes.

use chunkstream_core::{ChunkType, Error, Result};

use crate::compress::Compressor;
use crate::config::CompressorOptions;
use crate::io::{write_varint64, ChainWriter, Writer};

use super::Chunk;

/// Largest single record: the 2 GiB protobuf message bound.
pub const MAX_RECORD_SIZE: u64 = i32::MAX as u64;

pub struct SimpleEncoder {
    compression_type: chunkstream_core::CompressionType,
    sizes_compressor: Compressor,
    values_compressor: Compressor,
    num_records: u64,
}

impl SimpleEncoder {
    pub fn new(options: CompressorOptions) -> Self {
        Self {
            compression_type: options.compression_type(),
            sizes_compressor: Compressor::new(options),
            values_compressor: Compressor::new(options),
            num_records: 0,
        }
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }

    /// Concatenated payload bytes staged so far.
    pub fn decoded_size(&self) -> u64 {
        self.values_compressor.decoded_size()
    }

    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        if record.len() as u64 > MAX_RECORD_SIZE {
            return Err(Error::RecordTooLarge(record.len() as u64));
        }
        if self.num_records == u64::MAX {
            return Err(Error::TooManyRecords);
        }
        self.decoded_size()
            .checked_add(record.len() as u64)
            .ok_or_else(|| Error::SizeOverflow("decoded data size".to_string()))?;
        self.num_records += 1;
        write_varint64(self.sizes_compressor.writer(), record.len() as u64)?;
        self.values_compressor.writer().write(record)
    }

    /// Adds records expressed as concatenated values plus sorted end
    /// positions.
    ///
    /// Preconditions (fatal): `limits` sorted, last limit equals
    /// `records.len()`.
    pub fn add_records(&mut self, records: chunkstream_core::Chain, limits: &[u64]) -> Result<()> {
        assert_eq!(
            limits.last().copied().unwrap_or(0),
            records.len() as u64,
            "record end positions do not match concatenated record values"
        );
        let mut start = 0u64;
        for &limit in limits {
            assert!(limit >= start, "record end positions not sorted");
            if self.num_records == u64::MAX {
                return Err(Error::TooManyRecords);
            }
            self.num_records += 1;
            write_varint64(self.sizes_compressor.writer(), limit - start)?;
            start = limit;
        }
        self.values_compressor.writer().write_chain_owned(records)
    }

    /// Finalizes the chunk.
    pub fn encode_and_close(self) -> Result<Chunk> {
        let num_records = self.num_records;
        let decoded_data_size = self.values_compressor.decoded_size();

        let mut dest = ChainWriter::new();
        dest.write(&[ChunkType::Simple as u8, self.compression_type as u8])?;

        let compressed_sizes = self.sizes_compressor.encode_and_close_to_chain()?;
        write_varint64(&mut dest, compressed_sizes.len() as u64)?;
        dest.write_chain_owned(compressed_sizes)?;

        self.values_compressor.encode_and_close(&mut dest)?;

        Ok(Chunk::new(dest.into_chain(), num_records, decoded_data_size))
    }
}
