//! Chunk Decoder
//!
//! Parses any chunk into an indexed record table: the concatenated record
//! values plus `limits`, the sorted cumulative end offsets. Record `i` is
//! the byte range `[limits[i-1], limits[i])` of the values (with
//! `limits[-1] = 0`), so random access by index is a slice, not a scan.
//!
//! Invariants after a successful parse:
//! - `limits` is non-decreasing,
//! - `limits.last() == decoded_data_size == values.len()`,
//! - `limits.len() == num_records` from the chunk header.

use bytes::Bytes;
use chunkstream_core::{varint, Chain, ChunkType, CompressionType, Error, Result};

use crate::compress::decompress;
use crate::io::{read_u8, read_varint64, ChainReader, Reader, SeekableReader};

use super::field_filter::FieldFilter;
use super::transpose::TransposeDecoder;
use super::{Chunk, ChunkHeader};

#[derive(Default)]
pub struct ChunkDecoder {
    field_filter: FieldFilter,
    limits: Vec<u64>,
    values: Chain,
    index: u64,
    /// Buckets decompressed by the last transpose parse; stays 0 for other
    /// chunk types.
    bucket_decompressions: u64,
}

impl ChunkDecoder {
    pub fn new(field_filter: FieldFilter) -> Self {
        Self {
            field_filter,
            ..Default::default()
        }
    }

    /// Drops the current chunk.
    pub fn clear(&mut self) {
        self.limits.clear();
        self.values.clear();
        self.index = 0;
        self.bucket_decompressions = 0;
    }

    /// Parses a chunk, replacing the decoder contents.
    ///
    /// Signature, padding, and metadata chunks parse to zero records so the
    /// record layer can skip them uniformly.
    pub fn reset(&mut self, chunk: &Chunk) -> Result<()> {
        self.clear();
        let chunk_type = chunk.chunk_type()?;
        let mut src = ChainReader::new(chunk.data.slice(1, chunk.data.len()));
        match chunk_type {
            ChunkType::Simple => self.parse_simple(&chunk.header, &mut src)?,
            ChunkType::Transpose => {
                let mut decoder = TransposeDecoder::new(self.field_filter.clone());
                let (values, limits) = decoder.decode(&chunk.header, &mut src)?;
                self.bucket_decompressions = decoder.bucket_decompressions();
                self.values = values;
                self.limits = limits;
            }
            ChunkType::FileSignature | ChunkType::FileMetadata | ChunkType::Padding => {
                if chunk.header.num_records != 0 {
                    return Err(Error::Corruption(format!(
                        "{chunk_type:?} chunk claims {} records",
                        chunk.header.num_records
                    )));
                }
            }
        }
        Ok(())
    }

    fn parse_simple(&mut self, header: &ChunkHeader, src: &mut ChainReader) -> Result<()> {
        let compression = CompressionType::try_from(read_u8(src)?)?;

        let sizes_len = read_varint64(src)?;
        if sizes_len > (src.size() - src.pos()) {
            return Err(Error::Corruption(
                "compressed sizes length exceeds chunk data".to_string(),
            ));
        }
        let sizes_blob = src.read_chain(sizes_len as usize)?;
        let sizes = decompress(compression, sizes_blob, None)?;

        let mut limits = Vec::with_capacity(header.num_records.min(1 << 20) as usize);
        let sizes_bytes = sizes.to_bytes();
        let mut cursor = sizes_bytes.as_ref();
        let mut end = 0u64;
        for _ in 0..header.num_records {
            let size = varint::decode_u64(&mut cursor)?;
            end = end.checked_add(size).ok_or_else(|| {
                Error::Corruption("record limit overflows decoded data size".to_string())
            })?;
            if end > header.decoded_data_size {
                return Err(Error::Corruption(
                    "record limit exceeds decoded data size".to_string(),
                ));
            }
            limits.push(end);
        }
        if !cursor.is_empty() {
            return Err(Error::Corruption(
                "excess record sizes in simple chunk".to_string(),
            ));
        }
        if end != header.decoded_data_size {
            return Err(Error::Corruption(format!(
                "record limits do not match decoded data size: {end} != {}",
                header.decoded_data_size
            )));
        }

        let values_len = src.size() - src.pos();
        let values_blob = src.read_chain(values_len as usize)?;
        self.values = decompress(compression, values_blob, Some(header.decoded_data_size))?;
        self.limits = limits;
        Ok(())
    }

    pub fn num_records(&self) -> u64 {
        self.limits.len() as u64
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Seeks to record `index`, clamping past-the-end values.
    pub fn set_index(&mut self, index: u64) {
        self.index = index.min(self.num_records());
    }

    /// Returns the next record, or `None` when the chunk is exhausted.
    pub fn read_record(&mut self) -> Option<Bytes> {
        if self.index == self.num_records() {
            return None;
        }
        let index = self.index as usize;
        let start = if index == 0 {
            0
        } else {
            self.limits[index - 1]
        };
        let end = self.limits[index];
        self.index += 1;
        Some(self.values.slice_to_bytes(start as usize, end as usize))
    }

    /// Buckets decompressed while parsing the current (transpose) chunk.
    pub fn bucket_decompressions(&self) -> u64 {
        self.bucket_decompressions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SimpleEncoder;
    use crate::config::CompressorOptions;

    fn simple_chunk(options: CompressorOptions, records: &[&[u8]]) -> Chunk {
        let mut encoder = SimpleEncoder::new(options);
        for record in records {
            encoder.add_record(record).unwrap();
        }
        encoder.encode_and_close().unwrap()
    }

    fn decode_all(chunk: &Chunk) -> Vec<Bytes> {
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        decoder.reset(chunk).unwrap();
        let mut out = Vec::new();
        while let Some(record) = decoder.read_record() {
            out.push(record);
        }
        out
    }

    // ---------------------------------------------------------------
    // Roundtrips
    // ---------------------------------------------------------------

    #[test]
    fn test_simple_roundtrip_uncompressed() {
        let records: &[&[u8]] = &[b"hello", b"", b"world"];
        let chunk = simple_chunk(CompressorOptions::uncompressed(), records);
        let decoded = decode_all(&chunk);
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_simple_roundtrip_compressed() {
        let records: Vec<Vec<u8>> = (0..100)
            .map(|i| format!("record payload number {i}").into_bytes())
            .collect();
        let refs: Vec<&[u8]> = records.iter().map(Vec::as_slice).collect();
        for options in [
            CompressorOptions::brotli(5).unwrap(),
            CompressorOptions::zstd(3).unwrap(),
        ] {
            let chunk = simple_chunk(options, &refs);
            assert_eq!(decode_all(&chunk), refs);
        }
    }

    // ---------------------------------------------------------------
    // Random access
    // ---------------------------------------------------------------

    #[test]
    fn test_set_index_random_access() {
        let records: &[&[u8]] = &[b"a", b"bb", b"ccc", b"dddd"];
        let chunk = simple_chunk(CompressorOptions::uncompressed(), records);
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        decoder.reset(&chunk).unwrap();

        decoder.set_index(2);
        assert_eq!(decoder.read_record().unwrap().as_ref(), b"ccc");
        decoder.set_index(0);
        assert_eq!(decoder.read_record().unwrap().as_ref(), b"a");
        decoder.set_index(99);
        assert_eq!(decoder.index(), 4);
        assert!(decoder.read_record().is_none());
    }

    // ---------------------------------------------------------------
    // Corruption
    // ---------------------------------------------------------------

    fn rebuild_with_data(chunk: &Chunk, data: Vec<u8>) -> Chunk {
        // Keep the original header (as a corrupt file would) but swap data.
        Chunk {
            header: chunk.header,
            data: Chain::from(data),
        }
    }

    #[test]
    fn test_unknown_compression_type_rejected() {
        let chunk = simple_chunk(CompressorOptions::uncompressed(), &[b"x"]);
        let mut data = chunk.data.to_bytes().to_vec();
        data[1] = 0xEE;
        let corrupt = rebuild_with_data(&chunk, data);
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        assert!(matches!(
            decoder.reset(&corrupt),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_sizes_sum_mismatch_rejected() {
        let chunk = simple_chunk(CompressorOptions::uncompressed(), &[b"ab", b"cd"]);
        let mut data = chunk.data.to_bytes().to_vec();
        // sizes are at offsets 3..5 (uncompressed layout); shrink one.
        assert_eq!(&data[3..5], &[2, 2]);
        data[4] = 1;
        let corrupt = rebuild_with_data(&chunk, data);
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        let err = decoder.reset(&corrupt).unwrap_err();
        assert!(err.to_string().contains("decoded data size"));
    }

    #[test]
    fn test_sizes_blob_longer_than_chunk_rejected() {
        let chunk = simple_chunk(CompressorOptions::uncompressed(), &[b"ab"]);
        let mut data = chunk.data.to_bytes().to_vec();
        data[2] = 0x7F; // compressed_sizes_len far beyond the data
        let corrupt = rebuild_with_data(&chunk, data);
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        assert!(decoder.reset(&corrupt).is_err());
    }

    #[test]
    fn test_non_record_chunks_have_no_records() {
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        for chunk in [
            Chunk::file_signature(),
            Chunk::padding(50),
            Chunk::file_metadata(Chain::from(&b"meta"[..])),
        ] {
            decoder.reset(&chunk).unwrap();
            assert_eq!(decoder.num_records(), 0);
            assert!(decoder.read_record().is_none());
        }
    }

    #[test]
    fn test_limits_invariant_holds() {
        let records: &[&[u8]] = &[b"", b"xy", b"", b"z"];
        let chunk = simple_chunk(CompressorOptions::zstd(1).unwrap(), records);
        let mut decoder = ChunkDecoder::new(FieldFilter::all());
        decoder.reset(&chunk).unwrap();
        assert_eq!(decoder.limits, vec![0, 2, 2, 3]);
        assert_eq!(*decoder.limits.last().unwrap(), chunk.header.decoded_data_size);
    }
}
