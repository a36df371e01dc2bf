//! Chunk Reader
//!
//! Reassembles chunks from a block-framed byte source, verifying every
//! hash on the way: each skipped block header, the chunk header, and the
//! chunk data. On corruption the reader can resynchronize by scanning
//! forward one block at a time and following a verified block header to
//! the next chunk start.

use chunkstream_core::{Chain, Error, Result};
use tracing::warn;

use crate::chunk::{Chunk, ChunkHeader, CHUNK_HEADER_SIZE};
use crate::io::SeekableReader;

use super::{is_block_boundary, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_SIZE};

pub struct ChunkReader<R: SeekableReader> {
    src: R,
    /// File position where the next chunk is expected to begin.
    pos: u64,
    /// Header of the chunk whose body failed to read, for skipped-record
    /// accounting.
    failed_header: Option<ChunkHeader>,
    recoverable_corruptions: u64,
}

impl<R: SeekableReader> ChunkReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            pos: 0,
            failed_header: None,
            recoverable_corruptions: 0,
        }
    }

    /// Position of the next chunk.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Number of corruption events skipped via [`recover`](Self::recover)
    /// or during resynchronization.
    pub fn recoverable_corruptions(&self) -> u64 {
        self.recoverable_corruptions
    }

    /// Header of the most recent chunk whose body could not be read, if
    /// the header itself was intact. Cleared by the next read.
    pub fn take_failed_header(&mut self) -> Option<ChunkHeader> {
        self.failed_header.take()
    }

    /// Positions the reader at a known chunk begin offset.
    pub fn seek(&mut self, chunk_begin: u64) {
        self.pos = chunk_begin;
    }

    /// Reads the chunk at the current position. `Ok(None)` at clean end of
    /// file.
    pub fn read_chunk(&mut self) -> Result<Option<(u64, Chunk)>> {
        self.failed_header = None;
        let chunk_begin = self.pos;
        if chunk_begin >= self.src.size() {
            return Ok(None);
        }
        self.src.seek(chunk_begin)?;

        let header_bytes = self.read_interleaved(CHUNK_HEADER_SIZE as u64)?.to_bytes();
        let header = ChunkHeader::parse(header_bytes.as_ref().try_into().unwrap())?;

        let data = match self.read_interleaved(header.data_size) {
            Ok(data) => data,
            Err(err) => {
                self.failed_header = Some(header);
                return Err(err);
            }
        };
        let chunk = Chunk { header, data };
        if let Err(err) = chunk.verify_data() {
            self.failed_header = Some(header);
            return Err(err);
        }

        self.pos = self.src.pos();
        Ok(Some((chunk_begin, chunk)))
    }

    /// Reads `n` chunk bytes from the source, verifying and skipping block
    /// headers at every 64 KiB boundary.
    fn read_interleaved(&mut self, n: u64) -> Result<Chain> {
        let mut out = Chain::new();
        let mut remaining = n;
        while remaining > 0 {
            if is_block_boundary(self.src.pos()) {
                if self.src.size() - self.src.pos() < BLOCK_HEADER_SIZE {
                    return Err(Error::Corruption("truncated chunk".to_string()));
                }
                let bytes = self.src.read(BLOCK_HEADER_SIZE as usize)?;
                BlockHeader::parse(bytes.as_ref().try_into().unwrap())?;
            }
            let room = BLOCK_SIZE - self.src.pos() % BLOCK_SIZE;
            let take = remaining.min(room);
            if self.src.size() - self.src.pos() < take {
                return Err(Error::Corruption("truncated chunk".to_string()));
            }
            out.append_chain(self.src.read_chain(take as usize)?);
            remaining -= take;
        }
        Ok(out)
    }

    /// After a failed read: scans forward block by block and repositions at
    /// the next chunk. Returns `false` when no further chunk exists.
    pub fn recover(&mut self) -> Result<bool> {
        self.recoverable_corruptions += 1;
        let next_block = (self.pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
        warn!(pos = self.pos, next_block, "recovering from corrupt chunk");
        self.resync_from(next_block)
    }

    /// Positions the reader at the first chunk starting at or after `pos`,
    /// using block headers to resynchronize. Returns `false` when no valid
    /// block header remains.
    pub fn seek_recovering(&mut self, pos: u64) -> Result<bool> {
        let block = if is_block_boundary(pos) {
            pos
        } else {
            (pos / BLOCK_SIZE + 1) * BLOCK_SIZE
        };
        self.resync_from(block)
    }

    fn resync_from(&mut self, mut block: u64) -> Result<bool> {
        while block + BLOCK_HEADER_SIZE <= self.src.size() {
            self.src.seek(block)?;
            let bytes = self.src.read(BLOCK_HEADER_SIZE as usize)?;
            match BlockHeader::parse(bytes.as_ref().try_into().unwrap()) {
                Ok(header) => {
                    self.pos = if header.previous_chunk == 0 {
                        block
                    } else {
                        block + header.next_chunk
                    };
                    return Ok(true);
                }
                Err(_) => {
                    // A block whose header fails verification is never
                    // trusted; skip the whole block.
                    self.recoverable_corruptions += 1;
                    warn!(block, "skipping block with corrupt header");
                    block += BLOCK_SIZE;
                }
            }
        }
        self.pos = self.src.size();
        Ok(false)
    }

    /// Total size of the underlying source.
    pub fn size(&self) -> u64 {
        self.src.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SimpleEncoder;
    use crate::config::CompressorOptions;
    use crate::framing::ChunkWriter;
    use crate::io::{ChainReader, ChainWriter};
    use chunkstream_core::ChunkType;

    fn simple_chunk(payloads: &[&[u8]]) -> Chunk {
        let mut encoder = SimpleEncoder::new(CompressorOptions::uncompressed());
        for payload in payloads {
            encoder.add_record(payload).unwrap();
        }
        encoder.encode_and_close().unwrap()
    }

    /// Writes a signature plus the given chunks, returning the file bytes.
    fn build_file(chunks: &[Chunk]) -> Vec<u8> {
        let mut writer = ChunkWriter::new(ChainWriter::new());
        writer.write_chunk(&Chunk::file_signature()).unwrap();
        for chunk in chunks {
            writer.write_chunk(chunk).unwrap();
        }
        writer.into_chain().unwrap().to_bytes().to_vec()
    }

    fn reader_over(bytes: Vec<u8>) -> ChunkReader<ChainReader> {
        ChunkReader::new(ChainReader::new(Chain::from(bytes)))
    }

    #[test]
    fn test_read_back_in_order() {
        let chunks = vec![
            simple_chunk(&[b"first"]),
            simple_chunk(&[b"second", b"third"]),
        ];
        let mut reader = reader_over(build_file(&chunks));

        let (begin, signature) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(begin, 0);
        assert_eq!(signature.chunk_type().unwrap(), ChunkType::FileSignature);

        let (begin1, chunk1) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(begin1, 65);
        assert_eq!(chunk1, chunks[0]);

        let (_, chunk2) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk2, chunks[1]);

        assert!(reader.read_chunk().unwrap().is_none());
    }

    #[test]
    fn test_chunk_spanning_blocks_reassembled() {
        let big = vec![0x3C; 150_000];
        let chunks = vec![simple_chunk(&[&big]), simple_chunk(&[b"after"])];
        let mut reader = reader_over(build_file(&chunks));

        reader.read_chunk().unwrap().unwrap(); // signature
        let (_, chunk) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk, chunks[0]);
        let (_, after) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(after, chunks[1]);
    }

    #[test]
    fn test_seek_to_known_chunk() {
        let chunks = vec![simple_chunk(&[b"one"]), simple_chunk(&[b"two"])];
        let mut reader = reader_over(build_file(&chunks));
        reader.read_chunk().unwrap().unwrap();
        let (begin1, _) = reader.read_chunk().unwrap().unwrap();
        let (begin2, chunk2) = reader.read_chunk().unwrap().unwrap();

        reader.seek(begin2);
        let (_, again) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(again, chunk2);

        reader.seek(begin1);
        let (_, chunk1) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk1, chunks[0]);
    }

    #[test]
    fn test_corrupt_data_reports_hash_mismatch() {
        let chunks = vec![simple_chunk(&[b"records live here"])];
        let mut bytes = build_file(&chunks);
        // Corrupt a byte inside the second chunk's data (after its header).
        bytes[65 + 45] ^= 0xFF;
        let mut reader = reader_over(bytes);
        reader.read_chunk().unwrap().unwrap(); // signature is intact
        let err = reader.read_chunk().unwrap_err();
        assert!(err.to_string().contains("chunk data hash mismatch"));
        // Header was intact, so the record count survives for accounting.
        assert_eq!(reader.take_failed_header().unwrap().num_records, 1);
    }

    #[test]
    fn test_corrupt_header_reports_header_mismatch() {
        let chunks = vec![simple_chunk(&[b"x"])];
        let mut bytes = build_file(&chunks);
        bytes[65] ^= 0x01; // first byte of the second chunk's header
        let mut reader = reader_over(bytes);
        reader.read_chunk().unwrap().unwrap();
        let err = reader.read_chunk().unwrap_err();
        assert!(err.to_string().contains("chunk header hash mismatch"));
        assert!(reader.take_failed_header().is_none());
    }

    #[test]
    fn test_recover_skips_to_next_block() {
        // Two blocks: corrupt chunk in the first, valid chunk at the second.
        let filler = simple_chunk(&[&vec![7u8; 70_000]]);
        let tail = simple_chunk(&[b"tail records"]);
        let bytes = build_file(&[filler, tail.clone()]);
        let tail_begin = {
            // Recompute where the tail chunk begins.
            let mut reader = reader_over(bytes.clone());
            reader.read_chunk().unwrap().unwrap();
            reader.read_chunk().unwrap().unwrap();
            reader.pos()
        };

        let mut corrupted = bytes;
        corrupted[70] ^= 0xFF; // inside the filler chunk
        let mut reader = reader_over(corrupted);
        reader.read_chunk().unwrap().unwrap(); // signature
        assert!(reader.read_chunk().is_err());

        assert!(reader.recover().unwrap());
        assert_eq!(reader.recoverable_corruptions(), 1);
        let (begin, chunk) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(begin, tail_begin);
        assert_eq!(chunk, tail);
    }

    #[test]
    fn test_recover_at_truncated_file_returns_false() {
        let chunks = vec![simple_chunk(&[b"will be cut"])];
        let mut bytes = build_file(&chunks);
        bytes.truncate(bytes.len() - 10);
        let mut reader = reader_over(bytes);
        reader.read_chunk().unwrap().unwrap();
        let err = reader.read_chunk().unwrap_err();
        assert!(err.to_string().contains("truncated chunk"));
        assert!(!reader.recover().unwrap());
    }

    #[test]
    fn test_seek_recovering_finds_chunk_after_offset() {
        // Chunk spanning into block 2, then small chunks.
        let big = simple_chunk(&[&vec![9u8; 70_000]]);
        let small = simple_chunk(&[b"landing"]);
        let bytes = build_file(&[big, small.clone()]);
        let mut reader = reader_over(bytes);

        // Resync from inside the big chunk: lands on the chunk after it.
        assert!(reader.seek_recovering(100).unwrap());
        let (_, chunk) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk, small);
    }

    #[test]
    fn test_seek_recovering_at_block_boundary_chunk() {
        // Pad so a chunk begins exactly at a block boundary.
        let mut writer = ChunkWriter::new(ChainWriter::new());
        writer.write_chunk(&Chunk::file_signature()).unwrap();
        writer.pad_to_block_boundary().unwrap();
        let aligned = simple_chunk(&[b"aligned chunk"]);
        let aligned_begin = writer.pos();
        assert!(is_block_boundary(aligned_begin));
        writer.write_chunk(&aligned).unwrap();
        let bytes = writer.into_chain().unwrap().to_bytes().to_vec();

        let mut reader = reader_over(bytes);
        assert!(reader.seek_recovering(aligned_begin).unwrap());
        assert_eq!(reader.pos(), aligned_begin);
        let (_, chunk) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk, aligned);
    }

    #[test]
    fn test_resync_skips_block_with_corrupt_header() {
        // Three blocks; corrupt the header of block 1 and resync from it.
        let big = simple_chunk(&[&vec![5u8; 140_000]]);
        let tail = simple_chunk(&[b"tail"]);
        let mut bytes = build_file(&[big, tail.clone()]);
        bytes[BLOCK_SIZE as usize] ^= 0xFF;

        let mut reader = reader_over(bytes);
        assert!(reader.seek_recovering(BLOCK_SIZE).unwrap());
        // Block 1's header is untrusted, so resync continued at block 2 and
        // followed it to the tail chunk.
        let (_, chunk) = reader.read_chunk().unwrap().unwrap();
        assert_eq!(chunk, tail);
        assert_eq!(reader.recoverable_corruptions(), 1);
    }
}
