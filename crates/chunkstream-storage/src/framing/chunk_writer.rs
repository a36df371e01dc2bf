//! Chunk Writer
//!
//! Serializes chunks onto a byte pipeline, injecting a block header at
//! every 64 KiB file position — including position 0 and splits that fall
//! mid-chunk-header. The chunk end is computed up front so every injected
//! header can state the exact forward distance to the next chunk.

use chunkstream_core::{Chain, Result};
use tracing::debug;

use crate::chunk::{Chunk, CHUNK_HEADER_SIZE};
use crate::io::{FlushPolicy, Writer};

use super::{chunk_end_position, is_block_boundary, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_SIZE, USABLE_BLOCK_SIZE};

pub struct ChunkWriter<W: Writer> {
    dest: W,
    pos: u64,
}

impl<W: Writer> ChunkWriter<W> {
    pub fn new(dest: W) -> Self {
        let pos = dest.pos();
        Self { dest, pos }
    }

    /// File position; the next chunk will begin here.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Writes one chunk, splitting it around block boundaries.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        let chunk_begin = self.pos;
        let chunk_end = chunk_end_position(chunk_begin, chunk.total_size());

        self.write_section(&chunk.header.to_bytes(), chunk_begin, chunk_end)?;
        for block in chunk.data.blocks() {
            self.write_section(block, chunk_begin, chunk_end)?;
        }
        debug_assert_eq!(self.pos, chunk_end);
        debug!(
            chunk_begin,
            num_records = chunk.header.num_records,
            data_size = chunk.header.data_size,
            "wrote chunk"
        );
        Ok(())
    }

    fn write_section(&mut self, mut src: &[u8], chunk_begin: u64, chunk_end: u64) -> Result<()> {
        while !src.is_empty() {
            if is_block_boundary(self.pos) {
                let header = BlockHeader {
                    previous_chunk: self.pos - chunk_begin,
                    next_chunk: chunk_end - self.pos,
                };
                self.dest.write(&header.to_bytes())?;
                self.pos += BLOCK_HEADER_SIZE;
            }
            let room = (BLOCK_SIZE - self.pos % BLOCK_SIZE) as usize;
            let n = src.len().min(room);
            self.dest.write(&src[..n])?;
            self.pos += n as u64;
            src = &src[n..];
        }
        Ok(())
    }

    /// Emits a padding chunk so the next chunk begins exactly at a block
    /// boundary. No-op when already aligned.
    pub fn pad_to_block_boundary(&mut self) -> Result<()> {
        if is_block_boundary(self.pos) {
            return Ok(());
        }
        let mut capacity = BLOCK_SIZE - self.pos % BLOCK_SIZE;
        // A padding chunk needs its header and type byte; when the tail of
        // this block is too small, pad through the next block as well.
        if capacity < CHUNK_HEADER_SIZE as u64 + 1 {
            capacity += USABLE_BLOCK_SIZE;
        }
        debug!(pos = self.pos, padding = capacity, "padding to block boundary");
        self.write_chunk(&Chunk::padding(capacity - CHUNK_HEADER_SIZE as u64))
    }

    pub fn flush(&mut self, policy: FlushPolicy) -> Result<()> {
        self.dest.flush(policy)
    }

    /// Closes the underlying pipeline and returns it.
    pub fn close(mut self) -> Result<W> {
        self.dest.close()?;
        Ok(self.dest)
    }
}

impl ChunkWriter<crate::io::ChainWriter> {
    /// The accumulated file bytes, for in-memory destinations.
    pub fn into_chain(self) -> Result<Chain> {
        Ok(self.close()?.into_chain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SimpleEncoder;
    use crate::config::CompressorOptions;
    use crate::io::ChainWriter;

    fn simple_chunk(payloads: &[&[u8]]) -> Chunk {
        let mut encoder = SimpleEncoder::new(CompressorOptions::uncompressed());
        for payload in payloads {
            encoder.add_record(payload).unwrap();
        }
        encoder.encode_and_close().unwrap()
    }

    #[test]
    fn test_first_block_header_written_at_zero() {
        let mut writer = ChunkWriter::new(ChainWriter::new());
        writer.write_chunk(&Chunk::file_signature()).unwrap();
        assert_eq!(writer.pos(), 65);

        let bytes = writer.into_chain().unwrap().to_bytes();
        assert_eq!(bytes.len(), 65);

        let header = BlockHeader::parse(bytes[..24].try_into().unwrap()).unwrap();
        assert_eq!(header.previous_chunk, 0);
        assert_eq!(header.next_chunk, 65);

        // Chunk header fields at 24..64: data_size = 1, num_records = 0.
        assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(bytes[40..48].try_into().unwrap()), 0);
        // The signature body.
        assert_eq!(bytes[64], 0x73);
    }

    #[test]
    fn test_block_headers_interleaved_in_large_chunk() {
        let mut writer = ChunkWriter::new(ChainWriter::new());
        writer.write_chunk(&Chunk::file_signature()).unwrap();

        let record = vec![0xCD; 200_000];
        let chunk = simple_chunk(&[&record]);
        let chunk_begin = writer.pos();
        writer.write_chunk(&chunk).unwrap();
        let end = writer.pos();

        let bytes = writer.into_chain().unwrap().to_bytes();
        assert_eq!(bytes.len() as u64, end);

        // A block header sits at every 64 KiB boundary inside the chunk.
        for boundary in [BLOCK_SIZE, 2 * BLOCK_SIZE] {
            assert!(boundary < end);
            let header =
                BlockHeader::parse(bytes[boundary as usize..][..24].try_into().unwrap()).unwrap();
            assert_eq!(header.previous_chunk, boundary - chunk_begin);
            assert_eq!(header.next_chunk, end - boundary);
        }
    }

    #[test]
    fn test_pad_to_block_boundary() {
        let mut writer = ChunkWriter::new(ChainWriter::new());
        writer.write_chunk(&Chunk::file_signature()).unwrap();
        assert_eq!(writer.pos(), 65);
        writer.pad_to_block_boundary().unwrap();
        assert_eq!(writer.pos(), BLOCK_SIZE);
        // Aligned is a no-op.
        writer.pad_to_block_boundary().unwrap();
        assert_eq!(writer.pos(), BLOCK_SIZE);
    }

    #[test]
    fn test_pad_with_tiny_tail_crosses_next_block() {
        let mut writer = ChunkWriter::new(ChainWriter::new());
        writer.write_chunk(&Chunk::file_signature()).unwrap();
        // One record sized so only 20 bytes remain before the boundary:
        // chunk total = 40 header + 3 layout bytes + 3 size varint + record.
        writer.write_chunk(&simple_chunk(&[&vec![1u8; 65_405]])).unwrap();
        let tail = BLOCK_SIZE - writer.pos();
        assert_eq!(tail, 20);

        writer.pad_to_block_boundary().unwrap();
        assert_eq!(writer.pos(), 2 * BLOCK_SIZE);
    }
}
