//! Record Reader
//!
//! Reads records in order, skipping signature, metadata, and padding
//! chunks. With `skip_errors` set, corrupt chunks are counted and skipped
//! by resynchronizing at the next valid block header; otherwise the first
//! corruption fails the reader.
//!
//! Seeking takes a `RecordPosition`: the addressed chunk is re-read and
//! the decoder positioned on the record index, without touching earlier
//! records. A position that does not point at a chunk degrades to block
//! resynchronization.

use bytes::Bytes;
use chunkstream_core::{Chain, ChunkType, Error, RecordPosition, Result};
use tracing::warn;

use crate::chunk::{Chunk, ChunkDecoder};
use crate::config::RecordReaderOptions;
use crate::framing::ChunkReader;
use crate::io::SeekableReader;

pub struct RecordReader<R: SeekableReader> {
    chunk_reader: ChunkReader<R>,
    decoder: ChunkDecoder,
    /// Begin position of the chunk currently loaded in the decoder.
    chunk_begin: u64,
    skip_errors: bool,
    skipped_records: u64,
    /// Payload of the file-metadata chunk, when one has been read past.
    metadata: Option<Chain>,
}

impl<R: SeekableReader> RecordReader<R> {
    pub fn new(src: R, options: RecordReaderOptions) -> Self {
        Self {
            chunk_reader: ChunkReader::new(src),
            decoder: ChunkDecoder::new(options.field_filter),
            chunk_begin: 0,
            skip_errors: options.skip_errors,
            skipped_records: 0,
            metadata: None,
        }
    }

    /// Reads the next record and its position. `Ok(None)` at end of file.
    pub fn read_record(&mut self) -> Result<Option<(RecordPosition, Bytes)>> {
        loop {
            if let Some(record) = self.decoder.read_record() {
                let position = RecordPosition::new(self.chunk_begin, self.decoder.index() - 1);
                return Ok(Some((position, record)));
            }
            if !self.advance_chunk()? {
                return Ok(None);
            }
        }
    }

    /// Loads the next chunk into the decoder. `Ok(false)` at end of file.
    fn advance_chunk(&mut self) -> Result<bool> {
        loop {
            match self.chunk_reader.read_chunk() {
                Ok(None) => return Ok(false),
                Ok(Some((begin, chunk))) => {
                    if begin == 0 && chunk.chunk_type()? != ChunkType::FileSignature {
                        return Err(Error::Corruption(
                            "file does not begin with a signature chunk".to_string(),
                        ));
                    }
                    if chunk.chunk_type()? == ChunkType::FileMetadata {
                        self.metadata = Some(chunk.data.slice(1, chunk.data.len()));
                    }
                    match self.decoder.reset(&chunk) {
                        Ok(()) => {
                            self.chunk_begin = begin;
                            return Ok(true);
                        }
                        Err(err) => {
                            if !self.skip_on_error(&chunk, &err)? {
                                return Err(err);
                            }
                        }
                    }
                }
                Err(err) => {
                    if !self.skip_errors {
                        return Err(err);
                    }
                    if let Some(header) = self.chunk_reader.take_failed_header() {
                        self.skipped_records += header.num_records;
                    }
                    warn!(error = %err, "skipping corrupt chunk");
                    if !self.chunk_reader.recover()? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Handles a chunk that passed hashing but failed to decode (e.g. a
    /// corrupt codec stream). Returns whether reading should continue.
    fn skip_on_error(&mut self, chunk: &Chunk, err: &Error) -> Result<bool> {
        if !self.skip_errors {
            return Ok(false);
        }
        self.skipped_records += chunk.header.num_records;
        warn!(error = %err, "skipping undecodable chunk");
        self.chunk_reader.recover()
    }

    /// Positions the reader on the addressed record. The next
    /// [`read_record`](Self::read_record) returns it.
    pub fn seek(&mut self, position: RecordPosition) -> Result<()> {
        self.decoder.clear();
        self.chunk_reader.seek(position.chunk_begin);
        match self.chunk_reader.read_chunk() {
            Ok(Some((begin, chunk))) => {
                self.decoder.reset(&chunk)?;
                self.chunk_begin = begin;
                self.decoder.set_index(position.record_index);
                Ok(())
            }
            Ok(None) => Ok(()), // past the end; reads yield None
            Err(err) => {
                // Not a chunk boundary (or a corrupt one): fall back to
                // block resynchronization at the nearest block.
                warn!(
                    chunk_begin = position.chunk_begin,
                    error = %err,
                    "seek target is not a valid chunk, resynchronizing"
                );
                self.chunk_reader.seek_recovering(position.chunk_begin)?;
                Ok(())
            }
        }
    }

    /// Position of the next record to be read.
    pub fn pos(&self) -> RecordPosition {
        if self.decoder.index() < self.decoder.num_records() {
            RecordPosition::new(self.chunk_begin, self.decoder.index())
        } else {
            RecordPosition::new(self.chunk_reader.pos(), 0)
        }
    }

    /// Records lost to corrupt chunks whose headers were still readable.
    pub fn skipped_records(&self) -> u64 {
        self.skipped_records
    }

    /// Corruption events skipped at the framing layer.
    pub fn corrupted_chunks(&self) -> u64 {
        self.chunk_reader.recoverable_corruptions()
    }

    /// File-metadata payload, once reading has passed the metadata chunk.
    pub fn metadata(&self) -> Option<&Chain> {
        self.metadata.as_ref()
    }

    /// Buckets decompressed for the current chunk; meaningful after
    /// reading from a transpose chunk under a field filter.
    pub fn bucket_decompressions(&self) -> u64 {
        self.decoder.bucket_decompressions()
    }
}
