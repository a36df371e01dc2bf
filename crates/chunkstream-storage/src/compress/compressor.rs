//! Blob compressor.

use brotli::enc::BrotliEncoderParams;
use chunkstream_core::{Chain, CompressionType, Error, Result};

use crate::config::CompressorOptions;
use crate::io::{write_varint64, ChainReader, ChainWriter, FlushPolicy, Writer};

/// Accumulates one blob's uncompressed bytes and encodes them on close.
///
/// Callers write through [`Compressor::writer`]; `pos()` of that writer is
/// the decoded size. [`Compressor::encode_and_close`] emits the blob in the
/// on-disk layout (decoded-size varint prefix when compressed).
pub struct Compressor {
    options: CompressorOptions,
    staged: ChainWriter,
}

impl Compressor {
    pub fn new(options: CompressorOptions) -> Self {
        Self {
            options,
            staged: ChainWriter::new(),
        }
    }

    /// The writer callers stream uncompressed bytes into.
    pub fn writer(&mut self) -> &mut ChainWriter {
        &mut self.staged
    }

    /// Uncompressed bytes staged so far.
    pub fn decoded_size(&self) -> u64 {
        self.staged.pos()
    }

    /// Compresses the staged bytes into `dest` and consumes the compressor.
    pub fn encode_and_close<W: Writer + ?Sized>(mut self, dest: &mut W) -> Result<()> {
        self.staged.flush(FlushPolicy::FromObject)?;
        let decoded_size = self.staged.pos();
        let staged = self.staged.into_chain();

        match self.options.compression_type() {
            CompressionType::None => dest.write_chain_owned(staged),
            CompressionType::Brotli => {
                write_varint64(dest, decoded_size)?;
                let mut params = BrotliEncoderParams {
                    quality: self.options.compression_level(),
                    ..Default::default()
                };
                if self.options.window_log() >= 0 {
                    params.lgwin = self.options.window_log();
                }
                let mut src = ChainReader::new(staged);
                let mut sink = WriterSink(dest);
                brotli::BrotliCompress(&mut src, &mut sink, &params)
                    .map_err(|e| Error::Compression(format!("brotli: {e}")))?;
                Ok(())
            }
            CompressionType::Zstd => {
                write_varint64(dest, decoded_size)?;
                let sink = WriterSink(dest);
                let mut encoder =
                    zstd::stream::write::Encoder::new(sink, self.options.compression_level())
                        .map_err(|e| Error::Compression(format!("zstd: {e}")))?;
                if self.options.window_log() >= 0 {
                    encoder
                        .window_log(self.options.window_log() as u32)
                        .map_err(|e| Error::Compression(format!("zstd: {e}")))?;
                }
                let mut src = ChainReader::new(staged);
                std::io::copy(&mut src, &mut encoder)
                    .map_err(|e| Error::Compression(format!("zstd: {e}")))?;
                encoder
                    .finish()
                    .map_err(|e| Error::Compression(format!("zstd: {e}")))?;
                Ok(())
            }
        }
    }

    /// Convenience: encodes into a fresh chain.
    pub fn encode_and_close_to_chain(self) -> Result<Chain> {
        let mut dest = ChainWriter::new();
        self.encode_and_close(&mut dest)?;
        Ok(dest.into_chain())
    }
}

/// `std::io::Write` adapter over a [`Writer`], for driving codec streams.
struct WriterSink<'a, W: Writer + ?Sized>(&'a mut W);

impl<W: Writer + ?Sized> std::io::Write for WriterSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .write(buf)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0
            .flush(FlushPolicy::FromBuffer)
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}
