//! Blob decompressor.

use std::io::Read;

use chunkstream_core::{Chain, CompressionType, Error, Result};

use crate::io::{read_varint64, ChainReader};

/// Decodes one blob produced by [`crate::compress::Compressor`].
///
/// For compressed blobs the leading varint carries the decoded size; the
/// output is verified to match it exactly. `expected_decoded_size`
/// cross-checks against the size recorded elsewhere (e.g. a chunk header)
/// before the codec runs.
pub fn decompress(
    compression: CompressionType,
    src: Chain,
    expected_decoded_size: Option<u64>,
) -> Result<Chain> {
    if compression == CompressionType::None {
        if let Some(expected) = expected_decoded_size {
            if src.len() as u64 != expected {
                return Err(Error::Corruption(format!(
                    "decoded size mismatch: expected {expected}, got {}",
                    src.len()
                )));
            }
        }
        return Ok(src);
    }

    let mut reader = ChainReader::new(src);
    let decoded_size = read_varint64(&mut reader)?;
    if let Some(expected) = expected_decoded_size {
        if decoded_size != expected {
            return Err(Error::Corruption(format!(
                "decoded size mismatch: expected {expected}, got {decoded_size}"
            )));
        }
    }
    if decoded_size >= usize::MAX as u64 {
        return Err(Error::SizeOverflow(format!(
            "decoded size does not fit in memory: {decoded_size}"
        )));
    }

    // Cap the read at decoded_size + 1 so oversized streams are detected
    // without decoding them fully.
    let mut out = Vec::with_capacity((decoded_size as usize).min(64 << 20));
    let read_result = match compression {
        CompressionType::None => unreachable!(),
        CompressionType::Brotli => brotli::Decompressor::new(reader, 4096)
            .take(decoded_size + 1)
            .read_to_end(&mut out),
        CompressionType::Zstd => {
            let mut decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| Error::Decompression(format!("zstd: {e}")))?;
            decoder
                .window_log_max(31)
                .map_err(|e| Error::Decompression(format!("zstd: {e}")))?;
            decoder.take(decoded_size + 1).read_to_end(&mut out)
        }
    };
    read_result.map_err(|e| Error::Decompression(e.to_string()))?;

    if out.len() as u64 != decoded_size {
        return Err(Error::Corruption(format!(
            "decoded size mismatch: expected {decoded_size}, got {}",
            out.len()
        )));
    }
    Ok(Chain::from(out))
}
