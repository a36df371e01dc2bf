//! Error Types for Chunkstream
//!
//! This module defines all error types that can occur while reading or
//! writing chunkstream files.
//!
//! ## Error Categories
//!
//! ### Data Integrity Errors
//! - `Corruption`: failed header/data/block hash, unknown chunk type,
//!   varint overflow, decoded size mismatch, unsorted record limits,
//!   implicit state-machine loop
//!
//! ### Codec Errors
//! - `Compression`: failed to compress data
//! - `Decompression`: failed to decompress data (likely corruption)
//!
//! ### Size / Overflow Errors
//! - `RecordTooLarge`: a single record exceeds the 2 GiB protobuf limit
//! - `TooManyRecords`: record count would overflow u64
//! - `SizeOverflow`: a byte position or decoded size would overflow
//!
//! ### Lifecycle Errors
//! - `Failed`: replay of a latched failure on an already-failed object
//! - `Closed`: operation on a closed object
//!
//! ## Usage
//! All fallible functions return `Result<T>` which is aliased to
//! `Result<T, Error>`, so `?` propagation works throughout. I/O errors from
//! an underlying sink or source convert via `#[from]` and failures of inner
//! objects are chained as `"<outer>: <inner>"` (see `Error::context`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted file: {0}")]
    Corruption(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("record too large: {0} bytes exceeds the 2 GiB limit")]
    RecordTooLarge(u64),

    #[error("too many records")]
    TooManyRecords,

    #[error("size overflow: {0}")]
    SizeOverflow(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("{0}")]
    Failed(String),

    #[error("object is closed")]
    Closed,
}

impl Error {
    /// Prefixes the message with outer context, keeping the kind.
    ///
    /// Used when a failure of an inner object poisons an outer one, so the
    /// outer message reads `"<outer>: <inner>"`.
    pub fn context(self, outer: &str) -> Error {
        match self {
            Error::Io(e) => Error::Failed(format!("{outer}: IO error: {e}")),
            Error::Corruption(m) => Error::Corruption(format!("{outer}: {m}")),
            Error::Compression(m) => Error::Compression(format!("{outer}: {m}")),
            Error::Decompression(m) => Error::Decompression(format!("{outer}: {m}")),
            other => Error::Failed(format!("{outer}: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_corruption_kind() {
        let err = Error::Corruption("chunk data hash mismatch".to_string());
        let chained = err.context("reading chunk at 65536");
        match chained {
            Error::Corruption(m) => {
                assert!(m.contains("reading chunk at 65536"));
                assert!(m.contains("chunk data hash mismatch"));
            }
            other => panic!("expected Corruption, got {other:?}"),
        }
    }

    #[test]
    fn test_display_contains_payload() {
        let err = Error::RecordTooLarge(3 << 30);
        let msg = format!("{}", err);
        assert!(msg.contains(&(3u64 << 30).to_string()));
    }

    #[test]
    fn test_io_error_converts() {
        fn read() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
            Ok(())
        }
        assert!(matches!(read(), Err(Error::Io(_))));
    }
}
