//! Configuration
//!
//! ## CompressorOptions
//!
//! Selects the codec and its tuning for chunk bodies:
//!
//! - **compression_type**: none, brotli (default), or zstd
//! - **compression_level**: brotli 0..=11 (default 9), zstd 1..=22 (default 9)
//! - **window_log**: LZ77 window log, `-1` keeps the codec default;
//!   brotli 10..=30, zstd 10..=31
//!
//! The text form understood by [`CompressorOptions::parse`]:
//!
//! ```text
//! options    ::= option? ("," option?)*
//! option     ::= "uncompressed"
//!             | "brotli" (":" int)?
//!             | "zstd" (":" int)?
//!             | "window_log" ":" ("auto" | int)
//! ```
//!
//! ## RecordWriterOptions / RecordReaderOptions
//!
//! Writer: chunk rolling threshold, codec, Simple-vs-Transpose, padding,
//! parallel encoder count, optional metadata payload. Reader: corruption
//! skipping and field filtering.

use serde::{Deserialize, Serialize};

use chunkstream_core::{Chain, CompressionType, Error, Result};

use crate::chunk::field_filter::FieldFilter;

pub const MIN_BROTLI_LEVEL: i32 = 0;
pub const MAX_BROTLI_LEVEL: i32 = 11;
pub const DEFAULT_BROTLI_LEVEL: i32 = 9;

pub const MIN_ZSTD_LEVEL: i32 = 1;
pub const MAX_ZSTD_LEVEL: i32 = 22;
pub const DEFAULT_ZSTD_LEVEL: i32 = 9;

pub const MIN_WINDOW_LOG: i32 = 10;
pub const MAX_BROTLI_WINDOW_LOG: i32 = 30;
pub const MAX_ZSTD_WINDOW_LOG: i32 = 31;

/// Sentinel: keep the codec's own default window.
pub const DEFAULT_WINDOW_LOG: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressorOptions {
    compression_type: CompressionType,
    compression_level: i32,
    window_log: i32,
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self {
            compression_type: CompressionType::Brotli,
            compression_level: DEFAULT_BROTLI_LEVEL,
            window_log: DEFAULT_WINDOW_LOG,
        }
    }
}

impl CompressorOptions {
    pub fn uncompressed() -> Self {
        Self {
            compression_type: CompressionType::None,
            compression_level: 0,
            window_log: DEFAULT_WINDOW_LOG,
        }
    }

    pub fn brotli(level: i32) -> Result<Self> {
        if !(MIN_BROTLI_LEVEL..=MAX_BROTLI_LEVEL).contains(&level) {
            return Err(Error::InvalidOptions(format!(
                "brotli level out of range: {level}"
            )));
        }
        Ok(Self {
            compression_type: CompressionType::Brotli,
            compression_level: level,
            window_log: DEFAULT_WINDOW_LOG,
        })
    }

    pub fn zstd(level: i32) -> Result<Self> {
        if !(MIN_ZSTD_LEVEL..=MAX_ZSTD_LEVEL).contains(&level) {
            return Err(Error::InvalidOptions(format!(
                "zstd level out of range: {level}"
            )));
        }
        Ok(Self {
            compression_type: CompressionType::Zstd,
            compression_level: level,
            window_log: DEFAULT_WINDOW_LOG,
        })
    }

    pub fn with_window_log(mut self, window_log: i32) -> Result<Self> {
        if window_log != DEFAULT_WINDOW_LOG {
            let max = match self.compression_type {
                CompressionType::None => {
                    return Err(Error::InvalidOptions(
                        "window_log requires a compression algorithm".to_string(),
                    ));
                }
                CompressionType::Brotli => MAX_BROTLI_WINDOW_LOG,
                CompressionType::Zstd => MAX_ZSTD_WINDOW_LOG,
            };
            if !(MIN_WINDOW_LOG..=max).contains(&window_log) {
                return Err(Error::InvalidOptions(format!(
                    "window_log out of range: {window_log}"
                )));
            }
        }
        self.window_log = window_log;
        Ok(self)
    }

    /// Parses the option text grammar documented at module level.
    pub fn parse(text: &str) -> Result<Self> {
        let mut options = Self::default();
        let mut window_log = DEFAULT_WINDOW_LOG;
        for option in text.split(',') {
            let option = option.trim();
            if option.is_empty() {
                continue;
            }
            let (name, value) = match option.split_once(':') {
                Some((name, value)) => (name.trim(), Some(value.trim())),
                None => (option, None),
            };
            match (name, value) {
                ("uncompressed", None) => options = Self::uncompressed(),
                ("brotli", None) => options = Self::brotli(DEFAULT_BROTLI_LEVEL)?,
                ("brotli", Some(level)) => options = Self::brotli(parse_int(level)?)?,
                ("zstd", None) => options = Self::zstd(DEFAULT_ZSTD_LEVEL)?,
                ("zstd", Some(level)) => options = Self::zstd(parse_int(level)?)?,
                ("window_log", Some("auto")) => window_log = DEFAULT_WINDOW_LOG,
                ("window_log", Some(log)) => window_log = parse_int(log)?,
                _ => {
                    return Err(Error::InvalidOptions(format!(
                        "unknown option: {option:?}"
                    )));
                }
            }
        }
        options.with_window_log(window_log)
    }

    pub fn compression_type(&self) -> CompressionType {
        self.compression_type
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    pub fn window_log(&self) -> i32 {
        self.window_log
    }
}

fn parse_int(text: &str) -> Result<i32> {
    text.parse()
        .map_err(|_| Error::InvalidOptions(format!("expected an integer, got {text:?}")))
}

/// Options for [`crate::RecordWriter`].
#[derive(Debug, Clone, Default)]
pub struct RecordWriterOptions {
    /// Roll a chunk once its decoded size reaches this many bytes
    /// (default: 1 MiB).
    pub desired_chunk_size: u64,

    /// Codec for chunk bodies.
    pub compressor: CompressorOptions,

    /// Use the Transpose encoder instead of Simple.
    pub transpose: bool,

    /// Pad to a 64 KiB block boundary on flush, trading space for
    /// cheaper downstream seeks.
    pub pad_to_block_boundary: bool,

    /// Number of parallel encoder workers; 0 encodes on the caller's thread.
    pub parallelism: usize,

    /// Payload for an optional file-metadata chunk written after the
    /// signature.
    pub metadata: Option<Chain>,
}

impl RecordWriterOptions {
    pub fn new() -> Self {
        Self {
            desired_chunk_size: 1 << 20,
            compressor: CompressorOptions::default(),
            transpose: false,
            pad_to_block_boundary: false,
            parallelism: 0,
            metadata: None,
        }
    }

    pub(crate) fn effective_chunk_size(&self) -> u64 {
        if self.desired_chunk_size == 0 {
            1 << 20
        } else {
            self.desired_chunk_size
        }
    }
}

/// Options for [`crate::RecordReader`].
#[derive(Debug, Clone, Default)]
pub struct RecordReaderOptions {
    /// Skip over corrupt chunks instead of failing, counting the skipped
    /// records.
    pub skip_errors: bool,

    /// Field paths the caller needs; lets the Transpose decoder skip
    /// unrelated buckets.
    pub field_filter: FieldFilter,
}
