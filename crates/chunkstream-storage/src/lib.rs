//! Chunkstream Storage Engine
//!
//! This crate implements the chunkstream file format on top of the core
//! types: byte pipelines with cursor windows, the compressor/decompressor,
//! the Simple and Transpose chunk codecs, 64 KiB block framing with
//! hash-verified recovery, and the record-level writer/reader.
//!
//! ## Layer map
//!
//! ```text
//! RecordWriter / RecordReader      (record/)
//!         |
//! ChunkWriter / ChunkReader        (framing/)   block headers, recovery
//!         |
//! ChunkEncoder / ChunkDecoder      (chunk/)     Simple, Transpose
//!         |
//! Compressor / Decompressor        (compress/)  none, brotli, zstd
//!         |
//! Writer / Reader / BackwardWriter (io/)        cursor-window pipelines
//! ```

pub mod chunk;
pub mod compress;
pub mod config;
pub mod framing;
pub mod hash;
pub mod io;
pub mod record;

pub use chunk::{Chunk, ChunkDecoder, ChunkHeader, SimpleEncoder, TransposeEncoder};
pub use chunk::field_filter::FieldFilter;
pub use config::{CompressorOptions, RecordReaderOptions, RecordWriterOptions};
pub use framing::{ChunkReader, ChunkWriter};
pub use record::{RecordReader, RecordWriter};
