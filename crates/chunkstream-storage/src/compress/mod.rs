//! Compression Layer
//!
//! Chunk bodies carry two kinds of compressed blobs (record sizes and record
//! values, or transpose header and buckets). Every blob shares one layout:
//!
//! ```text
//! uncompressed:  raw bytes
//! compressed:    decoded_size:varint || codec_stream
//! ```
//!
//! The decoded-size prefix lets the decompressor size its output and lets
//! callers validate decoded sizes without running the codec.
//!
//! The codec set is fixed by the format: none, brotli, zstd. [`Compressor`]
//! stages uncompressed bytes in a chain and runs the codec when the blob is
//! finalized, the same compress-on-flush shape as block-oriented segment
//! writers; [`decompress`] is its inverse with exact-size verification.

mod compressor;
mod decompressor;

pub use compressor::Compressor;
pub use decompressor::decompress;
