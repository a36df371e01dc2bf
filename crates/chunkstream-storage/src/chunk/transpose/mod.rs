//! Transpose Chunk Codec
//!
//! Protobuf messages of a common schema repeat the same tag sequences.
//! The transpose codec shreds each record's wire format into per-tag
//! **buffers** so the compressor sees all values of one field together,
//! which compresses far better than per-record concatenation.
//!
//! ## Container layout (after the `0x74` chunk type byte)
//!
//! ```text
//! compression_type : u8
//! header_len       : varint     // compressed header blob length
//! header_blob      : bytes      // compressed like any blob
//! bucket_blob*                  // concatenated, lengths in the header
//! ```
//!
//! Decoded header:
//!
//! ```text
//! num_buckets      : varint
//! bucket_len*      : varint                    // compressed bucket lengths
//! num_buffers      : varint
//! (bucket_index:varint, decoded_len:varint)*   // per buffer
//! num_nodes        : varint
//! node*                                        // see Node encoding below
//! ```
//!
//! Buffer 0 is the **transition stream**: a varint token sequence driving a
//! state machine of **nodes**. Token `0` ends a record; token `k ≥ 1`
//! executes node `k-1`. Records appear last-first and each record's tokens
//! are its reversed field walk, with submessage-end before the reversed
//! children and submessage-start after. The decoder replays tokens in
//! stream order into a backward writer, so the output reads forward and
//! every submessage length is known exactly when its start token arrives.
//!
//! Value buffers hold, per occurrence: raw varint bytes (Varint), fixed
//! 4/8-byte values (Fixed32/64), or a lengths buffer plus a data buffer
//! (Bytes, NonProto). Records that are not valid wire format are stored
//! whole through a NonProto node.
//!
//! Buckets group buffers for compression: bucket 0 carries the transition
//! stream and NonProto buffers, and each top-level field number gets its
//! own bucket, so field filtering can leave unrelated buckets compressed.

mod encoder;
pub(crate) mod decoder;

pub use decoder::TransposeDecoder;
pub use encoder::TransposeEncoder;

use chunkstream_core::{Error, Result};

/// Buffer index of the transition stream.
pub(crate) const TRANSITIONS_BUFFER: u32 = 0;

/// Submessage nesting bound for the encoder's shredding walk.
pub(crate) const MAX_SHRED_DEPTH: usize = 100;

pub(crate) const WIRE_VARINT: u32 = 0;
pub(crate) const WIRE_FIXED64: u32 = 1;
pub(crate) const WIRE_LENGTH_DELIMITED: u32 = 2;
pub(crate) const WIRE_FIXED32: u32 = 5;

pub(crate) fn key_field(key: u32) -> u32 {
    key >> 3
}

pub(crate) fn key_wire_type(key: u32) -> u32 {
    key & 7
}

/// State machine node callback kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub(crate) enum NodeKind {
    /// Copy one raw varint value from the buffer, emit key + value.
    Varint = 1,
    /// Copy 4 bytes, emit key + value.
    Fixed32 = 2,
    /// Copy 8 bytes, emit key + value.
    Fixed64 = 3,
    /// Copy a length (from the lengths buffer) and that many data bytes,
    /// emit key + length + data.
    Bytes = 4,
    /// Close an open submessage: emit key + accumulated length.
    SubmessageStart = 5,
    /// Open a submessage: remember where its bytes end.
    SubmessageEnd = 6,
    /// Copy one whole raw record.
    NonProto = 7,
    /// Do nothing; useful only through implicit chaining.
    NoOp = 8,
}

impl NodeKind {
    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => NodeKind::Varint,
            2 => NodeKind::Fixed32,
            3 => NodeKind::Fixed64,
            4 => NodeKind::Bytes,
            5 => NodeKind::SubmessageStart,
            6 => NodeKind::SubmessageEnd,
            7 => NodeKind::NonProto,
            8 => NodeKind::NoOp,
            _ => {
                return Err(Error::Corruption(format!(
                    "unknown state machine node kind: {value}"
                )));
            }
        })
    }
}

/// One state machine node.
///
/// Encoding: `kind:u8 || implicit_next:varint || kind-specific`, where the
/// kind-specific fields are `parent, tag_key, buffer...` as applicable.
/// `parent` and `implicit_next` store node index + 1 (0 = none/root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub implicit_next: u32,
    pub parent: u32,
    pub tag_key: u32,
    pub buffer: u32,
    pub buffer2: u32,
}

impl Node {
    pub(crate) fn leaf(kind: NodeKind, parent: u32, tag_key: u32) -> Self {
        Self {
            kind,
            implicit_next: 0,
            parent,
            tag_key,
            buffer: 0,
            buffer2: 0,
        }
    }
}
