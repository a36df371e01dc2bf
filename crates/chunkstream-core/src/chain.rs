//! Chain - Segmented Byte Rope
//!
//! A `Chain` is a logically flat byte sequence stored as an ordered list of
//! `bytes::Bytes` blocks. It is the unit of data passed between layers when
//! copying would be wasteful: appending or prepending another `Chain` splices
//! block lists without touching payload bytes, and slicing shares the
//! underlying reference-counted storage.
//!
//! ## Why not one big buffer?
//! Encoders assemble chunk data from independently produced pieces
//! (compressed sizes, compressed values, headers). With a rope those pieces
//! move by pointer; the only full copy happens when a caller explicitly asks
//! for contiguous bytes via [`Chain::to_bytes`].
//!
//! Blocks are immutable once inside a Chain. The owned-write path lives in
//! the byte pipelines, which fill a `BytesMut` window and freeze it into the
//! rope.

use std::collections::VecDeque;

use bytes::Bytes;

/// A logically flat byte sequence stored as shared blocks.
#[derive(Clone, Default)]
pub struct Chain {
    blocks: VecDeque<Bytes>,
    len: usize,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.len = 0;
    }

    /// Appends a block without copying. Empty blocks are dropped.
    pub fn append(&mut self, block: Bytes) {
        if block.is_empty() {
            return;
        }
        self.len += block.len();
        self.blocks.push_back(block);
    }

    /// Appends bytes by copy.
    pub fn append_slice(&mut self, src: &[u8]) {
        self.append(Bytes::copy_from_slice(src));
    }

    /// Splices another chain onto the end without copying payload bytes.
    pub fn append_chain(&mut self, mut src: Chain) {
        self.len += src.len;
        self.blocks.append(&mut src.blocks);
    }

    /// Prepends a block without copying.
    pub fn prepend(&mut self, block: Bytes) {
        if block.is_empty() {
            return;
        }
        self.len += block.len();
        self.blocks.push_front(block);
    }

    /// Splices another chain onto the front without copying payload bytes.
    pub fn prepend_chain(&mut self, src: Chain) {
        for block in src.blocks.into_iter().rev() {
            self.blocks.push_front(block);
        }
        self.len += src.len;
    }

    /// Iterates the blocks in order.
    pub fn blocks(&self) -> impl Iterator<Item = &Bytes> {
        self.blocks.iter()
    }

    /// Flattens into a single contiguous block. Zero-copy when the chain
    /// already consists of exactly one block.
    pub fn to_bytes(&self) -> Bytes {
        if self.blocks.len() == 1 {
            return self.blocks[0].clone();
        }
        let mut out = Vec::with_capacity(self.len);
        for block in &self.blocks {
            out.extend_from_slice(block);
        }
        Bytes::from(out)
    }

    /// Sub-range as a new chain, sharing storage.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, start: usize, end: usize) -> Chain {
        assert!(start <= end && end <= self.len, "chain slice out of bounds");
        let mut out = Chain::new();
        let mut pos = 0usize;
        for block in &self.blocks {
            let block_end = pos + block.len();
            if block_end > start && pos < end {
                let from = start.saturating_sub(pos);
                let to = block.len().min(end - pos);
                out.append(block.slice(from..to));
            }
            pos = block_end;
            if pos >= end {
                break;
            }
        }
        out
    }

    /// Sub-range as contiguous `Bytes`. Zero-copy when the range lies within
    /// a single block.
    pub fn slice_to_bytes(&self, start: usize, end: usize) -> Bytes {
        self.slice(start, end).to_bytes()
    }

    /// Splits off and returns everything from `at` onward, keeping the
    /// first `at` bytes in `self`. Shares storage; only the block
    /// containing `at` is re-sliced.
    ///
    /// Panics if `at > len`.
    pub fn split_off(&mut self, at: usize) -> Chain {
        assert!(at <= self.len, "chain split out of bounds");
        let mut tail = Chain::new();
        let mut keep = Chain::new();
        let mut pos = 0usize;
        for block in self.blocks.drain(..) {
            let block_end = pos + block.len();
            if block_end <= at {
                keep.append(block);
            } else if pos >= at {
                tail.append(block);
            } else {
                keep.append(block.slice(..at - pos));
                tail.append(block.slice(at - pos..));
            }
            pos = block_end;
        }
        *self = keep;
        tail
    }
}

impl From<Bytes> for Chain {
    fn from(block: Bytes) -> Self {
        let mut chain = Chain::new();
        chain.append(block);
        chain
    }
}

impl From<Vec<u8>> for Chain {
    fn from(vec: Vec<u8>) -> Self {
        Chain::from(Bytes::from(vec))
    }
}

impl From<&[u8]> for Chain {
    fn from(src: &[u8]) -> Self {
        Chain::from(Bytes::copy_from_slice(src))
    }
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Chain {}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.len)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
