//! Byte Pipelines
//!
//! Zero-copy buffered stream abstractions. Each pipeline exposes a bounded
//! **cursor window** — a mutable (writers) or shared (readers) slice the
//! caller works in directly, plus an `advance` call that commits progress.
//! The slow path (`push` / `pull`) only runs when the window is exhausted,
//! keeping per-byte virtual dispatch off the hot path.
//!
//! Three shapes:
//! - [`Writer`] — forward sequential writing,
//! - [`Reader`] / [`SeekableReader`] — forward reading, optional random
//!   access,
//! - [`BackwardWriter`] — prepend-only writing, the cursor moving downward.
//!   The transpose codec needs this to emit length-prefixed submessages
//!   without a second pass.
//!
//! Failure is sticky: pipelines latch the first error in their status word
//! and every later operation short-circuits with the same message.

mod backward;
mod chain_reader;
mod chain_writer;

pub use backward::ChainBackwardWriter;
pub use chain_reader::ChainReader;
pub use chain_writer::ChainWriter;

use bytes::Bytes;
use chunkstream_core::varint::MAX_VARINT64_LEN;
use chunkstream_core::{varint, Chain, Error, Result};

/// How deeply `flush` should persist buffered data.
///
/// In-memory pipelines treat every level the same; file-backed destinations
/// map the levels to buffer drain, `flush`, and `sync_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlushPolicy {
    FromBuffer,
    FromObject,
    FromProcess,
    FromMachine,
}

/// Forward byte sink with a cursor window.
pub trait Writer {
    /// Makes at least one byte of window available, or fails.
    fn push(&mut self) -> Result<()>;

    /// Bytes currently available in the window.
    fn available(&self) -> usize;

    /// The cursor window. Write into its front, then call [`advance`].
    ///
    /// [`advance`]: Writer::advance
    fn buffer(&mut self) -> &mut [u8];

    /// Commits `n` bytes written into the window.
    fn advance(&mut self, n: usize);

    /// Byte position: total bytes written through this writer.
    fn pos(&self) -> u64;

    fn flush(&mut self, policy: FlushPolicy) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Writes all of `src`. Fast path copies into the window; the loop over
    /// `push` is the slow path.
    fn write(&mut self, mut src: &[u8]) -> Result<()> {
        while !src.is_empty() {
            if self.available() == 0 {
                self.push()?;
            }
            let n = src.len().min(self.available());
            self.buffer()[..n].copy_from_slice(&src[..n]);
            self.advance(n);
            src = &src[n..];
        }
        Ok(())
    }

    /// Writes a chain block by block.
    fn write_chain(&mut self, src: &Chain) -> Result<()> {
        for block in src.blocks() {
            self.write(block)?;
        }
        Ok(())
    }

    /// Writes an owned chain. Implementations that store chains may splice
    /// blocks instead of copying.
    fn write_chain_owned(&mut self, src: Chain) -> Result<()> {
        self.write_chain(&src)
    }
}

/// Forward byte source with a cursor window.
pub trait Reader {
    /// Makes the window non-empty. `Ok(false)` signals end of data.
    fn pull(&mut self) -> Result<bool>;

    /// The unread front of the current window.
    fn window(&self) -> &[u8];

    /// Consumes `n` bytes of the window.
    fn advance(&mut self, n: usize);

    /// Byte position: total bytes consumed through this reader.
    fn pos(&self) -> u64;

    fn available(&self) -> usize {
        self.window().len()
    }

    /// Reads exactly `n` bytes into an owned buffer.
    fn read(&mut self, n: usize) -> Result<Bytes> {
        let mut out = Vec::with_capacity(n.min(64 * 1024));
        let mut remaining = n;
        while remaining > 0 {
            if self.available() == 0 && !self.pull()? {
                return Err(Error::Corruption("unexpected end of data".to_string()));
            }
            let take = remaining.min(self.available());
            out.extend_from_slice(&self.window()[..take]);
            self.advance(take);
            remaining -= take;
        }
        Ok(Bytes::from(out))
    }

    /// Reads exactly `n` bytes as a chain. Implementations over chains can
    /// share storage instead of copying.
    fn read_chain(&mut self, n: usize) -> Result<Chain> {
        Ok(Chain::from(self.read(n)?))
    }

    /// Skips exactly `n` bytes.
    fn skip(&mut self, n: usize) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            if self.available() == 0 && !self.pull()? {
                return Err(Error::Corruption("unexpected end of data".to_string()));
            }
            let take = remaining.min(self.available());
            self.advance(take);
            remaining -= take;
        }
        Ok(())
    }
}

/// Reader with random access.
pub trait SeekableReader: Reader {
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Total size of the underlying data.
    fn size(&self) -> u64;
}

/// Prepend-only byte sink; the cursor moves downward through the window.
///
/// `buffer()` is the free region; write at its tail, then `advance`.
/// `pos()` grows as bytes are prepended.
pub trait BackwardWriter {
    fn push(&mut self) -> Result<()>;

    fn available(&self) -> usize;

    fn buffer(&mut self) -> &mut [u8];

    fn advance(&mut self, n: usize);

    fn pos(&self) -> u64;

    fn close(&mut self) -> Result<()>;

    /// Prepends all of `src`, processing it from its end so the result reads
    /// forward.
    fn write(&mut self, src: &[u8]) -> Result<()> {
        let mut remaining = src;
        while !remaining.is_empty() {
            if self.available() == 0 {
                self.push()?;
            }
            let n = remaining.len().min(self.available());
            let (head, tail) = remaining.split_at(remaining.len() - n);
            let window = self.buffer();
            let start = window.len() - n;
            window[start..].copy_from_slice(tail);
            self.advance(n);
            remaining = head;
        }
        Ok(())
    }

    /// Prepends a chain, block by block in reverse order.
    fn write_chain(&mut self, src: &Chain) -> Result<()> {
        let blocks: Vec<_> = src.blocks().cloned().collect();
        for block in blocks.iter().rev() {
            self.write(block)?;
        }
        Ok(())
    }
}

/// Writes a u64 varint through a writer.
pub fn write_varint64<W: Writer + ?Sized>(dest: &mut W, value: u64) -> Result<()> {
    let mut buf = [0u8; MAX_VARINT64_LEN];
    let mut cursor = &mut buf[..];
    varint::encode_u64(&mut cursor, value);
    let len = MAX_VARINT64_LEN - cursor.len();
    dest.write(&buf[..len])
}

/// Reads a u64 varint through a reader.
pub fn read_varint64<R: Reader + ?Sized>(src: &mut R) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        if src.available() == 0 && !src.pull()? {
            return Err(Error::Corruption("truncated varint".to_string()));
        }
        let byte = src.window()[0];
        src.advance(1);

        if shift == 63 && byte > 1 {
            return Err(Error::Corruption("varint overflow".to_string()));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::Corruption("varint overflow".to_string()));
        }
    }
}

/// Reads a single byte, failing on end of data.
pub fn read_u8<R: Reader + ?Sized>(src: &mut R) -> Result<u8> {
    if src.available() == 0 && !src.pull()? {
        return Err(Error::Corruption("unexpected end of data".to_string()));
    }
    let byte = src.window()[0];
    src.advance(1);
    Ok(byte)
}
