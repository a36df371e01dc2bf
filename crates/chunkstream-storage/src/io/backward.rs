//! Backward writer into an in-memory Chain.
//!
//! Fills window blocks from their high end downward and prepends frozen
//! blocks to the chain, so the finished chain reads forward while having
//! been produced back to front.

use bytes::BytesMut;
use chunkstream_core::{Chain, ObjectStatus, Result};

use super::BackwardWriter;

const WINDOW_LEN: usize = 4096;

pub struct ChainBackwardWriter {
    status: ObjectStatus,
    dest: Chain,
    /// Window storage; bytes at `cursor..` are committed.
    buf: BytesMut,
    cursor: usize,
    /// Position corresponding to the bytes already in `dest`.
    start_pos: u64,
}

impl ChainBackwardWriter {
    pub fn new() -> Self {
        Self {
            status: ObjectStatus::new(),
            dest: Chain::new(),
            buf: BytesMut::new(),
            cursor: 0,
            start_pos: 0,
        }
    }

    fn sync(&mut self) {
        let written = self.buf.len() - self.cursor;
        if written > 0 {
            let filled = self.buf.split_off(self.cursor).freeze();
            self.start_pos += filled.len() as u64;
            self.dest.prepend(filled);
        }
        // What remains of buf is entirely free window.
        self.cursor = self.buf.len();
    }

    /// Prepends an entire chain without copying its blocks.
    pub fn write_chain_owned(&mut self, src: Chain) -> Result<()> {
        self.status.check()?;
        self.sync();
        self.start_pos += src.len() as u64;
        self.dest.prepend_chain(src);
        Ok(())
    }

    /// Closes the writer and returns the accumulated chain.
    pub fn into_chain(mut self) -> Chain {
        self.sync();
        self.status.mark_closed();
        std::mem::take(&mut self.dest)
    }
}

impl Default for ChainBackwardWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BackwardWriter for ChainBackwardWriter {
    fn push(&mut self) -> Result<()> {
        self.status.check()?;
        if self.cursor == 0 {
            self.sync();
            if self.buf.is_empty() {
                self.buf.resize(WINDOW_LEN, 0);
                self.cursor = WINDOW_LEN;
            }
        }
        Ok(())
    }

    fn available(&self) -> usize {
        self.cursor
    }

    fn buffer(&mut self) -> &mut [u8] {
        let cursor = self.cursor;
        &mut self.buf[..cursor]
    }

    fn advance(&mut self, n: usize) {
        assert!(n <= self.cursor, "advance past backward writer window");
        self.cursor -= n;
    }

    fn pos(&self) -> u64 {
        self.start_pos + (self.buf.len() - self.cursor) as u64
    }

    fn close(&mut self) -> Result<()> {
        if self.status.closed() {
            return Ok(());
        }
        self.sync();
        self.status.mark_closed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_prepend_order_reads_forward() {
        let mut writer = ChainBackwardWriter::new();
        writer.write(b" world").unwrap();
        writer.write(b"hello").unwrap();
        assert_eq!(writer.pos(), 11);
        assert_eq!(
            writer.into_chain().to_bytes(),
            Bytes::from_static(b"hello world")
        );
    }

    #[test]
    fn test_window_cursor_moves_downward() {
        let mut writer = ChainBackwardWriter::new();
        writer.push().unwrap();
        let window = writer.buffer();
        let len = window.len();
        window[len - 3..].copy_from_slice(b"xyz");
        writer.advance(3);
        assert_eq!(writer.pos(), 3);
        assert_eq!(writer.into_chain().to_bytes(), Bytes::from_static(b"xyz"));
    }

    #[test]
    fn test_large_writes_span_windows() {
        let mut payload = Vec::new();
        for i in 0..(WINDOW_LEN * 2 + 100) {
            payload.push((i % 251) as u8);
        }
        let mut writer = ChainBackwardWriter::new();
        // Prepend in two halves: second half first.
        let mid = payload.len() / 2;
        writer.write(&payload[mid..]).unwrap();
        writer.write(&payload[..mid]).unwrap();
        assert_eq!(writer.pos(), payload.len() as u64);
        assert_eq!(writer.into_chain().to_bytes(), Bytes::from(payload));
    }

    #[test]
    fn test_write_chain_owned_prepends() {
        let mut writer = ChainBackwardWriter::new();
        writer.write(b"-tail").unwrap();
        writer
            .write_chain_owned(Chain::from(&b"head"[..]))
            .unwrap();
        assert_eq!(writer.into_chain().to_bytes(), Bytes::from_static(b"head-tail"));
    }

    #[test]
    fn test_pos_starts_at_zero_and_grows() {
        let mut writer = ChainBackwardWriter::new();
        assert_eq!(writer.pos(), 0);
        writer.write(b"abc").unwrap();
        assert_eq!(writer.pos(), 3);
        writer.write(b"de").unwrap();
        assert_eq!(writer.pos(), 5);
    }
}
