//! Writer into an in-memory Chain.
//!
//! The window is a `BytesMut` block; filled portions are frozen into the
//! chain zero-copy, and owned chains splice in without touching the bytes.

use bytes::BytesMut;
use chunkstream_core::{Chain, ObjectStatus, Result};

use super::{FlushPolicy, Writer};

const WINDOW_LEN: usize = 4096;

pub struct ChainWriter {
    status: ObjectStatus,
    dest: Chain,
    /// Window storage; `written` bytes at the front are committed.
    buf: BytesMut,
    written: usize,
    /// Position corresponding to the end of `dest`.
    start_pos: u64,
}

impl ChainWriter {
    pub fn new() -> Self {
        Self::with_chain(Chain::new())
    }

    /// Appends to an existing chain.
    pub fn with_chain(dest: Chain) -> Self {
        let start_pos = dest.len() as u64;
        Self {
            status: ObjectStatus::new(),
            dest,
            buf: BytesMut::new(),
            written: 0,
            start_pos,
        }
    }

    /// Moves committed window bytes into the chain.
    fn sync(&mut self) {
        if self.written > 0 {
            let filled = self.buf.split_to(self.written).freeze();
            self.start_pos += filled.len() as u64;
            self.dest.append(filled);
            self.written = 0;
        }
    }

    /// Closes the writer and returns the accumulated chain.
    pub fn into_chain(mut self) -> Chain {
        self.sync();
        self.status.mark_closed();
        std::mem::take(&mut self.dest)
    }

    pub fn healthy(&self) -> bool {
        self.status.healthy()
    }
}

impl Default for ChainWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer for ChainWriter {
    fn push(&mut self) -> Result<()> {
        self.status.check()?;
        if self.written == self.buf.len() {
            self.sync();
            self.buf.resize(WINDOW_LEN, 0);
        }
        Ok(())
    }

    fn available(&self) -> usize {
        self.buf.len() - self.written
    }

    fn buffer(&mut self) -> &mut [u8] {
        let written = self.written;
        &mut self.buf[written..]
    }

    fn advance(&mut self, n: usize) {
        assert!(n <= self.available(), "advance past writer window");
        self.written += n;
    }

    fn pos(&self) -> u64 {
        self.start_pos + self.written as u64
    }

    fn flush(&mut self, _policy: FlushPolicy) -> Result<()> {
        self.status.check()?;
        self.sync();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.status.closed() {
            return Ok(());
        }
        self.sync();
        self.status.mark_closed();
        Ok(())
    }

    fn write_chain_owned(&mut self, src: Chain) -> Result<()> {
        self.status.check()?;
        self.sync();
        // Unwritten window space stays in buf for the next push.
        self.start_pos += src.len() as u64;
        self.dest.append_chain(src);
        Ok(())
    }
}

impl std::io::Write for ChainWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Writer::write(self, buf)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Writer::flush(self, FlushPolicy::FromBuffer)
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}
