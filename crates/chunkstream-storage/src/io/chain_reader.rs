//! Seekable reader over a Chain.
//!
//! The window is always a suffix of the current block, so reads within a
//! block are zero-copy slices of the shared storage.

use bytes::Bytes;
use chunkstream_core::{Chain, Error, Result};

use super::{Reader, SeekableReader};

pub struct ChainReader {
    blocks: Vec<Bytes>,
    len: u64,
    block_index: usize,
    /// Offset within the current block.
    offset: usize,
    pos: u64,
}

impl ChainReader {
    pub fn new(chain: Chain) -> Self {
        let len = chain.len() as u64;
        let blocks: Vec<Bytes> = chain.blocks().cloned().collect();
        Self {
            blocks,
            len,
            block_index: 0,
            offset: 0,
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.len
    }
}

impl Reader for ChainReader {
    fn pull(&mut self) -> Result<bool> {
        while self.block_index < self.blocks.len() {
            if self.offset < self.blocks[self.block_index].len() {
                return Ok(true);
            }
            self.block_index += 1;
            self.offset = 0;
        }
        Ok(false)
    }

    fn window(&self) -> &[u8] {
        match self.blocks.get(self.block_index) {
            Some(block) => &block[self.offset..],
            None => &[],
        }
    }

    fn advance(&mut self, n: usize) {
        assert!(n <= self.available(), "advance past reader window");
        self.offset += n;
        self.pos += n as u64;
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn read(&mut self, n: usize) -> Result<Bytes> {
        // Zero-copy when the range lies within the current block.
        if self.available() >= n {
            let block = &self.blocks[self.block_index];
            let out = block.slice(self.offset..self.offset + n);
            self.advance(n);
            return Ok(out);
        }
        Ok(self.read_chain(n)?.to_bytes())
    }

    fn read_chain(&mut self, n: usize) -> Result<Chain> {
        if self.len - self.pos < n as u64 {
            return Err(Error::Corruption("unexpected end of data".to_string()));
        }
        let mut out = Chain::new();
        let mut remaining = n;
        while remaining > 0 {
            if !self.pull()? {
                return Err(Error::Corruption("unexpected end of data".to_string()));
            }
            let block = &self.blocks[self.block_index];
            let take = remaining.min(block.len() - self.offset);
            out.append(block.slice(self.offset..self.offset + take));
            self.advance(take);
            remaining -= take;
        }
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.len - self.pos < n as u64 {
            return Err(Error::Corruption("unexpected end of data".to_string()));
        }
        self.seek(self.pos + n as u64)
    }
}

impl SeekableReader for ChainReader {
    fn seek(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(Error::Corruption(format!(
                "seek past end of data: {pos} > {}",
                self.len
            )));
        }
        self.block_index = 0;
        self.offset = 0;
        self.pos = 0;
        let mut remaining = pos;
        while remaining > 0 {
            let block_len = self.blocks[self.block_index].len() as u64;
            if remaining < block_len {
                self.offset = remaining as usize;
                self.pos += remaining;
                return Ok(());
            }
            remaining -= block_len;
            self.pos += block_len;
            self.block_index += 1;
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.len
    }
}

impl std::io::Read for ChainReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() || self.at_end() {
            return Ok(0);
        }
        if self.available() == 0
            && !Reader::pull(self).map_err(|e| std::io::Error::other(e.to_string()))?
        {
            return Ok(0);
        }
        let n = buf.len().min(self.available());
        buf[..n].copy_from_slice(&self.window()[..n]);
        Reader::advance(self, n);
        Ok(n)
    }
}
