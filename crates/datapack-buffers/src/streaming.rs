//! Chunk-fed byte source for reading across chunk boundaries.

use std::collections::VecDeque;

use crate::{BufferError, Source};

/// A byte source fed incrementally with chunks of input.
///
/// For performance, chunks are not merged into a single buffer; reads
/// cross chunk boundaries as needed. Consumed chunks are dropped, so a
/// long-running feed does not accumulate memory.
#[derive(Default)]
pub struct StreamingByteSource {
    chunks: VecDeque<Vec<u8>>,
    /// Cursor within the front chunk.
    x: usize,
    /// Unread bytes across all chunks.
    buffered: usize,
    /// Bytes consumed since creation.
    consumed: u64,
}

impl StreamingByteSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chunk of data to be read.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Returns the number of bytes remaining to be read.
    pub fn size(&self) -> usize {
        self.buffered
    }

    fn advance(&mut self, mut n: usize) {
        self.buffered -= n;
        self.consumed += n as u64;
        while n > 0 {
            let front_len = match self.chunks.front() {
                Some(front) => front.len(),
                None => return,
            };
            let available = front_len - self.x;
            if available > n {
                self.x += n;
                return;
            }
            n -= available;
            self.chunks.pop_front();
            self.x = 0;
        }
    }
}

impl Source for StreamingByteSource {
    fn peek(&mut self) -> Option<u8> {
        self.chunks.front().map(|chunk| chunk[self.x])
    }

    fn read_u8(&mut self) -> Result<u8, BufferError> {
        let byte = self.peek().ok_or(BufferError::EndOfBuffer)?;
        self.advance(1);
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), BufferError> {
        if buf.len() > self.buffered {
            return Err(BufferError::EndOfBuffer);
        }
        let mut filled = 0;
        let mut chunk_idx = 0;
        let mut local_x = self.x;
        while filled < buf.len() {
            let chunk = &self.chunks[chunk_idx];
            let take = (chunk.len() - local_x).min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&chunk[local_x..local_x + take]);
            filled += take;
            chunk_idx += 1;
            local_x = 0;
        }
        self.advance(buf.len());
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<(), BufferError> {
        if n > self.buffered {
            return Err(BufferError::EndOfBuffer);
        }
        self.advance(n);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_across_chunks() {
        let mut source = StreamingByteSource::new();
        source.push(vec![1, 2]);
        source.push(vec![3, 4]);
        assert_eq!(source.read_u8(), Ok(1));
        let mut buf = [0u8; 3];
        source.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4]);
        assert_eq!(source.read_u8(), Err(BufferError::EndOfBuffer));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut source = StreamingByteSource::new();
        source.push(vec![42, 43]);
        assert_eq!(source.peek(), Some(42));
        assert_eq!(source.peek(), Some(42));
        assert_eq!(source.read_u8(), Ok(42));
        assert_eq!(source.peek(), Some(43));
    }

    #[test]
    fn test_skip_and_position() {
        let mut source = StreamingByteSource::new();
        source.push(vec![1, 2, 3]);
        source.push(vec![4, 5]);
        source.skip(4).unwrap();
        assert_eq!(source.position(), 4);
        assert_eq!(source.read_u8(), Ok(5));
        assert_eq!(source.position(), 5);
        assert_eq!(source.skip(1), Err(BufferError::EndOfBuffer));
    }

    #[test]
    fn test_feed_after_drain() {
        let mut source = StreamingByteSource::new();
        source.push(vec![1]);
        assert_eq!(source.read_u8(), Ok(1));
        assert!(source.is_eof());
        source.push(vec![2]);
        assert_eq!(source.read_u8(), Ok(2));
        assert_eq!(source.position(), 2);
    }

    #[test]
    fn test_empty_chunks_ignored() {
        let mut source = StreamingByteSource::new();
        source.push(Vec::new());
        source.push(vec![7]);
        assert_eq!(source.size(), 1);
        assert_eq!(source.read_u8(), Ok(7));
    }

    #[test]
    fn test_read_append() {
        let mut source = StreamingByteSource::new();
        source.push(vec![1, 2]);
        source.push(vec![3]);
        let mut out = Vec::new();
        source.read_append(3, &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }
}
