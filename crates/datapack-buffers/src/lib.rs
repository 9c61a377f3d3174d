//! Binary buffer readers and the byte-source abstraction used by the
//! datapack streaming codecs.

mod reader;
mod streaming;

pub use reader::Reader;
pub use streaming::StreamingByteSource;

use thiserror::Error;

/// Error type for buffer read operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

/// A byte stream consumed left to right by a streaming decoder.
///
/// Short reads surface as [`BufferError::EndOfBuffer`]; there is no seeking
/// and no way to push bytes back other than [`Source::peek`].
pub trait Source {
    /// Returns the next byte without consuming it, or `None` at end of input.
    fn peek(&mut self) -> Option<u8>;

    /// Consumes and returns one byte.
    fn read_u8(&mut self) -> Result<u8, BufferError>;

    /// Fills `buf` completely from the stream.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), BufferError>;

    /// Discards `n` bytes.
    fn skip(&mut self, n: usize) -> Result<(), BufferError>;

    /// Number of bytes consumed so far.
    fn position(&self) -> u64;

    /// Appends exactly `len` bytes to `out`.
    ///
    /// The default implementation grows `out` in bounded steps so that a
    /// hostile length prefix cannot force a huge allocation before the
    /// stream runs dry. On error `out` is restored to its original length.
    fn read_append(&mut self, len: usize, out: &mut Vec<u8>) -> Result<(), BufferError> {
        const STEP: usize = 16 * 1024;
        let start = out.len();
        let mut left = len;
        while left > 0 {
            let take = left.min(STEP);
            let at = out.len();
            out.resize(at + take, 0);
            if let Err(e) = self.read_exact(&mut out[at..]) {
                out.truncate(start);
                return Err(e);
            }
            left -= take;
        }
        Ok(())
    }

    /// True when no further bytes are available.
    fn is_eof(&mut self) -> bool {
        self.peek().is_none()
    }
}
