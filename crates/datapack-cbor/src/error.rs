//! CBOR parser error type.

use datapack_buffers::BufferError;
use thiserror::Error;

/// Error type for CBOR parsing operations.
///
/// Any error terminates the parse; the parser is not usable afterwards.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CborError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid UTF-8 text string")]
    InvalidUtf8TextString,
    #[error("unknown type")]
    UnknownType,
    #[error("number too large")]
    NumberTooLarge,
    #[error("maximum nesting depth exceeded")]
    MaxNestingDepthExceeded,
    #[error("invalid decimal fraction")]
    InvalidBigdec,
    #[error("invalid bigfloat")]
    InvalidBigfloat,
    #[error("stringref index too large")]
    StringrefTooLarge,
    #[error("unexpected break code")]
    UnexpectedBreak,
    #[error("illegal chunk type in indefinite-length string")]
    IllegalChunkType,
    #[error("typed array length is not a multiple of the element size")]
    InvalidTypedArray,
}

impl From<BufferError> for CborError {
    fn from(e: BufferError) -> Self {
        match e {
            BufferError::EndOfBuffer => CborError::UnexpectedEof,
            BufferError::InvalidUtf8 => CborError::InvalidUtf8TextString,
        }
    }
}
