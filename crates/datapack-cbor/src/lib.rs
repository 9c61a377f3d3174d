//! Streaming CBOR parser (RFC 7049 / RFC 8949) for the datapack codecs.
//!
//! The parser pulls one data item at a time from a byte [`Source`] and
//! delivers it to a [`Visitor`] sink, so the full tree is never
//! materialized. Beyond the core encoding it understands the common
//! semantic tags: timestamps, bignums, decimal fractions, bigfloats,
//! encoding hints, stringref dictionaries (tags 25 / 256), packed typed
//! arrays (tags 0x40–0x56), and multi-dimensional arrays (tags 40 / 1040).
//!
//! # Example
//!
//! ```
//! use datapack_cbor::decode_to_json;
//!
//! // {"a": 1}
//! let value = decode_to_json(&[0xa1, 0x61, 0x61, 0x01]).unwrap();
//! assert_eq!(value, serde_json::json!({"a": 1}));
//! ```

mod bignum;
mod constants;
mod error;
mod json;
mod options;
mod parser;
mod stringref;
mod tag;
mod typed_array;
mod visitor;

pub use datapack_buffers::{BufferError, Reader, Source, StreamingByteSource};

pub use error::CborError;
pub use json::JsonVisitor;
pub use options::DecodeOptions;
pub use parser::CborParser;
pub use tag::SemanticTag;
pub use typed_array::{TypedArrayDescriptor, TypedArrayKind};
pub use visitor::{NullVisitor, ParseContext, VisitResult, Visitor};

use serde_json::Value;

/// Decodes one CBOR item into a `serde_json::Value`.
pub fn decode_to_json(bytes: &[u8]) -> Result<Value, CborError> {
    let mut parser = CborParser::new(Reader::new(bytes));
    let mut visitor = JsonVisitor::new();
    parser.parse(&mut visitor)?;
    Ok(visitor.into_value().unwrap_or(Value::Null))
}

/// Checks that `bytes` starts with one well-formed CBOR item.
pub fn validate(bytes: &[u8]) -> Result<(), CborError> {
    let mut parser = CborParser::new(Reader::new(bytes));
    parser.parse(&mut NullVisitor)
}
