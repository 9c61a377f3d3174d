//! Semantic tags surfaced to the visitor.

/// The closed set of semantic annotations the parser attaches to events.
///
/// Unrecognized CBOR tags are dropped during parsing and never reach the
/// visitor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SemanticTag {
    #[default]
    None,
    /// Tag 0: RFC 3339 date/time string.
    Datetime,
    /// Tag 1: epoch-based timestamp.
    Timestamp,
    /// Tag 32: URI string.
    Uri,
    /// Tags 22 / 34: base64 content.
    Base64,
    /// Tags 21 / 33: base64url content.
    Base64url,
    /// Tag 23: base16 content.
    Base16,
    /// Tags 2 / 3: arbitrary-precision integer, rendered as decimal text.
    Bigint,
    /// Tag 4: decimal fraction, rendered as decimal text.
    Bigdec,
    /// Tag 5: bigfloat, rendered as hex-float text.
    Bigfloat,
    /// Tag 0x44: clamped u8 typed array.
    Clamped,
    /// Tag 40: multi-dimensional array, row-major element order.
    MultiDimRowMajor,
    /// Tag 1040: multi-dimensional array, column-major element order.
    MultiDimColumnMajor,
    /// The `undefined` simple value, surfaced as a tagged null.
    Undefined,
}
