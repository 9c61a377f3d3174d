//! The event sink the parser drives.

use half::f16;

use crate::error::CborError;
use crate::tag::SemanticTag;

/// Per-event diagnostic context.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    position: u64,
}

impl ParseContext {
    pub fn new(position: u64) -> Self {
        Self { position }
    }

    /// Byte offset into the input at the time the event was produced.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// `Ok(true)` continues the parse, `Ok(false)` pauses it (resumable via
/// [`crate::CborParser::restart`]), `Err` terminates it.
pub type VisitResult = Result<bool, CborError>;

/// Receives the event stream of one CBOR item.
///
/// The typed-array and multi-dimensional callbacks have default
/// implementations that decompose into plain container and scalar events,
/// so tree-building sinks only need the scalar surface. Half-precision
/// scalars are delivered as raw bits; only the typed-array defaults
/// convert to `f64`.
pub trait Visitor {
    fn begin_array(&mut self, len: Option<usize>, tag: SemanticTag, ctx: &ParseContext)
        -> VisitResult;
    fn end_array(&mut self, ctx: &ParseContext) -> VisitResult;
    fn begin_object(
        &mut self,
        len: Option<usize>,
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult;
    fn end_object(&mut self, ctx: &ParseContext) -> VisitResult;
    fn key(&mut self, name: &str, ctx: &ParseContext) -> VisitResult;
    fn null_value(&mut self, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    fn bool_value(&mut self, value: bool, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    fn uint64_value(&mut self, value: u64, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    fn int64_value(&mut self, value: i64, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    /// Raw IEEE 754 binary16 bits; conversion is the sink's concern.
    fn half_value(&mut self, value: u16, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    fn double_value(&mut self, value: f64, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    fn string_value(&mut self, value: &str, tag: SemanticTag, ctx: &ParseContext) -> VisitResult;
    fn byte_string_value(
        &mut self,
        value: &[u8],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult;

    /// Completion hook, called once after the root item.
    fn flush(&mut self) -> Result<(), CborError> {
        Ok(())
    }

    fn typed_array_u8(&mut self, data: &[u8], tag: SemanticTag, ctx: &ParseContext) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.uint64_value(u64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_u16(
        &mut self,
        data: &[u16],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.uint64_value(u64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_u32(
        &mut self,
        data: &[u32],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.uint64_value(u64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_u64(
        &mut self,
        data: &[u64],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.uint64_value(v, SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_i8(&mut self, data: &[i8], tag: SemanticTag, ctx: &ParseContext) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.int64_value(i64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_i16(
        &mut self,
        data: &[i16],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.int64_value(i64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_i32(
        &mut self,
        data: &[i32],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.int64_value(i64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_i64(
        &mut self,
        data: &[i64],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.int64_value(v, SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    /// Half-precision elements, delivered as raw bits. The default
    /// converts each element to `f64`.
    fn typed_array_half(
        &mut self,
        data: &[u16],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &bits in data {
            if !self.double_value(f64::from(f16::from_bits(bits)), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_f32(
        &mut self,
        data: &[f32],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.double_value(f64::from(v), SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn typed_array_f64(
        &mut self,
        data: &[f64],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(data.len()), tag, ctx)? {
            return Ok(false);
        }
        for &v in data {
            if !self.double_value(v, SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    /// The default renders a multi-dimensional array as the two-element
    /// array `[shape, data]`.
    fn begin_multi_dim(
        &mut self,
        shape: &[usize],
        tag: SemanticTag,
        ctx: &ParseContext,
    ) -> VisitResult {
        if !self.begin_array(Some(2), tag, ctx)? {
            return Ok(false);
        }
        if !self.begin_array(Some(shape.len()), SemanticTag::None, ctx)? {
            return Ok(false);
        }
        for &dim in shape {
            if !self.uint64_value(dim as u64, SemanticTag::None, ctx)? {
                return Ok(false);
            }
        }
        self.end_array(ctx)
    }

    fn end_multi_dim(&mut self, ctx: &ParseContext) -> VisitResult {
        self.end_array(ctx)
    }
}

/// A sink that accepts everything and builds nothing.
///
/// Feeding a parser into this visitor checks well-formedness only.
pub struct NullVisitor;

impl Visitor for NullVisitor {
    fn begin_array(&mut self, _: Option<usize>, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn end_array(&mut self, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn begin_object(&mut self, _: Option<usize>, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn end_object(&mut self, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn key(&mut self, _: &str, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn null_value(&mut self, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn bool_value(&mut self, _: bool, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn uint64_value(&mut self, _: u64, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn int64_value(&mut self, _: i64, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn half_value(&mut self, _: u16, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn double_value(&mut self, _: f64, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn string_value(&mut self, _: &str, _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }

    fn byte_string_value(&mut self, _: &[u8], _: SemanticTag, _: &ParseContext) -> VisitResult {
        Ok(true)
    }
}
