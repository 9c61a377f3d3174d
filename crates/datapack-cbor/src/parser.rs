//! The pull-based CBOR parse state machine.

use std::fmt::Write as _;
use std::str;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use half::f16;

use datapack_buffers::Source;

use crate::bignum;
use crate::constants::{
    additional_info, major_type, BREAK_BYTE, INFO_INDEFINITE, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP,
    MAJOR_NEGATIVE, MAJOR_SIMPLE, MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED, TAG_BIGFLOAT,
    TAG_COLUMN_MAJOR, TAG_DECIMAL_FRACTION, TAG_ROW_MAJOR, TAG_STRINGREF,
    TAG_STRINGREF_NAMESPACE,
};
use crate::error::CborError;
use crate::options::DecodeOptions;
use crate::stringref::{min_length_for_stringref, MappedString};
use crate::tag::SemanticTag;
use crate::typed_array::{self, TypedArrayDescriptor, TypedArrayKind};
use crate::visitor::{ParseContext, Visitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseMode {
    Root,
    BeforeDone,
    Array,
    IndefiniteArray,
    MapKey,
    MapValue,
    IndefiniteMapKey,
    IndefiniteMapValue,
    MultiDim,
}

#[derive(Debug, Clone)]
struct ParseState {
    mode: ParseMode,
    length: usize,
    index: usize,
    pop_stringref_map: bool,
}

impl ParseState {
    fn new(mode: ParseMode, length: usize, pop_stringref_map: bool) -> Self {
        Self {
            mode,
            length,
            index: 0,
            pop_stringref_map,
        }
    }
}

/// Classifying tags collected in front of the next data item.
#[derive(Debug, Default, Clone, Copy)]
struct PendingTags {
    stringref: bool,
    stringref_namespace: bool,
    item_tag: Option<u64>,
}

impl PendingTags {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Streaming CBOR parser.
///
/// Drives a [`Visitor`] with one event per data item, never materializing
/// the full tree. A parser owns its source and scratch buffers and is used
/// for exactly one root item.
pub struct CborParser<S> {
    source: S,
    options: DecodeOptions,
    more: bool,
    done: bool,
    pending: PendingTags,
    state_stack: Vec<ParseState>,
    text_buffer: Vec<u8>,
    bytes_buffer: Vec<u8>,
    shape: Vec<usize>,
    stringref_maps: Vec<Vec<MappedString>>,
    nesting_depth: u32,
}

impl<S: Source> CborParser<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, DecodeOptions::default())
    }

    pub fn with_options(source: S, options: DecodeOptions) -> Self {
        Self {
            source,
            options,
            more: true,
            done: false,
            pending: PendingTags::default(),
            state_stack: vec![ParseState::new(ParseMode::Root, 0, false)],
            text_buffer: Vec::new(),
            bytes_buffer: Vec::new(),
            shape: Vec::new(),
            stringref_maps: Vec::new(),
            nesting_depth: 0,
        }
    }

    /// True once the root item has been fully delivered.
    pub fn done(&self) -> bool {
        self.done
    }

    /// True when parsing is paused or terminated.
    pub fn stopped(&self) -> bool {
        !self.more
    }

    /// Byte offset into the input, for diagnostics.
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Re-enables parsing after a visitor returned `Ok(false)`; the next
    /// [`CborParser::parse`] call re-enters at the item boundary.
    pub fn restart(&mut self) {
        self.more = true;
    }

    /// Returns the parser to its initial state, keeping the source.
    pub fn reset(&mut self) {
        self.state_stack.clear();
        self.state_stack.push(ParseState::new(ParseMode::Root, 0, false));
        self.stringref_maps.clear();
        self.pending.clear();
        self.nesting_depth = 0;
        self.more = true;
        self.done = false;
    }

    /// Runs the state machine until the root item completes, the visitor
    /// pauses, or an error terminates the parse.
    pub fn parse<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        let result = self.parse_loop(visitor);
        if result.is_err() {
            self.more = false;
        }
        result
    }

    fn parse_loop<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        while !self.done && self.more {
            let mode = match self.state_stack.last() {
                Some(state) => state.mode,
                None => break,
            };
            match mode {
                ParseMode::Root => {
                    self.set_top_mode(ParseMode::BeforeDone);
                    self.read_item(visitor)?;
                }
                ParseMode::BeforeDone => {
                    self.state_stack.clear();
                    self.more = false;
                    self.done = true;
                    visitor.flush()?;
                }
                ParseMode::Array => {
                    if self.advance_index() {
                        self.read_item(visitor)?;
                    } else {
                        self.end_array(visitor)?;
                    }
                }
                ParseMode::IndefiniteArray => match self.source.peek() {
                    None => return Err(CborError::UnexpectedEof),
                    Some(BREAK_BYTE) => {
                        self.source.skip(1)?;
                        self.end_array(visitor)?;
                    }
                    Some(_) => self.read_item(visitor)?,
                },
                ParseMode::MapKey => {
                    if self.advance_index() {
                        self.read_name(visitor)?;
                        self.set_top_mode(ParseMode::MapValue);
                    } else {
                        self.end_object(visitor)?;
                    }
                }
                ParseMode::MapValue => {
                    self.set_top_mode(ParseMode::MapKey);
                    self.read_item(visitor)?;
                }
                ParseMode::IndefiniteMapKey => match self.source.peek() {
                    None => return Err(CborError::UnexpectedEof),
                    Some(BREAK_BYTE) => {
                        self.source.skip(1)?;
                        self.end_object(visitor)?;
                    }
                    Some(_) => {
                        self.read_name(visitor)?;
                        self.set_top_mode(ParseMode::IndefiniteMapValue);
                    }
                },
                ParseMode::IndefiniteMapValue => {
                    self.set_top_mode(ParseMode::IndefiniteMapKey);
                    self.read_item(visitor)?;
                }
                ParseMode::MultiDim => {
                    if self.advance_index() {
                        self.read_item(visitor)?;
                    } else {
                        self.end_multi_dim(visitor)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn set_top_mode(&mut self, mode: ParseMode) {
        if let Some(state) = self.state_stack.last_mut() {
            state.mode = mode;
        }
    }

    /// Claims the next slot of a counted container; false once exhausted.
    fn advance_index(&mut self) -> bool {
        match self.state_stack.last_mut() {
            Some(state) if state.index < state.length => {
                state.index += 1;
                true
            }
            _ => false,
        }
    }

    fn context(&self) -> ParseContext {
        ParseContext::new(self.source.position())
    }

    // ------------------------------------------------------------------
    // Item reading
    // ------------------------------------------------------------------

    fn read_item<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        let result = self.read_item_inner(visitor);
        self.pending.clear();
        result
    }

    fn read_item_inner<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        self.read_tags()?;
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        let info = additional_info(initial);
        match major_type(initial) {
            MAJOR_UNSIGNED => {
                let value = self.read_unsigned_argument()?;
                if self.pending.stringref && !self.stringref_maps.is_empty() {
                    self.pending.stringref = false;
                    self.emit_stringref(value, visitor, false)?;
                } else {
                    let tag = self.scalar_tag();
                    let ctx = self.context();
                    self.more = visitor.uint64_value(value, tag, &ctx)?;
                }
            }
            MAJOR_NEGATIVE => {
                let value = self.read_negative_integer()?;
                let tag = self.scalar_tag();
                let ctx = self.context();
                self.more = visitor.int64_value(value, tag, &ctx)?;
            }
            MAJOR_BYTES => {
                let definite = self.read_byte_string_to_buffer()?;
                if definite {
                    self.register_bytes();
                }
                self.emit_byte_string(visitor)?;
            }
            MAJOR_TEXT => {
                self.emit_text(visitor, false)?;
            }
            MAJOR_ARRAY => match self.pending.item_tag {
                Some(TAG_DECIMAL_FRACTION) => {
                    self.pending.item_tag = None;
                    let text = self.read_decimal_fraction_string()?;
                    let ctx = self.context();
                    self.more = visitor.string_value(&text, SemanticTag::Bigdec, &ctx)?;
                }
                Some(TAG_BIGFLOAT) => {
                    self.pending.item_tag = None;
                    let text = self.read_bigfloat_string()?;
                    let ctx = self.context();
                    self.more = visitor.string_value(&text, SemanticTag::Bigfloat, &ctx)?;
                }
                Some(TAG_ROW_MAJOR) => {
                    self.pending.item_tag = None;
                    self.begin_multi_dim(SemanticTag::MultiDimRowMajor, visitor)?;
                }
                Some(TAG_COLUMN_MAJOR) => {
                    self.pending.item_tag = None;
                    self.begin_multi_dim(SemanticTag::MultiDimColumnMajor, visitor)?;
                }
                _ => self.begin_array(info, visitor)?,
            },
            MAJOR_MAP => self.begin_object(info, visitor)?,
            MAJOR_SIMPLE => match info {
                20 => {
                    self.source.skip(1)?;
                    let ctx = self.context();
                    self.more = visitor.bool_value(false, SemanticTag::None, &ctx)?;
                }
                21 => {
                    self.source.skip(1)?;
                    let ctx = self.context();
                    self.more = visitor.bool_value(true, SemanticTag::None, &ctx)?;
                }
                22 => {
                    self.source.skip(1)?;
                    let ctx = self.context();
                    self.more = visitor.null_value(SemanticTag::None, &ctx)?;
                }
                23 => {
                    self.source.skip(1)?;
                    let ctx = self.context();
                    self.more = visitor.null_value(SemanticTag::Undefined, &ctx)?;
                }
                25 => {
                    let bits = self.read_unsigned_argument()? as u16;
                    let ctx = self.context();
                    self.more = visitor.half_value(bits, SemanticTag::None, &ctx)?;
                }
                26 | 27 => {
                    let value = self.read_double()?;
                    let tag = self.scalar_tag();
                    let ctx = self.context();
                    self.more = visitor.double_value(value, tag, &ctx)?;
                }
                INFO_INDEFINITE => return Err(CborError::UnexpectedBreak),
                _ => return Err(CborError::UnknownType),
            },
            // MAJOR_TAG is exhausted by read_tags above
            _ => return Err(CborError::UnknownType),
        }
        Ok(())
    }

    /// Reads one map key. Text keys pass through directly; byte-string
    /// keys are emitted as base64url; stringref integers resolve through
    /// the dictionary; anything else is rendered to its JSON text form.
    fn read_name<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        let result = self.read_name_inner(visitor);
        self.pending.clear();
        result
    }

    fn read_name_inner<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        self.read_tags()?;
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        match major_type(initial) {
            MAJOR_TEXT => self.emit_text(visitor, true),
            MAJOR_BYTES => {
                let definite = self.read_byte_string_to_buffer()?;
                if definite {
                    self.register_bytes();
                }
                let encoded = URL_SAFE_NO_PAD.encode(&self.bytes_buffer);
                let ctx = self.context();
                self.more = visitor.key(&encoded, &ctx)?;
                Ok(())
            }
            MAJOR_UNSIGNED if self.pending.stringref && !self.stringref_maps.is_empty() => {
                self.pending.stringref = false;
                let reference = self.read_unsigned_argument()?;
                self.emit_stringref(reference, visitor, true)
            }
            _ => {
                let mut text = String::new();
                self.render_item_to_text(&mut text, 0)?;
                let ctx = self.context();
                self.more = visitor.key(&text, &ctx)?;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Tag collection
    // ------------------------------------------------------------------

    fn read_tags(&mut self) -> Result<(), CborError> {
        loop {
            let initial = match self.source.peek() {
                Some(b) => b,
                None => return Err(CborError::UnexpectedEof),
            };
            if major_type(initial) != MAJOR_TAG {
                return Ok(());
            }
            let value = self.read_unsigned_argument()?;
            match value {
                TAG_STRINGREF => self.pending.stringref = true,
                TAG_STRINGREF_NAMESPACE => self.pending.stringref_namespace = true,
                0 // datetime
                | 1 // epoch timestamp
                | 2 | 3 // bignums
                | TAG_DECIMAL_FRACTION
                | TAG_BIGFLOAT
                | 21 | 22 | 23 // byte-string encoding hints
                | 32 // uri
                | 33 | 34 // text encoding hints
                | TAG_ROW_MAJOR
                | TAG_COLUMN_MAJOR => self.pending.item_tag = Some(value),
                0x40..=0x57 if TypedArrayDescriptor::from_tag(value as u8).is_some() => {
                    self.pending.item_tag = Some(value)
                }
                // unrecognized tags are dropped
                _ => {}
            }
        }
    }

    /// Tag for integer and double items: only the epoch timestamp applies.
    fn scalar_tag(&mut self) -> SemanticTag {
        match self.pending.item_tag.take() {
            Some(1) => SemanticTag::Timestamp,
            _ => SemanticTag::None,
        }
    }

    /// Tag for text-string items.
    fn string_tag(&mut self) -> SemanticTag {
        match self.pending.item_tag.take() {
            Some(0) => SemanticTag::Datetime,
            Some(32) => SemanticTag::Uri,
            Some(33) => SemanticTag::Base64url,
            Some(34) => SemanticTag::Base64,
            _ => SemanticTag::None,
        }
    }

    // ------------------------------------------------------------------
    // Argument decoding
    // ------------------------------------------------------------------

    /// Consumes an initial byte plus its 0/1/2/4/8-byte big-endian
    /// argument. Reserved info values and indefinite markers fail.
    fn read_unsigned_argument(&mut self) -> Result<u64, CborError> {
        let initial = self.source.read_u8()?;
        self.read_argument(initial)
    }

    fn read_argument(&mut self, initial: u8) -> Result<u64, CborError> {
        match additional_info(initial) {
            info @ 0..=23 => Ok(u64::from(info)),
            24 => Ok(u64::from(self.source.read_u8()?)),
            25 => {
                let mut raw = [0u8; 2];
                self.source.read_exact(&mut raw)?;
                Ok(u64::from(u16::from_be_bytes(raw)))
            }
            26 => {
                let mut raw = [0u8; 4];
                self.source.read_exact(&mut raw)?;
                Ok(u64::from(u32::from_be_bytes(raw)))
            }
            27 => {
                let mut raw = [0u8; 8];
                self.source.read_exact(&mut raw)?;
                Ok(u64::from_be_bytes(raw))
            }
            _ => Err(CborError::UnknownType),
        }
    }

    /// Major-1 value, `-1 - argument`.
    fn read_negative_integer(&mut self) -> Result<i64, CborError> {
        let argument = self.read_unsigned_argument()?;
        if argument > i64::MAX as u64 {
            return Err(CborError::NumberTooLarge);
        }
        Ok(-1 - argument as i64)
    }

    /// Argument narrowed to a container or string length.
    fn read_length(&mut self) -> Result<usize, CborError> {
        let value = self.read_unsigned_argument()?;
        usize::try_from(value).map_err(|_| CborError::NumberTooLarge)
    }

    /// Single- or double-precision float, initial byte included.
    fn read_double(&mut self) -> Result<f64, CborError> {
        let initial = self.source.read_u8()?;
        match additional_info(initial) {
            26 => {
                let mut raw = [0u8; 4];
                self.source.read_exact(&mut raw)?;
                Ok(f64::from(f32::from_be_bytes(raw)))
            }
            27 => {
                let mut raw = [0u8; 8];
                self.source.read_exact(&mut raw)?;
                Ok(f64::from_be_bytes(raw))
            }
            _ => Err(CborError::UnknownType),
        }
    }

    // ------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------

    fn enter_container(&mut self) -> Result<(), CborError> {
        self.nesting_depth += 1;
        if self.nesting_depth > self.options.max_nesting_depth {
            return Err(CborError::MaxNestingDepthExceeded);
        }
        Ok(())
    }

    /// Consumes a pending namespace tag, opening a fresh dictionary that
    /// the container's exit will pop.
    fn take_namespace(&mut self) -> bool {
        if self.pending.stringref_namespace {
            self.pending.stringref_namespace = false;
            self.stringref_maps.push(Vec::new());
            true
        } else {
            false
        }
    }

    fn begin_array<V: Visitor>(&mut self, info: u8, visitor: &mut V) -> Result<(), CborError> {
        self.enter_container()?;
        let pop_stringref_map = self.take_namespace();
        if info == INFO_INDEFINITE {
            self.source.skip(1)?;
            self.state_stack
                .push(ParseState::new(ParseMode::IndefiniteArray, 0, pop_stringref_map));
            let ctx = self.context();
            self.more = visitor.begin_array(None, SemanticTag::None, &ctx)?;
        } else {
            let len = self.read_length()?;
            self.state_stack
                .push(ParseState::new(ParseMode::Array, len, pop_stringref_map));
            let ctx = self.context();
            self.more = visitor.begin_array(Some(len), SemanticTag::None, &ctx)?;
        }
        Ok(())
    }

    fn end_array<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        self.nesting_depth = self.nesting_depth.saturating_sub(1);
        let ctx = self.context();
        self.more = visitor.end_array(&ctx)?;
        if let Some(state) = self.state_stack.pop() {
            if state.pop_stringref_map {
                self.stringref_maps.pop();
            }
        }
        Ok(())
    }

    fn begin_object<V: Visitor>(&mut self, info: u8, visitor: &mut V) -> Result<(), CborError> {
        self.enter_container()?;
        let pop_stringref_map = self.take_namespace();
        if info == INFO_INDEFINITE {
            self.source.skip(1)?;
            self.state_stack.push(ParseState::new(
                ParseMode::IndefiniteMapKey,
                0,
                pop_stringref_map,
            ));
            let ctx = self.context();
            self.more = visitor.begin_object(None, SemanticTag::None, &ctx)?;
        } else {
            let len = self.read_length()?;
            self.state_stack
                .push(ParseState::new(ParseMode::MapKey, len, pop_stringref_map));
            let ctx = self.context();
            self.more = visitor.begin_object(Some(len), SemanticTag::None, &ctx)?;
        }
        Ok(())
    }

    fn end_object<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        self.nesting_depth = self.nesting_depth.saturating_sub(1);
        let ctx = self.context();
        self.more = visitor.end_object(&ctx)?;
        if let Some(state) = self.state_stack.pop() {
            if state.pop_stringref_map {
                self.stringref_maps.pop();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Reads a text string (definite or chunked) into the text buffer.
    /// Returns whether the string was definite-length.
    fn read_text_string_to_buffer(&mut self) -> Result<bool, CborError> {
        self.text_buffer.clear();
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        if additional_info(initial) == INFO_INDEFINITE {
            self.source.skip(1)?;
            loop {
                match self.source.peek() {
                    None => return Err(CborError::UnexpectedEof),
                    Some(BREAK_BYTE) => {
                        self.source.skip(1)?;
                        return Ok(false);
                    }
                    Some(chunk_initial) => {
                        if major_type(chunk_initial) != MAJOR_TEXT
                            || additional_info(chunk_initial) == INFO_INDEFINITE
                        {
                            return Err(CborError::IllegalChunkType);
                        }
                        let len = self.read_length()?;
                        self.source.read_append(len, &mut self.text_buffer)?;
                    }
                }
            }
        } else {
            let len = self.read_length()?;
            self.source.read_append(len, &mut self.text_buffer)?;
            Ok(true)
        }
    }

    /// Reads a byte string (definite or chunked) into the bytes buffer.
    /// Returns whether the string was definite-length.
    fn read_byte_string_to_buffer(&mut self) -> Result<bool, CborError> {
        self.bytes_buffer.clear();
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        if additional_info(initial) == INFO_INDEFINITE {
            self.source.skip(1)?;
            loop {
                match self.source.peek() {
                    None => return Err(CborError::UnexpectedEof),
                    Some(BREAK_BYTE) => {
                        self.source.skip(1)?;
                        return Ok(false);
                    }
                    Some(chunk_initial) => {
                        if major_type(chunk_initial) != MAJOR_BYTES
                            || additional_info(chunk_initial) == INFO_INDEFINITE
                        {
                            return Err(CborError::IllegalChunkType);
                        }
                        let len = self.read_length()?;
                        self.source.read_append(len, &mut self.bytes_buffer)?;
                    }
                }
            }
        } else {
            let len = self.read_length()?;
            self.source.read_append(len, &mut self.bytes_buffer)?;
            Ok(true)
        }
    }

    /// Reads, validates, registers, and emits a text string or key.
    fn emit_text<V: Visitor>(&mut self, visitor: &mut V, as_key: bool) -> Result<(), CborError> {
        let definite = self.read_text_string_to_buffer()?;
        let text = match String::from_utf8(std::mem::take(&mut self.text_buffer)) {
            Ok(text) => text,
            Err(e) => {
                self.text_buffer = e.into_bytes();
                return Err(CborError::InvalidUtf8TextString);
            }
        };
        if definite {
            self.register_text(&text);
        }
        let ctx = self.context();
        self.more = if as_key {
            visitor.key(&text, &ctx)?
        } else {
            let tag = self.string_tag();
            visitor.string_value(&text, tag, &ctx)?
        };
        self.text_buffer = text.into_bytes();
        Ok(())
    }

    fn register_text(&mut self, text: &str) {
        if let Some(dict) = self.stringref_maps.last_mut() {
            if text.len() >= min_length_for_stringref(dict.len()) {
                dict.push(MappedString::Text(text.to_owned()));
            }
        }
    }

    fn register_bytes(&mut self) {
        if let Some(dict) = self.stringref_maps.last_mut() {
            if self.bytes_buffer.len() >= min_length_for_stringref(dict.len()) {
                dict.push(MappedString::Bytes(self.bytes_buffer.clone()));
            }
        }
    }

    // ------------------------------------------------------------------
    // Byte-string emission and semantic transforms
    // ------------------------------------------------------------------

    /// Emits the bytes buffer, reinterpreted per the pending item tag.
    fn emit_byte_string<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        let ctx = self.context();
        match self.pending.item_tag.take() {
            Some(2) => {
                let text = bignum::positive_decimal(&self.bytes_buffer);
                self.more = visitor.string_value(&text, SemanticTag::Bigint, &ctx)?;
            }
            Some(3) => {
                let text = bignum::negative_decimal(&self.bytes_buffer);
                self.more = visitor.string_value(&text, SemanticTag::Bigint, &ctx)?;
            }
            Some(21) => {
                self.more =
                    visitor.byte_string_value(&self.bytes_buffer, SemanticTag::Base64url, &ctx)?;
            }
            Some(22) => {
                self.more =
                    visitor.byte_string_value(&self.bytes_buffer, SemanticTag::Base64, &ctx)?;
            }
            Some(23) => {
                self.more =
                    visitor.byte_string_value(&self.bytes_buffer, SemanticTag::Base16, &ctx)?;
            }
            Some(tag @ 0x40..=0x57) => match TypedArrayDescriptor::from_tag(tag as u8) {
                Some(descriptor) => self.emit_typed_array(descriptor, visitor)?,
                None => {
                    self.more =
                        visitor.byte_string_value(&self.bytes_buffer, SemanticTag::None, &ctx)?;
                }
            },
            _ => {
                self.more =
                    visitor.byte_string_value(&self.bytes_buffer, SemanticTag::None, &ctx)?;
            }
        }
        Ok(())
    }

    fn emit_typed_array<V: Visitor>(
        &mut self,
        descriptor: TypedArrayDescriptor,
        visitor: &mut V,
    ) -> Result<(), CborError> {
        if self.bytes_buffer.len() % descriptor.bytes_per_element != 0 {
            return Err(CborError::InvalidTypedArray);
        }
        let le = descriptor.little_endian;
        let bytes = &self.bytes_buffer;
        let ctx = self.context();
        self.more = match (descriptor.kind, descriptor.bytes_per_element) {
            (TypedArrayKind::Uint, 1) => visitor.typed_array_u8(bytes, SemanticTag::None, &ctx)?,
            (TypedArrayKind::ClampedUint, _) => {
                visitor.typed_array_u8(bytes, SemanticTag::Clamped, &ctx)?
            }
            (TypedArrayKind::Uint, 2) => {
                visitor.typed_array_u16(&typed_array::decode_u16(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Uint, 4) => {
                visitor.typed_array_u32(&typed_array::decode_u32(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Uint, _) => {
                visitor.typed_array_u64(&typed_array::decode_u64(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Int, 1) => {
                visitor.typed_array_i8(&typed_array::decode_i8(bytes), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Int, 2) => {
                visitor.typed_array_i16(&typed_array::decode_i16(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Int, 4) => {
                visitor.typed_array_i32(&typed_array::decode_i32(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Int, _) => {
                visitor.typed_array_i64(&typed_array::decode_i64(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Float, 2) => {
                visitor.typed_array_half(&typed_array::decode_u16(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Float, 4) => {
                visitor.typed_array_f32(&typed_array::decode_f32(bytes, le), SemanticTag::None, &ctx)?
            }
            (TypedArrayKind::Float, _) => {
                visitor.typed_array_f64(&typed_array::decode_f64(bytes, le), SemanticTag::None, &ctx)?
            }
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stringref resolution
    // ------------------------------------------------------------------

    /// Resolves a tag-25 integer against the active dictionary and emits
    /// the stored string, preserving its original kind. Byte entries in
    /// value position still undergo the pending semantic transform.
    fn emit_stringref<V: Visitor>(
        &mut self,
        reference: u64,
        visitor: &mut V,
        as_key: bool,
    ) -> Result<(), CborError> {
        let dict_len = self.stringref_maps.last().map_or(0, Vec::len);
        if reference >= dict_len as u64 {
            return Err(CborError::StringrefTooLarge);
        }
        let index = usize::try_from(reference).map_err(|_| CborError::NumberTooLarge)?;
        let entry = match self.stringref_maps.last() {
            Some(dict) => dict[index].clone(),
            None => return Err(CborError::StringrefTooLarge),
        };
        let ctx = self.context();
        match entry {
            MappedString::Text(text) => {
                self.more = if as_key {
                    visitor.key(&text, &ctx)?
                } else {
                    let tag = self.string_tag();
                    visitor.string_value(&text, tag, &ctx)?
                };
            }
            MappedString::Bytes(bytes) => {
                if as_key {
                    let encoded = URL_SAFE_NO_PAD.encode(&bytes);
                    self.more = visitor.key(&encoded, &ctx)?;
                } else {
                    self.bytes_buffer.clear();
                    self.bytes_buffer.extend_from_slice(&bytes);
                    self.emit_byte_string(visitor)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Decimal fractions and bigfloats (tags 4 / 5)
    // ------------------------------------------------------------------

    /// Consumes the two-element `[exponent, mantissa]` array header and
    /// the exponent.
    fn read_exponent(&mut self, invalid: CborError) -> Result<i64, CborError> {
        let initial = self.source.read_u8()?;
        if additional_info(initial) == INFO_INDEFINITE {
            return Err(invalid);
        }
        let arity = self.read_argument(initial)?;
        if arity != 2 {
            return Err(invalid);
        }
        let next = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        match major_type(next) {
            MAJOR_UNSIGNED => {
                let value = self.read_unsigned_argument()?;
                i64::try_from(value).map_err(|_| CborError::NumberTooLarge)
            }
            MAJOR_NEGATIVE => self.read_negative_integer(),
            _ => Err(invalid),
        }
    }

    /// Mantissa as decimal digits: an integer, or a tag-2/3 bignum.
    fn read_mantissa_decimal(&mut self, invalid: CborError) -> Result<String, CborError> {
        let next = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        match major_type(next) {
            MAJOR_UNSIGNED => Ok(self.read_unsigned_argument()?.to_string()),
            MAJOR_NEGATIVE => Ok(self.read_negative_integer()?.to_string()),
            MAJOR_TAG => {
                let tag = self.read_unsigned_argument()?;
                let after = match self.source.peek() {
                    Some(b) => b,
                    None => return Err(CborError::UnexpectedEof),
                };
                if major_type(after) != MAJOR_BYTES || !(tag == 2 || tag == 3) {
                    return Err(invalid);
                }
                let definite = self.read_byte_string_to_buffer()?;
                if definite {
                    self.register_bytes();
                }
                if tag == 2 {
                    Ok(bignum::positive_decimal(&self.bytes_buffer))
                } else {
                    Ok(bignum::negative_decimal(&self.bytes_buffer))
                }
            }
            _ => Err(invalid),
        }
    }

    fn read_decimal_fraction_string(&mut self) -> Result<String, CborError> {
        let exponent = self.read_exponent(CborError::InvalidBigdec)?;
        let mantissa = self.read_mantissa_decimal(CborError::InvalidBigdec)?;
        let mut out = String::new();
        bignum::prettify_decimal(&mantissa, exponent, &mut out);
        Ok(out)
    }

    fn read_bigfloat_string(&mut self) -> Result<String, CborError> {
        let exponent = self.read_exponent(CborError::InvalidBigfloat)?;
        let next = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        let mut out = match major_type(next) {
            MAJOR_UNSIGNED => {
                let value = self.read_unsigned_argument()?;
                format!("0x{value:x}")
            }
            MAJOR_NEGATIVE => {
                let value = self.read_negative_integer()?;
                format!("-0x{:x}", value.unsigned_abs())
            }
            MAJOR_TAG => {
                let tag = self.read_unsigned_argument()?;
                let after = match self.source.peek() {
                    Some(b) => b,
                    None => return Err(CborError::UnexpectedEof),
                };
                if major_type(after) != MAJOR_BYTES || !(tag == 2 || tag == 3) {
                    return Err(CborError::InvalidBigfloat);
                }
                let definite = self.read_byte_string_to_buffer()?;
                if definite {
                    self.register_bytes();
                }
                if tag == 2 {
                    bignum::positive_hex(&self.bytes_buffer)
                } else {
                    bignum::negative_hex(&self.bytes_buffer)
                }
            }
            _ => return Err(CborError::InvalidBigfloat),
        };
        let _ = write!(out, "p{exponent}");
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Multi-dimensional arrays (tags 40 / 1040)
    // ------------------------------------------------------------------

    fn begin_multi_dim<V: Visitor>(
        &mut self,
        tag: SemanticTag,
        visitor: &mut V,
    ) -> Result<(), CborError> {
        // outer [shape, data] wrapper; the element count is implied
        let initial = self.source.read_u8()?;
        if additional_info(initial) == INFO_INDEFINITE {
            return Err(CborError::UnknownType);
        }
        let _outer_len = self.read_argument(initial)?;
        self.read_shape()?;
        self.state_stack
            .push(ParseState::new(ParseMode::MultiDim, 1, false));
        let ctx = self.context();
        self.more = visitor.begin_multi_dim(&self.shape, tag, &ctx)?;
        Ok(())
    }

    fn end_multi_dim<V: Visitor>(&mut self, visitor: &mut V) -> Result<(), CborError> {
        let ctx = self.context();
        self.more = visitor.end_multi_dim(&ctx)?;
        self.state_stack.pop();
        Ok(())
    }

    fn read_shape(&mut self) -> Result<(), CborError> {
        self.shape.clear();
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        if major_type(initial) != MAJOR_ARRAY {
            return Err(CborError::UnknownType);
        }
        if additional_info(initial) == INFO_INDEFINITE {
            self.source.skip(1)?;
            loop {
                match self.source.peek() {
                    None => return Err(CborError::UnexpectedEof),
                    Some(BREAK_BYTE) => {
                        self.source.skip(1)?;
                        return Ok(());
                    }
                    Some(_) => {
                        let dim = self.read_dimension()?;
                        self.shape.push(dim);
                    }
                }
            }
        } else {
            let count = self.read_length()?;
            for _ in 0..count {
                let dim = self.read_dimension()?;
                self.shape.push(dim);
            }
            Ok(())
        }
    }

    fn read_dimension(&mut self) -> Result<usize, CborError> {
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        if major_type(initial) != MAJOR_UNSIGNED {
            return Err(CborError::UnknownType);
        }
        self.read_length()
    }

    // ------------------------------------------------------------------
    // JSON text rendering for non-string keys
    // ------------------------------------------------------------------

    /// Renders one complete item as JSON text, consuming it from the
    /// source. Stringref dictionaries are neither consulted nor extended
    /// here; the rendered key stands on its own.
    fn render_item_to_text(&mut self, out: &mut String, depth: u32) -> Result<(), CborError> {
        if depth > self.options.max_nesting_depth {
            return Err(CborError::MaxNestingDepthExceeded);
        }
        self.read_tags()?;
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        let info = additional_info(initial);
        match major_type(initial) {
            MAJOR_UNSIGNED => {
                let value = self.read_unsigned_argument()?;
                let _ = write!(out, "{value}");
            }
            MAJOR_NEGATIVE => {
                let value = self.read_negative_integer()?;
                let _ = write!(out, "{value}");
            }
            MAJOR_BYTES => {
                self.read_byte_string_to_buffer()?;
                out.push('"');
                out.push_str(&URL_SAFE_NO_PAD.encode(&self.bytes_buffer));
                out.push('"');
            }
            MAJOR_TEXT => {
                self.read_text_string_to_buffer()?;
                let text = str::from_utf8(&self.text_buffer)
                    .map_err(|_| CborError::InvalidUtf8TextString)?;
                escape_json_string(text, out);
            }
            MAJOR_ARRAY => {
                out.push('[');
                if info == INFO_INDEFINITE {
                    self.source.skip(1)?;
                    let mut first = true;
                    loop {
                        match self.source.peek() {
                            None => return Err(CborError::UnexpectedEof),
                            Some(BREAK_BYTE) => {
                                self.source.skip(1)?;
                                break;
                            }
                            Some(_) => {
                                if !first {
                                    out.push(',');
                                }
                                first = false;
                                self.render_item_to_text(out, depth + 1)?;
                            }
                        }
                    }
                } else {
                    let len = self.read_length()?;
                    for i in 0..len {
                        if i > 0 {
                            out.push(',');
                        }
                        self.render_item_to_text(out, depth + 1)?;
                    }
                }
                out.push(']');
            }
            MAJOR_MAP => {
                out.push('{');
                if info == INFO_INDEFINITE {
                    self.source.skip(1)?;
                    let mut first = true;
                    loop {
                        match self.source.peek() {
                            None => return Err(CborError::UnexpectedEof),
                            Some(BREAK_BYTE) => {
                                self.source.skip(1)?;
                                break;
                            }
                            Some(_) => {
                                if !first {
                                    out.push(',');
                                }
                                first = false;
                                self.render_key_to_text(out, depth + 1)?;
                                out.push(':');
                                self.render_item_to_text(out, depth + 1)?;
                            }
                        }
                    }
                } else {
                    let len = self.read_length()?;
                    for i in 0..len {
                        if i > 0 {
                            out.push(',');
                        }
                        self.render_key_to_text(out, depth + 1)?;
                        out.push(':');
                        self.render_item_to_text(out, depth + 1)?;
                    }
                }
                out.push('}');
            }
            MAJOR_SIMPLE => match info {
                20 => {
                    self.source.skip(1)?;
                    out.push_str("false");
                }
                21 => {
                    self.source.skip(1)?;
                    out.push_str("true");
                }
                22 | 23 => {
                    self.source.skip(1)?;
                    out.push_str("null");
                }
                25 => {
                    let bits = self.read_unsigned_argument()? as u16;
                    let _ = write!(out, "{}", f64::from(f16::from_bits(bits)));
                }
                26 | 27 => {
                    let value = self.read_double()?;
                    let _ = write!(out, "{value}");
                }
                INFO_INDEFINITE => return Err(CborError::UnexpectedBreak),
                _ => return Err(CborError::UnknownType),
            },
            _ => return Err(CborError::UnknownType),
        }
        Ok(())
    }

    /// Inner map keys always render as JSON strings of their text form.
    fn render_key_to_text(&mut self, out: &mut String, depth: u32) -> Result<(), CborError> {
        self.read_tags()?;
        let initial = match self.source.peek() {
            Some(b) => b,
            None => return Err(CborError::UnexpectedEof),
        };
        match major_type(initial) {
            MAJOR_TEXT => {
                self.read_text_string_to_buffer()?;
                let text = str::from_utf8(&self.text_buffer)
                    .map_err(|_| CborError::InvalidUtf8TextString)?;
                escape_json_string(text, out);
                Ok(())
            }
            MAJOR_BYTES => {
                self.read_byte_string_to_buffer()?;
                out.push('"');
                out.push_str(&URL_SAFE_NO_PAD.encode(&self.bytes_buffer));
                out.push('"');
                Ok(())
            }
            _ => {
                let mut rendered = String::new();
                self.render_item_to_text(&mut rendered, depth)?;
                escape_json_string(&rendered, out);
                Ok(())
            }
        }
    }
}

fn escape_json_string(text: &str, out: &mut String) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
