#![allow(dead_code)]

use datapack_cbor::{
    CborError, CborParser, ParseContext, Reader, SemanticTag, VisitResult, Visitor,
};

/// One visitor callback, captured for assertion.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BeginArray(Option<usize>, SemanticTag),
    EndArray,
    BeginObject(Option<usize>, SemanticTag),
    EndObject,
    Key(String),
    Null(SemanticTag),
    Bool(bool, SemanticTag),
    Uint64(u64, SemanticTag),
    Int64(i64, SemanticTag),
    Half(u16, SemanticTag),
    Double(f64, SemanticTag),
    Str(String, SemanticTag),
    Bytes(Vec<u8>, SemanticTag),
    U8Array(Vec<u8>, SemanticTag),
    U16Array(Vec<u16>),
    U32Array(Vec<u32>),
    U64Array(Vec<u64>),
    I8Array(Vec<i8>),
    I16Array(Vec<i16>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    HalfArray(Vec<u16>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
    BeginMultiDim(Vec<usize>, SemanticTag),
    EndMultiDim,
}

/// Records every event; optionally pauses the parse after a fixed count.
#[derive(Default)]
pub struct RecordingVisitor {
    pub events: Vec<Event>,
    pub stop_after: Option<usize>,
    pub flushed: bool,
}

impl RecordingVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, event: Event) -> VisitResult {
        self.events.push(event);
        match self.stop_after {
            Some(limit) if self.events.len() >= limit => Ok(false),
            _ => Ok(true),
        }
    }
}

impl Visitor for RecordingVisitor {
    fn begin_array(&mut self, len: Option<usize>, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::BeginArray(len, tag))
    }

    fn end_array(&mut self, _: &ParseContext) -> VisitResult {
        self.record(Event::EndArray)
    }

    fn begin_object(&mut self, len: Option<usize>, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::BeginObject(len, tag))
    }

    fn end_object(&mut self, _: &ParseContext) -> VisitResult {
        self.record(Event::EndObject)
    }

    fn key(&mut self, name: &str, _: &ParseContext) -> VisitResult {
        self.record(Event::Key(name.to_owned()))
    }

    fn null_value(&mut self, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Null(tag))
    }

    fn bool_value(&mut self, value: bool, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Bool(value, tag))
    }

    fn uint64_value(&mut self, value: u64, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Uint64(value, tag))
    }

    fn int64_value(&mut self, value: i64, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Int64(value, tag))
    }

    fn half_value(&mut self, value: u16, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Half(value, tag))
    }

    fn double_value(&mut self, value: f64, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Double(value, tag))
    }

    fn string_value(&mut self, value: &str, tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Str(value.to_owned(), tag))
    }

    fn byte_string_value(&mut self, value: &[u8], tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::Bytes(value.to_vec(), tag))
    }

    fn typed_array_u8(&mut self, data: &[u8], tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::U8Array(data.to_vec(), tag))
    }

    fn typed_array_u16(&mut self, data: &[u16], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::U16Array(data.to_vec()))
    }

    fn typed_array_u32(&mut self, data: &[u32], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::U32Array(data.to_vec()))
    }

    fn typed_array_u64(&mut self, data: &[u64], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::U64Array(data.to_vec()))
    }

    fn typed_array_i8(&mut self, data: &[i8], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::I8Array(data.to_vec()))
    }

    fn typed_array_i16(&mut self, data: &[i16], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::I16Array(data.to_vec()))
    }

    fn typed_array_i32(&mut self, data: &[i32], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::I32Array(data.to_vec()))
    }

    fn typed_array_i64(&mut self, data: &[i64], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::I64Array(data.to_vec()))
    }

    fn typed_array_half(&mut self, data: &[u16], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::HalfArray(data.to_vec()))
    }

    fn typed_array_f32(&mut self, data: &[f32], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::F32Array(data.to_vec()))
    }

    fn typed_array_f64(&mut self, data: &[f64], _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::F64Array(data.to_vec()))
    }

    fn begin_multi_dim(&mut self, shape: &[usize], tag: SemanticTag, _: &ParseContext) -> VisitResult {
        self.record(Event::BeginMultiDim(shape.to_vec(), tag))
    }

    fn end_multi_dim(&mut self, _: &ParseContext) -> VisitResult {
        self.record(Event::EndMultiDim)
    }

    fn flush(&mut self) -> Result<(), CborError> {
        self.flushed = true;
        Ok(())
    }
}

/// Parses a hex string like `"83 01 02 03"` into bytes.
pub fn hex(s: &str) -> Vec<u8> {
    let compact: String = s.split_whitespace().collect();
    assert!(compact.len() % 2 == 0, "odd hex length: {s}");
    (0..compact.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&compact[i..i + 2], 16).expect("bad hex"))
        .collect()
}

/// Parses to completion and returns the event sequence.
pub fn parse_events(bytes: &[u8]) -> Vec<Event> {
    let mut parser = CborParser::new(Reader::new(bytes));
    let mut visitor = RecordingVisitor::new();
    parser.parse(&mut visitor).expect("parse failed");
    assert!(parser.done(), "parser did not finish");
    assert!(visitor.flushed, "flush not delivered");
    visitor.events
}

/// Parses expecting failure and returns the error.
pub fn parse_error(bytes: &[u8]) -> CborError {
    let mut parser = CborParser::new(Reader::new(bytes));
    let mut visitor = RecordingVisitor::new();
    match parser.parse(&mut visitor) {
        Ok(()) => panic!("expected error, got events {:?}", visitor.events),
        Err(e) => {
            assert!(parser.stopped());
            e
        }
    }
}
