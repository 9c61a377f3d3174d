//! A visitor that builds a `serde_json::Value` tree.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use half::f16;
use serde_json::{Map, Number, Value};

use crate::tag::SemanticTag;
use crate::visitor::{ParseContext, VisitResult, Visitor};

enum Frame {
    Array(Vec<Value>),
    Object(Map<String, Value>, Option<String>),
}

/// Builds a JSON tree from the event stream, losing CBOR-specific types.
///
/// Byte strings become `data:application/octet-stream;base64,…` strings;
/// typed arrays arrive through the default decomposition as plain arrays
/// of numbers; non-finite floats become `null`.
#[derive(Default)]
pub struct JsonVisitor {
    stack: Vec<Frame>,
    root: Option<Value>,
}

impl JsonVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished tree, if a complete root item was delivered.
    pub fn into_value(self) -> Option<Value> {
        self.root
    }

    fn push_value(&mut self, value: Value) -> VisitResult {
        match self.stack.last_mut() {
            None => self.root = Some(value),
            Some(Frame::Array(items)) => items.push(value),
            Some(Frame::Object(map, pending_key)) => {
                let key = pending_key.take().unwrap_or_default();
                map.insert(key, value);
            }
        }
        Ok(true)
    }
}

impl Visitor for JsonVisitor {
    fn begin_array(&mut self, len: Option<usize>, _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.stack.push(Frame::Array(Vec::with_capacity(
            len.unwrap_or(0).min(4096),
        )));
        Ok(true)
    }

    fn end_array(&mut self, _: &ParseContext) -> VisitResult {
        match self.stack.pop() {
            Some(Frame::Array(items)) => self.push_value(Value::Array(items)),
            _ => Ok(true),
        }
    }

    fn begin_object(
        &mut self,
        _: Option<usize>,
        _: SemanticTag,
        _: &ParseContext,
    ) -> VisitResult {
        self.stack.push(Frame::Object(Map::new(), None));
        Ok(true)
    }

    fn end_object(&mut self, _: &ParseContext) -> VisitResult {
        match self.stack.pop() {
            Some(Frame::Object(map, _)) => self.push_value(Value::Object(map)),
            _ => Ok(true),
        }
    }

    fn key(&mut self, name: &str, _: &ParseContext) -> VisitResult {
        if let Some(Frame::Object(_, pending_key)) = self.stack.last_mut() {
            *pending_key = Some(name.to_owned());
        }
        Ok(true)
    }

    fn null_value(&mut self, _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.push_value(Value::Null)
    }

    fn bool_value(&mut self, value: bool, _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.push_value(Value::Bool(value))
    }

    fn uint64_value(&mut self, value: u64, _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.push_value(Value::Number(value.into()))
    }

    fn int64_value(&mut self, value: i64, _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.push_value(Value::Number(value.into()))
    }

    fn half_value(&mut self, value: u16, _: SemanticTag, _: &ParseContext) -> VisitResult {
        let converted = f64::from(f16::from_bits(value));
        let number = Number::from_f64(converted)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.push_value(number)
    }

    fn double_value(&mut self, value: f64, _: SemanticTag, _: &ParseContext) -> VisitResult {
        let number = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.push_value(number)
    }

    fn string_value(&mut self, value: &str, _: SemanticTag, _: &ParseContext) -> VisitResult {
        self.push_value(Value::String(value.to_owned()))
    }

    fn byte_string_value(&mut self, value: &[u8], _: SemanticTag, _: &ParseContext) -> VisitResult {
        let encoded = format!("data:application/octet-stream;base64,{}", STANDARD.encode(value));
        self.push_value(Value::String(encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ParseContext {
        ParseContext::new(0)
    }

    #[test]
    fn builds_nested_tree() {
        let mut v = JsonVisitor::new();
        let c = ctx();
        v.begin_object(Some(2), SemanticTag::None, &c).unwrap();
        v.key("a", &c).unwrap();
        v.uint64_value(1, SemanticTag::None, &c).unwrap();
        v.key("b", &c).unwrap();
        v.begin_array(Some(2), SemanticTag::None, &c).unwrap();
        v.bool_value(true, SemanticTag::None, &c).unwrap();
        v.null_value(SemanticTag::None, &c).unwrap();
        v.end_array(&c).unwrap();
        v.end_object(&c).unwrap();
        assert_eq!(v.into_value(), Some(json!({"a": 1, "b": [true, null]})));
    }

    #[test]
    fn half_converts_to_double() {
        let mut v = JsonVisitor::new();
        v.half_value(0x3c00, SemanticTag::None, &ctx()).unwrap();
        assert_eq!(v.into_value(), Some(json!(1.0)));
    }

    #[test]
    fn bytes_become_data_uri() {
        let mut v = JsonVisitor::new();
        v.byte_string_value(&[1, 2, 3], SemanticTag::None, &ctx())
            .unwrap();
        assert_eq!(
            v.into_value(),
            Some(json!("data:application/octet-stream;base64,AQID"))
        );
    }

    #[test]
    fn nan_becomes_null() {
        let mut v = JsonVisitor::new();
        v.double_value(f64::NAN, SemanticTag::None, &ctx()).unwrap();
        assert_eq!(v.into_value(), Some(Value::Null));
    }
}
