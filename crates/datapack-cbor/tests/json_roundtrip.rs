//! Round-trips through an independent encoder (`ciborium`) into the JSON
//! tree visitor, plus validation and chunk-fed source coverage.

use ciborium::value::Value as Cbor;
use datapack_cbor::{
    decode_to_json, validate, CborError, CborParser, JsonVisitor, StreamingByteSource,
};
use serde_json::{json, Value as Json};

fn encode(value: &Cbor) -> Vec<u8> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).expect("encode");
    bytes
}

fn text(s: &str) -> Cbor {
    Cbor::Text(s.to_owned())
}

#[test]
fn scalar_roundtrips() {
    let cases: Vec<(Cbor, Json)> = vec![
        (Cbor::Null, json!(null)),
        (Cbor::Bool(true), json!(true)),
        (Cbor::Bool(false), json!(false)),
        (Cbor::Integer(0.into()), json!(0)),
        (Cbor::Integer(23.into()), json!(23)),
        (Cbor::Integer(24.into()), json!(24)),
        (Cbor::Integer((-1).into()), json!(-1)),
        (Cbor::Integer((-1000).into()), json!(-1000)),
        (Cbor::Integer(u64::MAX.into()), json!(u64::MAX)),
        (Cbor::Float(1.5), json!(1.5)),
        (Cbor::Float(0.1), json!(0.1)),
        (Cbor::Float(-123.123), json!(-123.123)),
        (text(""), json!("")),
        (text("hello"), json!("hello")),
        (text("asdf 😱 asdf"), json!("asdf 😱 asdf")),
        (
            Cbor::Bytes(vec![1, 2, 3]),
            json!("data:application/octet-stream;base64,AQID"),
        ),
    ];
    for (value, expected) in cases {
        let bytes = encode(&value);
        let decoded = decode_to_json(&bytes).expect("decode");
        assert_eq!(decoded, expected, "for {value:?} ({bytes:02x?})");
    }
}

#[test]
fn container_roundtrips() {
    let value = Cbor::Map(vec![
        (text("foo"), text("bar")),
        (
            text("baz"),
            Cbor::Array(vec![
                Cbor::Bool(true),
                Cbor::Null,
                Cbor::Integer(123.into()),
                Cbor::Map(vec![(text("deep"), Cbor::Float(2.5))]),
            ]),
        ),
    ]);
    let expected = json!({
        "foo": "bar",
        "baz": [true, null, 123, {"deep": 2.5}],
    });
    assert_eq!(decode_to_json(&encode(&value)).unwrap(), expected);
}

#[test]
fn integer_keys_become_json_text() {
    let value = Cbor::Map(vec![(Cbor::Integer(7.into()), text("x"))]);
    assert_eq!(decode_to_json(&encode(&value)).unwrap(), json!({"7": "x"}));
}

#[test]
fn tagged_values_roundtrip() {
    // epoch timestamp: the tag is dropped in the JSON projection
    let ts = Cbor::Tag(1, Box::new(Cbor::Integer(1_364_587_440i64.into())));
    assert_eq!(
        decode_to_json(&encode(&ts)).unwrap(),
        json!(1_364_587_440i64)
    );

    // bignum renders as its decimal string
    let big = Cbor::Tag(2, Box::new(Cbor::Bytes(vec![0x01, 0x00])));
    assert_eq!(decode_to_json(&encode(&big)).unwrap(), json!("256"));
}

#[test]
fn half_precision_converts_in_the_tree() {
    // 1.0 as binary16
    assert_eq!(decode_to_json(&[0xf9, 0x3c, 0x00]).unwrap(), json!(1.0));
}

#[test]
fn validate_accepts_and_rejects() {
    assert_eq!(validate(&encode(&Cbor::Bool(true))), Ok(()));
    assert_eq!(
        validate(&encode(&Cbor::Array(vec![Cbor::Null, text("x")]))),
        Ok(())
    );
    assert_eq!(validate(&[]), Err(CborError::UnexpectedEof));
    assert_eq!(validate(&[0x1c]), Err(CborError::UnknownType));
    assert_eq!(validate(&[0x62, 0xc3, 0x28]), Err(CborError::InvalidUtf8TextString));
}

#[test]
fn chunk_fed_source_matches_slice_parse() {
    let value = Cbor::Map(vec![
        (text("list"), Cbor::Array(vec![Cbor::Integer(1.into()), Cbor::Float(1.5)])),
        (text("blob"), Cbor::Bytes(vec![9, 8, 7])),
    ]);
    let bytes = encode(&value);
    let expected = decode_to_json(&bytes).unwrap();

    // feed one byte at a time
    let mut source = StreamingByteSource::new();
    for &b in &bytes {
        source.push(vec![b]);
    }
    let mut parser = CborParser::new(source);
    let mut visitor = JsonVisitor::new();
    parser.parse(&mut visitor).unwrap();
    assert!(parser.done());
    assert_eq!(visitor.into_value(), Some(expected));
}
