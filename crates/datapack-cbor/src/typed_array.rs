//! Typed arrays (RFC 8746, tags 0x40–0x56).
//!
//! A typed array is a byte string whose tag declares a packed homogeneous
//! numeric layout. The tag byte is `0b010f_sell`: `f` float, `s` signed,
//! `e` little-endian, `ll` width exponent.

/// Element category of a typed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
    Uint,
    /// Tag 0x44: u8 elements with clamped-conversion semantics.
    ClampedUint,
    Int,
    /// Covers half, single, and double precision by element width.
    Float,
}

/// Element layout decoded from a typed-array tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedArrayDescriptor {
    pub kind: TypedArrayKind,
    pub little_endian: bool,
    pub bytes_per_element: usize,
}

impl TypedArrayDescriptor {
    /// Decodes a tag number in the typed-array block, or `None` for the
    /// reserved combinations (0x4c, and the float128 tags 0x53 / 0x57).
    pub fn from_tag(tag: u8) -> Option<TypedArrayDescriptor> {
        if !(0x40..=0x57).contains(&tag) {
            return None;
        }
        let float = tag & 0x10 != 0;
        let signed = tag & 0x08 != 0;
        let little_endian = tag & 0x04 != 0;
        let bytes_per_element = 1usize << ((tag & 0x03) + u8::from(float));
        let kind = match (float, signed) {
            (true, _) if bytes_per_element == 16 => return None,
            (true, _) => TypedArrayKind::Float,
            (false, true) if bytes_per_element == 1 && little_endian => return None,
            (false, true) => TypedArrayKind::Int,
            (false, false) if bytes_per_element == 1 && little_endian => TypedArrayKind::ClampedUint,
            (false, false) => TypedArrayKind::Uint,
        };
        Some(TypedArrayDescriptor {
            kind,
            little_endian,
            bytes_per_element,
        })
    }
}

macro_rules! decode_fn {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $width:literal) => {
        $(#[$doc])*
        pub fn $name(bytes: &[u8], little_endian: bool) -> Vec<$ty> {
            bytes
                .chunks_exact($width)
                .map(|chunk| {
                    let mut raw = [0u8; $width];
                    raw.copy_from_slice(chunk);
                    if little_endian {
                        <$ty>::from_le_bytes(raw)
                    } else {
                        <$ty>::from_be_bytes(raw)
                    }
                })
                .collect()
        }
    };
}

decode_fn!(
    /// Decodes u16 elements; half-float payloads reuse this and keep the
    /// raw bit patterns.
    decode_u16, u16, 2
);
decode_fn!(decode_u32, u32, 4);
decode_fn!(decode_u64, u64, 8);
decode_fn!(decode_i16, i16, 2);
decode_fn!(decode_i32, i32, 4);
decode_fn!(decode_i64, i64, 8);
decode_fn!(decode_f32, f32, 4);
decode_fn!(decode_f64, f64, 8);

/// Decodes i8 elements.
pub fn decode_i8(bytes: &[u8]) -> Vec<i8> {
    bytes.iter().map(|&b| b as i8).collect()
}
