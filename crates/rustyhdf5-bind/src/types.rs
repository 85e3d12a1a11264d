//! Element types and attribute values.
//!
//! [`Element`] is implemented for the closed set of primitive types a node
//! can hold: `i8`, `i32`, `i64`, `f32`, `f64` and `String` (stored as a
//! fixed-width, NUL-padded single-byte string). Values cross the store
//! boundary as packed little-endian bytes.

use std::fmt;

pub use rustyhdf5_store::ElementType;

use crate::error::{Error, Result};

/// A Rust type that can be stored as an array element or attribute value.
pub trait Element: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Human-readable name used in type mismatch errors.
    const NAME: &'static str;

    /// Store element type for new nodes; `string_width` only applies to strings.
    fn element_type(string_width: usize) -> ElementType;

    /// Whether a node of type `ty` can be read and written as `Self`.
    fn matches(ty: &ElementType) -> bool {
        ty.same_class(&Self::element_type(1))
    }

    /// Append the encoding of `self` for a node of type `ty`.
    fn encode(&self, ty: &ElementType, out: &mut Vec<u8>) -> Result<()>;

    /// Decode one element of type `ty` from exactly `ty.size()` bytes.
    fn decode(ty: &ElementType, bytes: &[u8]) -> Result<Self>;
}

macro_rules! numeric_element {
    ($t:ty, $variant:ident, $name:literal) => {
        impl Element for $t {
            const NAME: &'static str = $name;

            fn element_type(_string_width: usize) -> ElementType {
                ElementType::$variant
            }

            fn encode(&self, _ty: &ElementType, out: &mut Vec<u8>) -> Result<()> {
                out.extend_from_slice(&self.to_le_bytes());
                Ok(())
            }

            fn decode(_ty: &ElementType, bytes: &[u8]) -> Result<Self> {
                let raw = bytes.try_into().map_err(|_| {
                    Error::InvalidState(format!(
                        "{} bytes cannot hold a {}",
                        bytes.len(),
                        $name
                    ))
                })?;
                Ok(<$t>::from_le_bytes(raw))
            }
        }
    };
}

numeric_element!(i8, I8, "i8");
numeric_element!(i32, I32, "i32");
numeric_element!(i64, I64, "i64");
numeric_element!(f32, F32, "f32");
numeric_element!(f64, F64, "f64");

impl Element for String {
    const NAME: &'static str = "string";

    fn element_type(string_width: usize) -> ElementType {
        ElementType::FixedString {
            width: string_width,
        }
    }

    fn encode(&self, ty: &ElementType, out: &mut Vec<u8>) -> Result<()> {
        let width = ty.size();
        let bytes = encode_single_byte(self)?;
        // One byte is kept for the NUL terminator.
        if bytes.len() + 1 > width {
            return Err(Error::IndexOutOfRange(format!(
                "string of {} bytes does not fit a {width}-byte element",
                bytes.len()
            )));
        }
        out.extend_from_slice(&bytes);
        out.resize(out.len() + width - bytes.len(), 0);
        Ok(())
    }

    fn decode(_ty: &ElementType, bytes: &[u8]) -> Result<Self> {
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        Ok(bytes[..end].iter().map(|&b| char::from(b)).collect())
    }
}

/// Encode to ISO-8859-1: one byte per character, code points above U+00FF
/// are rejected.
fn encode_single_byte(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| {
            u8::try_from(c).map_err(|_| {
                Error::UnsupportedType(format!(
                    "character {c:?} is outside the single-byte string encoding"
                ))
            })
        })
        .collect()
}

/// Encode a run of elements for a node of type `ty`.
pub(crate) fn encode_all<T: Element>(values: &[T], ty: &ElementType) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len() * ty.size());
    for v in values {
        v.encode(ty, &mut out)?;
    }
    Ok(out)
}

/// Decode packed elements of type `ty`.
pub(crate) fn decode_all<T: Element>(bytes: &[u8], ty: &ElementType) -> Result<Vec<T>> {
    bytes.chunks_exact(ty.size()).map(|c| T::decode(ty, c)).collect()
}

pub(crate) fn check_type<T: Element>(ty: &ElementType) -> Result<()> {
    if T::matches(ty) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            expected: T::NAME.to_string(),
            actual: ty.to_string(),
        })
    }
}

/// A scalar attribute value over the fixed primitive set.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    I8(i8),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
}

impl AttrValue {
    /// Element type a new attribute holding this value would get.
    pub fn element_type(&self, string_width: usize) -> ElementType {
        match self {
            AttrValue::I8(_) => ElementType::I8,
            AttrValue::I32(_) => ElementType::I32,
            AttrValue::I64(_) => ElementType::I64,
            AttrValue::F32(_) => ElementType::F32,
            AttrValue::F64(_) => ElementType::F64,
            AttrValue::String(_) => ElementType::FixedString {
                width: string_width,
            },
        }
    }

    /// Encode for a node of type `ty`; the value's class must match exactly.
    pub fn encode(&self, ty: &ElementType) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(ty.size());
        match self {
            AttrValue::I8(v) => encode_checked(v, ty, &mut out)?,
            AttrValue::I32(v) => encode_checked(v, ty, &mut out)?,
            AttrValue::I64(v) => encode_checked(v, ty, &mut out)?,
            AttrValue::F32(v) => encode_checked(v, ty, &mut out)?,
            AttrValue::F64(v) => encode_checked(v, ty, &mut out)?,
            AttrValue::String(v) => encode_checked(v, ty, &mut out)?,
        }
        Ok(out)
    }

    pub fn decode(ty: &ElementType, bytes: &[u8]) -> Result<Self> {
        Ok(match ty {
            ElementType::I8 => AttrValue::I8(i8::decode(ty, bytes)?),
            ElementType::I32 => AttrValue::I32(i32::decode(ty, bytes)?),
            ElementType::I64 => AttrValue::I64(i64::decode(ty, bytes)?),
            ElementType::F32 => AttrValue::F32(f32::decode(ty, bytes)?),
            ElementType::F64 => AttrValue::F64(f64::decode(ty, bytes)?),
            ElementType::FixedString { .. } => AttrValue::String(String::decode(ty, bytes)?),
        })
    }
}

fn encode_checked<T: Element>(v: &T, ty: &ElementType, out: &mut Vec<u8>) -> Result<()> {
    check_type::<T>(ty)?;
    v.encode(ty, out)
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::I8(v) => write!(f, "{v}"),
            AttrValue::I32(v) => write!(f, "{v}"),
            AttrValue::I64(v) => write!(f, "{v}"),
            AttrValue::F32(v) => write!(f, "{v}"),
            AttrValue::F64(v) => write!(f, "{v}"),
            AttrValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

macro_rules! attr_from {
    ($t:ty, $variant:ident) => {
        impl From<$t> for AttrValue {
            fn from(v: $t) -> Self {
                AttrValue::$variant(v)
            }
        }
    };
}

attr_from!(i8, I8);
attr_from!(i32, I32);
attr_from!(i64, I64);
attr_from!(f32, F32);
attr_from!(f64, F64);
attr_from!(String, String);

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::String(v.to_string())
    }
}
