//! Auxiliary tag data.
//!
//! Each field on the wire is a 2-byte tag, a 1-byte type code, and a type-dependent
//! payload. `B` arrays carry an element subtype byte and a little-endian `u32` count.
//!
//! Tags are kept in wire order. The format does not forbid repeated tags, so [`Data`]
//! preserves duplicates as read and [`Data::get`] returns the first occurrence.

use std::fmt;

use bstr::BString;

use super::codec::Cursor;
use crate::errors::{BamError, Result};

/// A two-character auxiliary field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag([u8; 2]);

impl Tag {
    /// Create a tag from two bytes without validation.
    #[must_use]
    pub const fn new(a: u8, b: u8) -> Self {
        Self([a, b])
    }

    /// The raw tag bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }

    /// Whether the tag matches `[A-Za-z][A-Za-z0-9]`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0[0].is_ascii_alphabetic() && self.0[1].is_ascii_alphanumeric()
    }
}

impl From<[u8; 2]> for Tag {
    fn from(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&str> for Tag {
    type Error = BamError;

    fn try_from(s: &str) -> Result<Self> {
        match s.as_bytes() {
            &[a, b] => {
                let tag = Self([a, b]);
                if tag.is_valid() {
                    Ok(tag)
                } else {
                    Err(BamError::validation(format!("invalid tag name '{s}'")))
                }
            }
            _ => Err(BamError::validation(format!("tag name '{s}' must be exactly 2 characters"))),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(self.0[0]), char::from(self.0[1]))
    }
}

/// A typed numeric array (`B` type).
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    /// `B:c`
    Int8(Vec<i8>),
    /// `B:C`
    UInt8(Vec<u8>),
    /// `B:s`
    Int16(Vec<i16>),
    /// `B:S`
    UInt16(Vec<u16>),
    /// `B:i`
    Int32(Vec<i32>),
    /// `B:I`
    UInt32(Vec<u32>),
    /// `B:f`
    Float(Vec<f32>),
}

impl Array {
    /// The element subtype code.
    #[must_use]
    pub fn subtype(&self) -> u8 {
        match self {
            Self::Int8(_) => b'c',
            Self::UInt8(_) => b'C',
            Self::Int16(_) => b's',
            Self::UInt16(_) => b'S',
            Self::Int32(_) => b'i',
            Self::UInt32(_) => b'I',
            Self::Float(_) => b'f',
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    /// Whether the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A typed auxiliary field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `A`: a single printable character.
    Character(u8),
    /// `c`
    Int8(i8),
    /// `C`
    UInt8(u8),
    /// `s`
    Int16(i16),
    /// `S`
    UInt16(u16),
    /// `i`
    Int32(i32),
    /// `I`
    UInt32(u32),
    /// `f`
    Float(f32),
    /// `Z`: NUL-terminated text.
    String(BString),
    /// `H`: NUL-terminated hex-encoded byte array.
    Hex(BString),
    /// `B`: typed numeric array.
    Array(Array),
}

impl Value {
    /// The wire type code.
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match self {
            Self::Character(_) => b'A',
            Self::Int8(_) => b'c',
            Self::UInt8(_) => b'C',
            Self::Int16(_) => b's',
            Self::UInt16(_) => b'S',
            Self::Int32(_) => b'i',
            Self::UInt32(_) => b'I',
            Self::Float(_) => b'f',
            Self::String(_) => b'Z',
            Self::Hex(_) => b'H',
            Self::Array(_) => b'B',
        }
    }

    /// The value as an integer, for any of the integer types.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int8(n) => Some(i64::from(n)),
            Self::UInt8(n) => Some(i64::from(n)),
            Self::Int16(n) => Some(i64::from(n)),
            Self::UInt16(n) => Some(i64::from(n)),
            Self::Int32(n) => Some(i64::from(n)),
            Self::UInt32(n) => Some(i64::from(n)),
            _ => None,
        }
    }

    /// The value as text, for `Z` and `H` values.
    #[must_use]
    pub fn as_str(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) | Self::Hex(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    /// The value as a float, for `f` values.
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Self::Float(f) => Some(f),
            _ => None,
        }
    }
}

/// Signed integers use the smallest signed type that holds the value.
impl From<i32> for Value {
    fn from(n: i32) -> Self {
        if let Ok(v) = i8::try_from(n) {
            Self::Int8(v)
        } else if let Ok(v) = i16::try_from(n) {
            Self::Int16(v)
        } else {
            Self::Int32(n)
        }
    }
}

/// Unsigned integers use the smallest unsigned type that holds the value.
impl From<u32> for Value {
    fn from(n: u32) -> Self {
        if let Ok(v) = u8::try_from(n) {
            Self::UInt8(v)
        } else if let Ok(v) = u16::try_from(n) {
            Self::UInt16(v)
        } else {
            Self::UInt32(n)
        }
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(BString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(BString::from(s))
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

/// Ordered auxiliary fields of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data(Vec<(Tag, Value)>);

impl Data {
    /// Create empty data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The first value stored under `tag`.
    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&Value> {
        self.0.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Every value stored under `tag`, in order.
    pub fn get_all(&self, tag: Tag) -> impl Iterator<Item = &Value> {
        self.0.iter().filter(move |(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Append a field, keeping any existing field with the same tag.
    pub fn push(&mut self, tag: Tag, value: Value) {
        self.0.push((tag, value));
    }

    /// Set `tag` to `value`.
    ///
    /// Replaces the first occurrence in place and drops later duplicates of the tag;
    /// appends when the tag is absent.
    pub fn insert(&mut self, tag: Tag, value: Value) {
        match self.0.iter().position(|(t, _)| *t == tag) {
            Some(i) => {
                self.0[i].1 = value;
                let mut seen = 0usize;
                self.0.retain(|(t, _)| {
                    if *t == tag {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.0.push((tag, value)),
        }
    }

    /// Remove every occurrence of `tag`, returning the first removed value.
    pub fn remove(&mut self, tag: Tag) -> Option<Value> {
        let first = self.0.iter().position(|(t, _)| *t == tag)?;
        let (_, value) = self.0.remove(first);
        self.0.retain(|(t, _)| *t != tag);
        Some(value)
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl Iterator<Item = &(Tag, Value)> {
        self.0.iter()
    }

    /// Number of fields, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Tag, Value)> for Data {
    fn from_iter<I: IntoIterator<Item = (Tag, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<(Tag, Value)>> for Data {
    fn from(fields: Vec<(Tag, Value)>) -> Self {
        Self(fields)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode every remaining field in `src`.
pub(crate) fn decode_data(src: &mut Cursor<'_>) -> Result<Data> {
    let mut fields = Vec::new();
    while !src.is_empty() {
        let raw = src.take(2, "tag name")?;
        let tag = Tag::new(raw[0], raw[1]);
        let type_code = src.u8("tag type")?;
        let value = decode_value(src, tag, type_code)?;
        fields.push((tag, value));
    }
    Ok(Data(fields))
}

fn decode_value(src: &mut Cursor<'_>, tag: Tag, type_code: u8) -> Result<Value> {
    let value = match type_code {
        b'A' => Value::Character(src.u8("character tag")?),
        b'c' => Value::Int8(src.u8("int8 tag")? as i8),
        b'C' => Value::UInt8(src.u8("uint8 tag")?),
        b's' => Value::Int16(src.i16("int16 tag")?),
        b'S' => Value::UInt16(src.u16("uint16 tag")?),
        b'i' => Value::Int32(src.i32("int32 tag")?),
        b'I' => Value::UInt32(src.u32("uint32 tag")?),
        b'f' => Value::Float(f32::from_bits(src.u32("float tag")?)),
        b'Z' => Value::String(BString::from(src.nul_terminated("string tag")?)),
        b'H' => Value::Hex(BString::from(src.nul_terminated("hex tag")?)),
        b'B' => Value::Array(decode_array(src, tag)?),
        other => {
            return Err(BamError::format(format!(
                "unrecognized type code '{}' for tag {tag}",
                other.escape_ascii()
            )));
        }
    };
    Ok(value)
}

fn decode_array(src: &mut Cursor<'_>, tag: Tag) -> Result<Array> {
    let subtype = src.u8("array subtype")?;
    let count = src.u32("array count")? as usize;
    let elem_size = match subtype {
        b'c' | b'C' => 1,
        b's' | b'S' => 2,
        b'i' | b'I' | b'f' => 4,
        other => {
            return Err(BamError::format(format!(
                "unrecognized array subtype '{}' for tag {tag}",
                other.escape_ascii()
            )));
        }
    };
    let len = count
        .checked_mul(elem_size)
        .ok_or_else(|| BamError::format(format!("array count {count} overflows for tag {tag}")))?;
    let bytes = src.take(len, "array values")?;

    let array = match subtype {
        b'c' => Array::Int8(bytes.iter().map(|&b| b as i8).collect()),
        b'C' => Array::UInt8(bytes.to_vec()),
        b's' => Array::Int16(bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()),
        b'S' => Array::UInt16(bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect()),
        b'i' => Array::Int32(
            bytes.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
        b'I' => Array::UInt32(
            bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
        _ => Array::Float(
            bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
        ),
    };
    Ok(array)
}

// ============================================================================
// Encoding
// ============================================================================

/// Append every field to `dst`.
pub(crate) fn encode_data(dst: &mut Vec<u8>, data: &Data) -> Result<()> {
    for (tag, value) in data.iter() {
        dst.extend_from_slice(tag.as_bytes());
        dst.push(value.type_code());
        encode_value(dst, *tag, value)?;
    }
    Ok(())
}

fn encode_value(dst: &mut Vec<u8>, tag: Tag, value: &Value) -> Result<()> {
    match value {
        Value::Character(c) => dst.push(*c),
        Value::Int8(n) => dst.push(*n as u8),
        Value::UInt8(n) => dst.push(*n),
        Value::Int16(n) => dst.extend_from_slice(&n.to_le_bytes()),
        Value::UInt16(n) => dst.extend_from_slice(&n.to_le_bytes()),
        Value::Int32(n) => dst.extend_from_slice(&n.to_le_bytes()),
        Value::UInt32(n) => dst.extend_from_slice(&n.to_le_bytes()),
        Value::Float(f) => dst.extend_from_slice(&f.to_le_bytes()),
        Value::String(s) | Value::Hex(s) => {
            if s.contains(&0) {
                return Err(BamError::validation(format!("tag {tag} value contains a NUL byte")));
            }
            dst.extend_from_slice(s);
            dst.push(0);
        }
        Value::Array(array) => encode_array(dst, tag, array)?,
    }
    Ok(())
}

fn encode_array(dst: &mut Vec<u8>, tag: Tag, array: &Array) -> Result<()> {
    let count = u32::try_from(array.len())
        .map_err(|_| BamError::validation(format!("tag {tag} array has too many elements")))?;
    dst.push(array.subtype());
    dst.extend_from_slice(&count.to_le_bytes());
    match array {
        Array::Int8(v) => dst.extend(v.iter().map(|&n| n as u8)),
        Array::UInt8(v) => dst.extend_from_slice(v),
        Array::Int16(v) => v.iter().for_each(|n| dst.extend_from_slice(&n.to_le_bytes())),
        Array::UInt16(v) => v.iter().for_each(|n| dst.extend_from_slice(&n.to_le_bytes())),
        Array::Int32(v) => v.iter().for_each(|n| dst.extend_from_slice(&n.to_le_bytes())),
        Array::UInt32(v) => v.iter().for_each(|n| dst.extend_from_slice(&n.to_le_bytes())),
        Array::Float(v) => v.iter().for_each(|n| dst.extend_from_slice(&n.to_le_bytes())),
    }
    Ok(())
}
