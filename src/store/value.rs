//! Typed attribute values and the ordered attribute map of a group.
//!
//! Attributes are small key/value pairs persisted next to a group. Values are
//! a closed set of scalar and array types, each carried on disk with its
//! [`PlainOldDataType`] code.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;

use crate::util::{Error, PlainOldDataType, Result};

/// Scalar/array marker following the type code.
const SCALAR: u8 = 0;
const ARRAY: u8 = 1;

/// A single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    /// Array of fixed-width byte strings. Stored with one common width and
    /// null padding; trailing nulls are stripped on read.
    ByteStrings(Vec<Vec<u8>>),
}

impl AttrValue {
    /// Build a byte-string array from anything byte-like.
    pub fn byte_strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::ByteStrings(items.into_iter().map(|s| s.as_ref().to_vec()).collect())
    }

    /// On-disk type code of this value.
    pub fn pod_type(&self) -> PlainOldDataType {
        match self {
            Self::Bool(_) => PlainOldDataType::Boolean,
            Self::Int(_) | Self::IntArray(_) => PlainOldDataType::Int64,
            Self::Float(_) | Self::FloatArray(_) => PlainOldDataType::Float64,
            Self::Str(_) => PlainOldDataType::String,
            Self::ByteStrings(_) => PlainOldDataType::FixedBytes,
        }
    }

    /// Short type name used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::IntArray(_) => "int array",
            Self::FloatArray(_) => "float array",
            Self::ByteStrings(_) => "byte string array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte_strings(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::ByteStrings(items) => Some(items),
            _ => None,
        }
    }

    /// Append the binary encoding of this value to `out`.
    pub(crate) fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u8(self.pod_type() as u8)?;
        match self {
            Self::Bool(v) => {
                out.write_u8(SCALAR)?;
                out.write_u8(*v as u8)?;
            }
            Self::Int(v) => {
                out.write_u8(SCALAR)?;
                out.write_i64::<LittleEndian>(*v)?;
            }
            Self::Float(v) => {
                out.write_u8(SCALAR)?;
                out.write_f64::<LittleEndian>(*v)?;
            }
            Self::Str(s) => {
                out.write_u8(SCALAR)?;
                write_len(out, s.len())?;
                out.extend_from_slice(s.as_bytes());
            }
            Self::IntArray(values) => {
                out.write_u8(ARRAY)?;
                write_len(out, values.len())?;
                for v in values {
                    out.write_i64::<LittleEndian>(*v)?;
                }
            }
            Self::FloatArray(values) => {
                out.write_u8(ARRAY)?;
                write_len(out, values.len())?;
                for v in values {
                    out.write_f64::<LittleEndian>(*v)?;
                }
            }
            Self::ByteStrings(items) => {
                out.write_u8(ARRAY)?;
                // At least one byte per item keeps `count * width` bounded by the blob
                let width = items.iter().map(Vec::len).max().unwrap_or(0).max(1);
                write_len(out, width)?;
                write_len(out, items.len())?;
                for item in items {
                    out.extend_from_slice(item);
                    out.resize(out.len() + (width - item.len()), 0);
                }
            }
        }
        Ok(())
    }

    /// Decode one value from the cursor.
    pub(crate) fn decode(cur: &mut Cursor<&[u8]>) -> Result<Self> {
        let code = read_u8(cur)?;
        let shape = read_u8(cur)?;
        let pod = PlainOldDataType::from_u8(code);

        let value = match (pod, shape) {
            (PlainOldDataType::Boolean, SCALAR) => Self::Bool(read_u8(cur)? != 0),
            (PlainOldDataType::Int64, SCALAR) => Self::Int(read_i64(cur)?),
            (PlainOldDataType::Float64, SCALAR) => Self::Float(read_f64(cur)?),
            (PlainOldDataType::String, SCALAR) => {
                let len = read_len(cur)?;
                Self::Str(String::from_utf8(read_exact(cur, len)?)?)
            }
            (PlainOldDataType::Int64, ARRAY) => {
                let count = read_len(cur)?;
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(read_i64(cur)?);
                }
                Self::IntArray(values)
            }
            (PlainOldDataType::Float64, ARRAY) => {
                let count = read_len(cur)?;
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(read_f64(cur)?);
                }
                Self::FloatArray(values)
            }
            (PlainOldDataType::FixedBytes, ARRAY) => {
                let width = read_len(cur)?;
                let count = read_len(cur)?;
                let remaining = cur.get_ref().len() as u64 - cur.position();
                if (width == 0 && count > 0) || (width as u64) * (count as u64) > remaining {
                    return Err(Error::invalid(format!(
                        "byte string array of {} x {} bytes in {} remaining",
                        count, width, remaining
                    )));
                }
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let mut item = read_exact(cur, width)?;
                    let end = item.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                    item.truncate(end);
                    items.push(item);
                }
                Self::ByteStrings(items)
            }
            _ => {
                return Err(Error::invalid(format!(
                    "unsupported attribute encoding: type {} shape {}",
                    pod, shape
                )))
            }
        };
        Ok(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::IntArray(v) => write!(f, "{:?}", v),
            Self::FloatArray(v) => write!(f, "{:?}", v),
            Self::ByteStrings(items) => {
                let names: Vec<_> = items.iter().map(|b| String::from_utf8_lossy(b)).collect();
                write!(f, "{:?}", names)
            }
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        Self::IntArray(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        Self::FloatArray(v)
    }
}

impl From<&[f64]> for AttrValue {
    fn from(v: &[f64]) -> Self {
        Self::FloatArray(v.to_vec())
    }
}

/// Ordered attribute map - key/value pairs of a group.
///
/// Insertion order is preserved; setting an existing key replaces the value
/// in place. Uses SmallVec since most groups carry only a handful of entries.
#[derive(Clone, Default, PartialEq)]
pub struct Attrs {
    entries: SmallVec<[(String, AttrValue); 4]>,
}

impl Attrs {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a value, replacing any existing entry with the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let key = key.into();
        let value = value.into();

        for (k, v) in &mut self.entries {
            if k == &key {
                *v = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a string value by key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Remove a key and return its value.
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Merge every entry of `other` into this map, `other` winning on conflict.
    pub fn merge(&mut self, other: Attrs) {
        for (k, v) in other.entries {
            self.set(k, v);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Serialize to the attribute blob stored as a group's first child.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_len(&mut out, self.entries.len())?;
        for (k, v) in &self.entries {
            write_len(&mut out, k.len())?;
            out.extend_from_slice(k.as_bytes());
            v.encode(&mut out)?;
        }
        Ok(out)
    }

    /// Parse an attribute blob.
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let mut attrs = Self::new();
        if bytes.is_empty() {
            return Ok(attrs);
        }

        let mut cur = Cursor::new(bytes);
        let count = read_len(&mut cur)?;
        for _ in 0..count {
            let klen = read_len(&mut cur)?;
            let key = String::from_utf8(read_exact(&mut cur, klen)?)?;
            let value = AttrValue::decode(&mut cur)?;
            attrs.set(key, value);
        }
        Ok(attrs)
    }
}

impl fmt::Debug for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attrs {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut attrs = Self::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

// === Cursor helpers ===

pub(crate) fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::invalid("length exceeds u32"))?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn eof(cur: &Cursor<&[u8]>) -> Error {
    Error::UnexpectedEof(cur.position())
}

pub(crate) fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8> {
    cur.read_u8().map_err(|_| eof(cur))
}

pub(crate) fn read_len(cur: &mut Cursor<&[u8]>) -> Result<usize> {
    cur.read_u32::<LittleEndian>().map(|v| v as usize).map_err(|_| eof(cur))
}

pub(crate) fn read_u64(cur: &mut Cursor<&[u8]>) -> Result<u64> {
    cur.read_u64::<LittleEndian>().map_err(|_| eof(cur))
}

fn read_i64(cur: &mut Cursor<&[u8]>) -> Result<i64> {
    cur.read_i64::<LittleEndian>().map_err(|_| eof(cur))
}

fn read_f64(cur: &mut Cursor<&[u8]>) -> Result<f64> {
    cur.read_f64::<LittleEndian>().map_err(|_| eof(cur))
}

pub(crate) fn read_exact(cur: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cur.get_ref().len() as u64 - cur.position().min(cur.get_ref().len() as u64);
    if len as u64 > remaining {
        return Err(Error::UnexpectedEof(cur.position() + len as u64));
    }
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf).map_err(|_| eof(cur))?;
    Ok(buf)
}
