//! Plain Old Data type codes - the element types the store can persist.

use bytemuck::Pod;
use std::fmt;

/// Plain Old Data type enum - the on-disk type code of attribute values
/// and dataset elements.
///
/// Each numeric type has a fixed size and a little-endian binary
/// representation. `String` and `FixedBytes` are variable-length and only
/// appear in attributes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PlainOldDataType {
    /// Boolean (stored as u8: 0 = false, non-zero = true)
    Boolean = 0,
    /// Unsigned 8-bit integer
    Uint8 = 1,
    /// Signed 32-bit integer
    Int32 = 6,
    /// Unsigned 64-bit integer
    Uint64 = 7,
    /// Signed 64-bit integer
    Int64 = 8,
    /// 32-bit floating point
    Float32 = 10,
    /// 64-bit floating point
    Float64 = 11,
    /// UTF-8 string
    String = 12,
    /// Fixed-width, null padded byte string (numpy `S` dtype)
    FixedBytes = 14,
    /// Unknown/invalid type
    #[default]
    Unknown = 127,
}

impl PlainOldDataType {
    /// Returns the size in bytes of a single element of this type.
    /// Variable-length types report 0.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Boolean => 1,
            Self::Uint8 => 1,
            Self::Int32 => 4,
            Self::Uint64 => 8,
            Self::Int64 => 8,
            Self::Float32 => 4,
            Self::Float64 => 8,
            Self::String | Self::FixedBytes | Self::Unknown => 0,
        }
    }

    /// Returns the name of this type as a string.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "bool",
            Self::Uint8 => "uint8",
            Self::Int32 => "int32",
            Self::Uint64 => "uint64",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "str",
            Self::FixedBytes => "bytes",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Convert from the on-disk u8 code.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Boolean,
            1 => Self::Uint8,
            6 => Self::Int32,
            7 => Self::Uint64,
            8 => Self::Int64,
            10 => Self::Float32,
            11 => Self::Float64,
            12 => Self::String,
            14 => Self::FixedBytes,
            _ => Self::Unknown,
        }
    }

    /// Returns true if elements of this type can back a dataset.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Uint8 | Self::Int32 | Self::Uint64 | Self::Int64 | Self::Float32 | Self::Float64
        )
    }
}

impl fmt::Display for PlainOldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// === Element trait for typed dataset payloads ===

/// Numeric element types that a dataset payload can be cast to and from.
pub trait Element: Pod + Copy + Default {
    /// The corresponding PlainOldDataType enum value.
    const POD_TYPE: PlainOldDataType;

    /// Size of this type in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();
}

impl Element for u8 {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Uint8;
}

impl Element for i32 {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Int32;
}

impl Element for u64 {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Uint64;
}

impl Element for i64 {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Int64;
}

impl Element for f32 {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Float32;
}

impl Element for f64 {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Float64;
}
