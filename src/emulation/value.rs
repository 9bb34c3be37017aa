//! Runtime value representation for CIL emulation.

use std::fmt;

/// Runtime value on the evaluation stack or in an argument/local slot.
///
/// The set is closed: every handler matches exhaustively over it, and two values of different
/// variants are never coerced into each other.
///
/// # CIL Type Mapping
///
/// | CIL Type | EmValue Variant |
/// |----------|-----------------|
/// | `int8`, `int16`, `int32` | [`EmValue::I32`] |
/// | `uint8`, `uint16`, `uint32` | [`EmValue::I32`] (bit pattern preserved) |
/// | `int64`, `uint64` | [`EmValue::I64`] |
/// | `float32` | [`EmValue::F32`] |
/// | `float64` | [`EmValue::F64`] |
/// | `int32[]` / `uint32[]` | [`EmValue::ArrayRef`] |
///
/// Decode sentinels are plain [`EmValue::I32`] literals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EmValue {
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 32-bit floating point
    F32(f32),
    /// 64-bit floating point
    F64(f64),
    /// Reference to a 32-bit integer array owned by the execution context
    ArrayRef(HeapRef),
}

impl EmValue {
    /// Returns a static string name for this value's type variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            EmValue::I32(_) => "I32",
            EmValue::I64(_) => "I64",
            EmValue::F32(_) => "F32",
            EmValue::F64(_) => "F64",
            EmValue::ArrayRef(_) => "ArrayRef",
        }
    }

    /// Returns the value as `i32` if it is an [`EmValue::I32`]
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            EmValue::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is an [`EmValue::I64`]
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EmValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the array reference if this is an [`EmValue::ArrayRef`]
    #[must_use]
    pub fn as_array_ref(&self) -> Option<HeapRef> {
        match self {
            EmValue::ArrayRef(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns true if both values have the same variant
    #[must_use]
    pub fn same_kind(&self, other: &EmValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<i32> for EmValue {
    fn from(value: i32) -> Self {
        EmValue::I32(value)
    }
}

impl From<i64> for EmValue {
    fn from(value: i64) -> Self {
        EmValue::I64(value)
    }
}

impl From<f32> for EmValue {
    fn from(value: f32) -> Self {
        EmValue::F32(value)
    }
}

impl From<f64> for EmValue {
    fn from(value: f64) -> Self {
        EmValue::F64(value)
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::I32(v) => write!(f, "{v} (0x{v:08X})"),
            EmValue::I64(v) => write!(f, "{v}L (0x{v:016X})"),
            EmValue::F32(v) => write!(f, "{v}f"),
            EmValue::F64(v) => write!(f, "{v}d"),
            EmValue::ArrayRef(r) => write!(f, "{r}"),
        }
    }
}

/// Reference to an array allocated in an [`crate::emulation::ExecutionContext`].
///
/// Two `HeapRef` values are equal if they point to the same array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapRef(pub(crate) u64);

impl HeapRef {
    /// Creates a new heap reference with the given ID.
    #[must_use]
    pub fn new(id: u64) -> Self {
        HeapRef(id)
    }

    /// Returns the internal ID of this heap reference.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapRef({})", self.0)
    }
}
