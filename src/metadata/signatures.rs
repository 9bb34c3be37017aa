//! Type signatures of generic arguments.
//!
//! Only the shape of a type matters during constant recovery: a number constant is decoded by
//! the width of its generic argument, and a default constant is materialized with `initobj` on
//! the argument's type. [`TypeSignature`] therefore models element types and the
//! `TypeDefOrRef` token of non-primitive types, nothing more.

use std::fmt;

use crate::metadata::token::Token;

/// ECMA-335 element type code of `bool`
pub const ELEMENT_TYPE_BOOLEAN: u8 = 0x02;
/// ECMA-335 element type code of `char`
pub const ELEMENT_TYPE_CHAR: u8 = 0x03;
/// ECMA-335 element type code of `int8`
pub const ELEMENT_TYPE_I1: u8 = 0x04;
/// ECMA-335 element type code of `uint8`
pub const ELEMENT_TYPE_U1: u8 = 0x05;
/// ECMA-335 element type code of `int16`
pub const ELEMENT_TYPE_I2: u8 = 0x06;
/// ECMA-335 element type code of `uint16`
pub const ELEMENT_TYPE_U2: u8 = 0x07;
/// ECMA-335 element type code of `int32`
pub const ELEMENT_TYPE_I4: u8 = 0x08;
/// ECMA-335 element type code of `uint32`
pub const ELEMENT_TYPE_U4: u8 = 0x09;
/// ECMA-335 element type code of `int64`
pub const ELEMENT_TYPE_I8: u8 = 0x0A;
/// ECMA-335 element type code of `uint64`
pub const ELEMENT_TYPE_U8: u8 = 0x0B;
/// ECMA-335 element type code of `float32`
pub const ELEMENT_TYPE_R4: u8 = 0x0C;
/// ECMA-335 element type code of `float64`
pub const ELEMENT_TYPE_R8: u8 = 0x0D;
/// ECMA-335 element type code of `System.String`
pub const ELEMENT_TYPE_STRING: u8 = 0x0E;
/// ECMA-335 element type code of a value type
pub const ELEMENT_TYPE_VALUETYPE: u8 = 0x11;
/// ECMA-335 element type code of a class
pub const ELEMENT_TYPE_CLASS: u8 = 0x12;
/// ECMA-335 element type code of `System.Object`
pub const ELEMENT_TYPE_OBJECT: u8 = 0x1C;

/// The type bound to a generic parameter at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// System.Object
    Object,
    /// CIL value-type
    // TypeDefOrRefOrSpecEncoded
    ValueType(Token),
    /// CIL Class
    // TypeDefOrRefOrSpecEncoded
    Class(Token),
}

impl TypeSignature {
    /// Returns the ECMA-335 element type code
    #[must_use]
    pub fn element_type(&self) -> u8 {
        match self {
            TypeSignature::Boolean => ELEMENT_TYPE_BOOLEAN,
            TypeSignature::Char => ELEMENT_TYPE_CHAR,
            TypeSignature::I1 => ELEMENT_TYPE_I1,
            TypeSignature::U1 => ELEMENT_TYPE_U1,
            TypeSignature::I2 => ELEMENT_TYPE_I2,
            TypeSignature::U2 => ELEMENT_TYPE_U2,
            TypeSignature::I4 => ELEMENT_TYPE_I4,
            TypeSignature::U4 => ELEMENT_TYPE_U4,
            TypeSignature::I8 => ELEMENT_TYPE_I8,
            TypeSignature::U8 => ELEMENT_TYPE_U8,
            TypeSignature::R4 => ELEMENT_TYPE_R4,
            TypeSignature::R8 => ELEMENT_TYPE_R8,
            TypeSignature::String => ELEMENT_TYPE_STRING,
            TypeSignature::Object => ELEMENT_TYPE_OBJECT,
            TypeSignature::ValueType(_) => ELEMENT_TYPE_VALUETYPE,
            TypeSignature::Class(_) => ELEMENT_TYPE_CLASS,
        }
    }

    /// Returns the storage width in bytes of fixed-size primitives, `None` for everything else
    #[must_use]
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            TypeSignature::Boolean | TypeSignature::I1 | TypeSignature::U1 => Some(1),
            TypeSignature::Char | TypeSignature::I2 | TypeSignature::U2 => Some(2),
            TypeSignature::I4 | TypeSignature::U4 | TypeSignature::R4 => Some(4),
            TypeSignature::I8 | TypeSignature::U8 | TypeSignature::R8 => Some(8),
            _ => None,
        }
    }

    /// Returns the `TypeDefOrRef` token for value types and classes
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => Some(*token),
            _ => None,
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Boolean => write!(f, "bool"),
            TypeSignature::Char => write!(f, "char"),
            TypeSignature::I1 => write!(f, "int8"),
            TypeSignature::U1 => write!(f, "uint8"),
            TypeSignature::I2 => write!(f, "int16"),
            TypeSignature::U2 => write!(f, "uint16"),
            TypeSignature::I4 => write!(f, "int32"),
            TypeSignature::U4 => write!(f, "uint32"),
            TypeSignature::I8 => write!(f, "int64"),
            TypeSignature::U8 => write!(f, "uint64"),
            TypeSignature::R4 => write!(f, "float32"),
            TypeSignature::R8 => write!(f, "float64"),
            TypeSignature::String => write!(f, "string"),
            TypeSignature::Object => write!(f, "object"),
            TypeSignature::ValueType(token) => write!(f, "valuetype({token})"),
            TypeSignature::Class(token) => write!(f, "class({token})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_types() {
        assert_eq!(TypeSignature::I4.element_type(), 0x08);
        assert_eq!(TypeSignature::R8.element_type(), 0x0D);
        assert_eq!(TypeSignature::String.element_type(), 0x0E);
        assert_eq!(
            TypeSignature::ValueType(Token(0x02000004)).element_type(),
            ELEMENT_TYPE_VALUETYPE
        );
    }

    #[test]
    fn test_byte_width() {
        assert_eq!(TypeSignature::I4.byte_width(), Some(4));
        assert_eq!(TypeSignature::R4.byte_width(), Some(4));
        assert_eq!(TypeSignature::R8.byte_width(), Some(8));
        assert_eq!(TypeSignature::U2.byte_width(), Some(2));
        assert_eq!(TypeSignature::String.byte_width(), None);
        assert_eq!(TypeSignature::Class(Token(0x01000001)).byte_width(), None);
    }

    #[test]
    fn test_token() {
        assert_eq!(
            TypeSignature::Class(Token(0x01000009)).token(),
            Some(Token(0x01000009))
        );
        assert_eq!(TypeSignature::I8.token(), None);
    }
}
