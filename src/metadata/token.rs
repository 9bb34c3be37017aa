use std::fmt;
use std::hash::{Hash, Hasher};

/// A metadata token referencing a row in one of the ECMA-335 metadata tables.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table
/// - The low 24 bits (bits 0-23) indicate the 1-based row within that table
///
/// Constant recovery only ever compares tokens and asks which table they live in, so this
/// type carries no resolution logic. Resolution is the job of a
/// [`crate::metadata::MemberResolver`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Table id of `TypeRef`
    pub const TABLE_TYPE_REF: u8 = 0x01;
    /// Table id of `TypeDef`
    pub const TABLE_TYPE_DEF: u8 = 0x02;
    /// Table id of `Field`
    pub const TABLE_FIELD: u8 = 0x04;
    /// Table id of `MethodDef`
    pub const TABLE_METHOD_DEF: u8 = 0x06;
    /// Table id of `MemberRef`
    pub const TABLE_MEMBER_REF: u8 = 0x0A;
    /// Table id of `TypeSpec`
    pub const TABLE_TYPE_SPEC: u8 = 0x1B;
    /// Table id of `MethodSpec`
    pub const TABLE_METHOD_SPEC: u8 = 0x2B;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a row
    #[must_use]
    pub const fn from_parts(table: u8, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into the `MethodDef` table
    #[must_use]
    pub fn is_method_def(&self) -> bool {
        self.table() == Self::TABLE_METHOD_DEF
    }

    /// Returns true if the token points into the `MethodSpec` table
    #[must_use]
    pub fn is_method_spec(&self) -> bool {
        self.table() == Self::TABLE_METHOD_SPEC
    }

    /// Returns true if the token can be used as a `TypeDefOrRef` coded operand
    #[must_use]
    pub fn is_type_def_or_ref(&self) -> bool {
        matches!(
            self.table(),
            Self::TABLE_TYPE_REF | Self::TABLE_TYPE_DEF | Self::TABLE_TYPE_SPEC
        )
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(Token::TABLE_METHOD_SPEC, 7);
        assert_eq!(token.value(), 0x2B000007);
        assert_eq!(token.table(), 0x2B);
        assert_eq!(token.row(), 7);
        assert!(token.is_method_spec());
        assert!(!token.is_method_def());
    }

    #[test]
    fn test_token_row_is_masked() {
        let token = Token::from_parts(Token::TABLE_METHOD_DEF, 0x0100_0002);
        assert_eq!(token.row(), 2);
        assert!(token.is_method_def());
    }

    #[test]
    fn test_token_type_def_or_ref() {
        assert!(Token(0x01000003).is_type_def_or_ref());
        assert!(Token(0x02000001).is_type_def_or_ref());
        assert!(Token(0x1B000010).is_type_def_or_ref());
        assert!(!Token(0x06000001).is_type_def_or_ref());
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token(0x06000001).is_null());
    }

    #[test]
    fn test_token_formatting() {
        let token = Token(0x06000001);
        assert_eq!(format!("{}", token), "0x06000001");

        let debug_str = format!("{:?}", token);
        assert!(debug_str.contains("Token(0x06000001"));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_token_conversion() {
        let token: Token = 0x0A000004u32.into();
        assert_eq!(token.table(), Token::TABLE_MEMBER_REF);

        let raw: u32 = token.into();
        assert_eq!(raw, 0x0A000004);
    }
}
