//! Metadata view used by constant recovery.
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references used throughout .NET
//! - [`signatures`] - Element-type view of generic arguments
//! - [`method`] - Method identity and its mutable instruction stream
//! - [`resolver`] - The [`MemberResolver`] seam and the in-memory [`MemberTable`]
//!
//! # Examples
//!
//! ```rust
//! use cilprobe::metadata::{MemberResolver, MemberTable, Token, TypeSignature};
//!
//! let getter = Token::from_parts(Token::TABLE_METHOD_DEF, 0x10);
//! let spec = Token::from_parts(Token::TABLE_METHOD_SPEC, 1);
//!
//! let mut members = MemberTable::new();
//! members
//!     .add_member(getter, "<Module>::Get")
//!     .add_method_spec(spec, getter, vec![TypeSignature::I4]);
//!
//! assert_eq!(members.method_spec(spec).unwrap().method, getter);
//! ```

/// Method bodies
pub mod method;
/// Call operand resolution
pub mod resolver;
/// Type signatures of generic arguments
pub mod signatures;
/// Metadata tokens
pub mod token;

pub use method::Method;
pub use resolver::{MemberResolver, MemberTable, MethodInstantiation};
pub use signatures::TypeSignature;
pub use token::Token;
