//! Resolution of call operands.
//!
//! Constant recovery needs exactly two answers from the metadata layer: the full name of a
//! called member (to spot `Encoding::get_UTF8` and `Assembly::GetExecutingAssembly`), and the
//! generic instantiation behind a `MethodSpec` token (to recognise `Get<T>` call sites and read
//! their `T`). [`MemberResolver`] is that seam. [`MemberTable`] is a plain in-memory
//! implementation for hosts that already have the data at hand.

use std::collections::HashMap;

use crate::metadata::{signatures::TypeSignature, token::Token};

/// A generic method instantiation (one `MethodSpec` row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInstantiation {
    /// The generic method definition being instantiated
    pub method: Token,
    /// Type arguments in declaration order
    pub generic_args: Vec<TypeSignature>,
}

/// Answers the metadata questions asked while probing getters and scanning call sites.
///
/// Implementations must be `Sync`: consumer methods may be rewritten on several threads that
/// share one resolver.
pub trait MemberResolver: Sync {
    /// Full name of the member behind `token`, as `Namespace.Type::Member`
    fn member_name(&self, token: Token) -> Option<String>;

    /// Generic instantiation behind a `MethodSpec` token
    fn method_spec(&self, token: Token) -> Option<MethodInstantiation>;
}

/// `HashMap`-backed [`MemberResolver`].
#[derive(Debug, Clone, Default)]
pub struct MemberTable {
    names: HashMap<Token, String>,
    specs: HashMap<Token, MethodInstantiation>,
}

impl MemberTable {
    /// Creates an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the full name of a member
    pub fn add_member(&mut self, token: Token, name: impl Into<String>) -> &mut Self {
        self.names.insert(token, name.into());
        self
    }

    /// Registers a `MethodSpec` instantiating `method` with `generic_args`
    pub fn add_method_spec(
        &mut self,
        token: Token,
        method: Token,
        generic_args: Vec<TypeSignature>,
    ) -> &mut Self {
        self.specs.insert(
            token,
            MethodInstantiation {
                method,
                generic_args,
            },
        );
        self
    }

    /// Number of registered names and instantiations
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len() + self.specs.len()
    }

    /// Returns true if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.specs.is_empty()
    }
}

impl MemberResolver for MemberTable {
    fn member_name(&self, token: Token) -> Option<String> {
        if let Some(name) = self.names.get(&token) {
            return Some(name.clone());
        }
        // A MethodSpec is named after the method it instantiates
        self.specs
            .get(&token)
            .and_then(|spec| self.names.get(&spec.method).cloned())
    }

    fn method_spec(&self, token: Token) -> Option<MethodInstantiation> {
        self.specs.get(&token).cloned()
    }
}
