//! Method bodies as seen by constant recovery.

use std::fmt;

use crate::{assembly::Instruction, metadata::token::Token};

/// A method and its decoded instruction stream.
///
/// The instruction vector is the write-back surface: rewrites replace slices of it in place,
/// renumber offsets, and the host re-encodes the result. A `Method` is exclusively owned by
/// whichever rewrite is operating on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    /// `MethodDef` token of this method
    pub token: Token,
    /// Full name, e.g. `<Module>::Get`
    pub name: String,
    /// Decoded body
    pub instructions: Vec<Instruction>,
}

impl Method {
    /// Creates a method from its token, name and body
    pub fn new(token: Token, name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Method {
            token,
            name: name.into(),
            instructions,
        }
    }

    /// Total encoded size of the body in bytes
    #[must_use]
    pub fn code_size(&self) -> u64 {
        self.instructions.iter().map(|instr| instr.size).sum()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_basics() {
        let method = Method::new(
            Token(0x06000003),
            "Program::Main",
            vec![Instruction::ldc_i4(1000), Instruction::ret().at(5)],
        );
        assert_eq!(method.code_size(), 6);
        assert_eq!(method.to_string(), "Program::Main (0x06000003)");
    }
}
