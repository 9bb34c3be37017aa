//! Emulation error types.

use thiserror::Error;

/// Failure of a single emulation run.
///
/// Every variant is fatal for the run that raised it and for nothing else: the caller decides
/// whether the surrounding probe or rewrite is abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmulationError {
    /// The opcode is outside the supported subset.
    #[error("Unhandled opcode '{mnemonic}' at IL_{offset:04x}")]
    UnhandledOpcode {
        /// Mnemonic of the rejected instruction
        mnemonic: &'static str,
        /// Offset of the rejected instruction
        offset: u64,
    },

    /// Two operands, or an operand and an opcode, disagree on their value kind.
    #[error("Type mismatch in {operation}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Operation that was attempted
        operation: &'static str,
        /// Kind the operation required
        expected: &'static str,
        /// Kind that was found
        found: &'static str,
    },

    /// A pop was attempted on an empty evaluation stack.
    #[error("Evaluation stack underflow at IL_{offset:04x}")]
    StackUnderflow {
        /// Offset of the instruction that popped
        offset: u64,
    },

    /// A local was read before anything was stored to it.
    #[error("Local {0} read before assignment")]
    UninitializedLocal(u16),

    /// An argument was read that was never seeded.
    #[error("Argument {0} was not provided")]
    UninitializedArgument(u16),

    /// An instruction carries an operand of the wrong shape.
    #[error("Invalid operand for '{instruction}': expected {expected}")]
    InvalidOperand {
        /// Mnemonic of the instruction
        instruction: &'static str,
        /// Operand shape the instruction requires
        expected: &'static str,
    },

    /// A branch target does not start any instruction of the routine.
    #[error("Branch target IL_{0:04x} is not an instruction boundary")]
    InvalidBranchTarget(u64),

    /// An array reference does not point to an allocated array.
    #[error("Invalid array reference")]
    InvalidArrayReference,

    /// An array index is outside the array.
    #[error("Array index {index} out of range for length {length}")]
    ArrayIndexOutOfRange {
        /// The requested index
        index: i64,
        /// Length of the array
        length: usize,
    },

    /// The routine did not return within the configured step budget.
    #[error("Instruction limit exceeded: executed {executed}, limit {limit}")]
    InstructionLimitExceeded {
        /// Instructions executed before the run was stopped
        executed: u64,
        /// The configured limit
        limit: u64,
    },
}
