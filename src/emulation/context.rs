//! Per-run execution state and emulation limits.

use std::collections::HashMap;

use crate::{
    assembly::Instruction,
    emulation::{EmValue, EmulationError, HeapRef},
};

/// Execution limits for emulation.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `max_instructions` | 10,000 |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Maximum instructions to execute in one run.
    ///
    /// Set to 0 for unlimited execution. When exceeded, emulation
    /// stops with [`EmulationError::InstructionLimitExceeded`].
    pub max_instructions: u64,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_instructions: 10_000,
        }
    }
}

impl EmulationLimits {
    /// Limits without a step ceiling
    #[must_use]
    pub fn unlimited() -> Self {
        EmulationLimits {
            max_instructions: 0,
        }
    }

    /// Sets the step ceiling
    #[must_use]
    pub fn with_max_instructions(mut self, max_instructions: u64) -> Self {
        self.max_instructions = max_instructions;
        self
    }

    /// Checks `executed` against the ceiling
    ///
    /// # Errors
    /// Returns [`EmulationError::InstructionLimitExceeded`] once the ceiling is reached.
    pub fn check(&self, executed: u64) -> Result<(), EmulationError> {
        if self.max_instructions != 0 && executed >= self.max_instructions {
            return Err(EmulationError::InstructionLimitExceeded {
                executed,
                limit: self.max_instructions,
            });
        }
        Ok(())
    }
}

/// State of one emulation run.
///
/// Built fresh for every run from the routine's instruction sequence and seeds, so nothing a
/// run does can be observed by the next one. The offset index is computed once here and never
/// changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    args: HashMap<u16, EmValue>,
    locals: HashMap<u16, EmValue>,
    offset_index: HashMap<u64, usize>,
    stack: Vec<EmValue>,
    arrays: Vec<Vec<i32>>,
    /// Offset of the instruction being executed, for diagnostics
    position: u64,
}

impl ExecutionContext {
    /// Creates an empty context for `instructions`
    #[must_use]
    pub fn new(instructions: &[Instruction]) -> Self {
        ExecutionContext {
            offset_index: instructions
                .iter()
                .enumerate()
                .map(|(idx, instr)| (instr.offset, idx))
                .collect(),
            ..Default::default()
        }
    }

    /// Seeds argument `index`
    pub fn set_arg(&mut self, index: u16, value: EmValue) {
        self.args.insert(index, value);
    }

    /// Reads argument `index`
    ///
    /// # Errors
    /// Returns [`EmulationError::UninitializedArgument`] for an argument that was never seeded.
    pub fn arg(&self, index: u16) -> Result<EmValue, EmulationError> {
        self.args
            .get(&index)
            .copied()
            .ok_or(EmulationError::UninitializedArgument(index))
    }

    /// Assigns local `index`
    pub fn set_local(&mut self, index: u16, value: EmValue) {
        self.locals.insert(index, value);
    }

    /// Reads local `index`
    ///
    /// # Errors
    /// Returns [`EmulationError::UninitializedLocal`] for a local that was never assigned.
    pub fn local(&self, index: u16) -> Result<EmValue, EmulationError> {
        self.locals
            .get(&index)
            .copied()
            .ok_or(EmulationError::UninitializedLocal(index))
    }

    /// Position of the instruction at `offset` in the routine
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidBranchTarget`] if no instruction starts at `offset`.
    pub fn index_of(&self, offset: u64) -> Result<usize, EmulationError> {
        self.offset_index
            .get(&offset)
            .copied()
            .ok_or(EmulationError::InvalidBranchTarget(offset))
    }

    /// Pushes onto the evaluation stack
    pub fn push(&mut self, value: EmValue) {
        self.stack.push(value);
    }

    /// Pops from the evaluation stack
    ///
    /// # Errors
    /// Returns [`EmulationError::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<EmValue, EmulationError> {
        self.stack.pop().ok_or(EmulationError::StackUnderflow {
            offset: self.position,
        })
    }

    /// Top of the evaluation stack
    #[must_use]
    pub fn peek(&self) -> Option<&EmValue> {
        self.stack.last()
    }

    /// The evaluation stack, bottom first
    #[must_use]
    pub fn stack(&self) -> &[EmValue] {
        &self.stack
    }

    /// Allocates an `int32` array and returns a reference to it
    pub fn alloc_array(&mut self, values: Vec<i32>) -> EmValue {
        self.arrays.push(values);
        EmValue::ArrayRef(HeapRef::new((self.arrays.len() - 1) as u64))
    }

    /// Contents of an allocated array
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidArrayReference`] for a dangling reference.
    pub fn array(&self, array: HeapRef) -> Result<&[i32], EmulationError> {
        usize::try_from(array.id())
            .ok()
            .and_then(|id| self.arrays.get(id))
            .map(Vec::as_slice)
            .ok_or(EmulationError::InvalidArrayReference)
    }

    /// Mutable contents of an allocated array
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidArrayReference`] for a dangling reference.
    pub fn array_mut(&mut self, array: HeapRef) -> Result<&mut [i32], EmulationError> {
        usize::try_from(array.id())
            .ok()
            .and_then(|id| self.arrays.get_mut(id))
            .map(Vec::as_mut_slice)
            .ok_or(EmulationError::InvalidArrayReference)
    }

    pub(crate) fn set_position(&mut self, offset: u64) {
        self.position = offset;
    }
}
