//! Label-based construction of instruction streams.
//!
//! [`InstructionAssembler`] collects [`Instruction`]s and resolves named branch labels once the
//! stream is complete, assigning contiguous offsets starting at 0. Hosts use it to build
//! replacement bodies; the test fixtures use it to write synthetic getters without counting
//! bytes by hand.
//!
//! # Examples
//!
//! ```rust
//! use cilprobe::assembly::{opcodes, Instruction, InstructionAssembler};
//!
//! let mut asm = InstructionAssembler::new();
//! asm.emit(Instruction::ldloc(0));
//! asm.emit_branch(opcodes::BRFALSE_S, "zero");
//! asm.emit(Instruction::ldc_i4(1));
//! asm.emit(Instruction::ret());
//! asm.define_label("zero")?;
//! asm.emit(Instruction::ldc_i4(0));
//! asm.emit(Instruction::ret());
//!
//! let code = asm.finish()?;
//! assert_eq!(code[1].branch_target(), Some(code[4].offset));
//! # Ok::<(), cilprobe::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{Instruction, Operand},
    Result,
};

/// A pending branch whose label has not been resolved yet.
#[derive(Debug, Clone)]
struct LabelFixup {
    /// Index of the branch instruction
    index: usize,
    /// The target label name to resolve
    label: String,
}

/// Builds an instruction stream with symbolic branch targets.
#[derive(Debug, Default)]
pub struct InstructionAssembler {
    instructions: Vec<Instruction>,
    /// label name -> index of the instruction it precedes
    labels: HashMap<String, usize>,
    fixups: Vec<LabelFixup>,
}

impl InstructionAssembler {
    /// Creates an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction; its offset is assigned by [`InstructionAssembler::finish`]
    pub fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Appends a branch opcode that targets `label`
    pub fn emit_branch(&mut self, opcode: u8, label: &str) {
        self.fixups.push(LabelFixup {
            index: self.instructions.len(),
            label: label.to_string(),
        });
        self.instructions.push(Instruction::branch(opcode, 0));
    }

    /// Binds `label` to the next emitted instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the label was already defined.
    pub fn define_label(&mut self, label: &str) -> Result<()> {
        if self.labels.contains_key(label) {
            return Err(malformed_error!("Label '{}' is defined twice", label));
        }
        self.labels.insert(label.to_string(), self.instructions.len());
        Ok(())
    }

    /// Number of emitted instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if nothing has been emitted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Assigns offsets and resolves every branch label.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a branch references an undefined label.
    pub fn finish(mut self) -> Result<Vec<Instruction>> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut cursor = 0u64;
        for instr in &mut self.instructions {
            instr.offset = cursor;
            offsets.push(cursor);
            cursor += instr.size;
        }
        offsets.push(cursor);

        for fixup in &self.fixups {
            let Some(&target_idx) = self.labels.get(&fixup.label) else {
                return Err(malformed_error!("Undefined label '{}'", fixup.label));
            };
            let instr = &mut self.instructions[fixup.index];
            instr.operand = Operand::Target(offsets[target_idx]);
        }

        Ok(self.instructions)
    }
}
