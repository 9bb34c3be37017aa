//! CIL instruction model and basic block view.
//!
//! The host decodes method bodies and hands them over as [`Instruction`] streams; this module
//! defines that representation together with the few structural operations constant recovery
//! needs from it.
//!
//! # Key Components
//!
//! - [`Instruction`] - A single CIL instruction with offset, size and operand
//! - [`Operand`] / [`Immediate`] - Typed operand representation
//! - [`FlowType`] - Control flow classification
//! - [`BasicBlock`] - A straight-line run of instructions with one entry
//! - [`InstructionAssembler`] - Builds streams with symbolic branch labels
//! - [`opcodes`] - Opcode byte constants and the opcode info table
//!
//! # Structural Operations
//!
//! - [`build_blocks`] - Split a stream into basic blocks
//! - [`remove_dead_blocks`] - Drop blocks unreachable from the entry
//! - [`flatten_blocks`] - Re-linearize blocks with fresh offsets
//! - [`renumber_offsets`] - Recompute offsets after instructions were removed or replaced

mod assembler;
mod block;
mod instruction;
pub mod opcodes;

pub use assembler::InstructionAssembler;
pub use block::{build_blocks, flatten_blocks, remove_dead_blocks, renumber_offsets, BasicBlock};
pub use instruction::{FlowType, Immediate, Instruction, Operand, OperandType};
