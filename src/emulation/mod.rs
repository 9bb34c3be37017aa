//! Minimal CIL stack-machine emulation.
//!
//! This is not a general-purpose virtual machine. It executes the closed opcode subset that
//! occurs in constant getters (integer arithmetic and logic, a handful of loads and stores,
//! `br`/`beq`/`bne.un`, one widening conversion) and rejects everything else loudly.
//!
//! # Key Components
//!
//! - [`EmValue`] - Closed set of runtime values
//! - [`ExecutionContext`] - Arguments, locals, offset index and evaluation stack of one run
//! - [`Routine`] - A fixed instruction sequence plus seeds, run with [`Routine::emulate`]
//! - [`Interpreter`] - The fetch-dispatch-execute loop
//! - [`EmulationLimits`] - Step ceiling guarding against non-terminating routines
//! - [`EmulationError`] - Why a run failed
//!
//! # Examples
//!
//! ```rust
//! use cilprobe::assembly::{opcodes, Instruction, Operand};
//! use cilprobe::emulation::{EmValue, Routine};
//!
//! // -1 >>> 1
//! let code = vec![
//!     Instruction::ldc_i4(-1).at(0),
//!     Instruction::ldc_i4(1).at(1),
//!     Instruction::new(opcodes::SHR_UN, Operand::None).at(2),
//!     Instruction::ret().at(3),
//! ];
//!
//! let ctx = Routine::new(&code).emulate()?;
//! assert_eq!(ctx.peek(), Some(&EmValue::I32(i32::MAX)));
//! # Ok::<(), cilprobe::emulation::EmulationError>(())
//! ```

mod context;
mod error;
mod interpreter;
mod value;

pub use context::{EmulationLimits, ExecutionContext};
pub use error::EmulationError;
pub use interpreter::{Interpreter, Routine, StepResult};
pub use value::{EmValue, HeapRef};
