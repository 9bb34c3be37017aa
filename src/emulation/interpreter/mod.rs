//! Core CIL instruction interpreter.
//!
//! The [`Interpreter`] provides the fetch-dispatch-execute loop over a [`Routine`]. Each step
//! executes the instruction under the cursor and reports how the cursor moves on: to the next
//! instruction, to a branch target (resolved through the context's offset index, never by
//! offset arithmetic), or out of the loop on `ret`.
//!
//! # Supported Opcodes
//!
//! | Family | Opcodes |
//! |--------|---------|
//! | load | `ldc.i4*`, `ldc.i8`, `ldc.r4`, `ldc.r8`, `ldarg*`, `ldloc*`, `ldelem.u4` |
//! | store | `stloc*`, `stelem.i4`, `stfld` (no-op) |
//! | arithmetic | `add`, `sub`, `mul`, `or`, `neg` |
//! | logic | `and`, `xor`, `not`, `shl`, `shr`, `shr.un` |
//! | control | `br`, `beq`, `bne.un` (short forms included), `ret`, `nop` |
//! | conversion | `conv.u8` (int32 only, sign-extending) |
//!
//! Anything else fails the run with [`EmulationError::UnhandledOpcode`].

mod arithmetic;
mod load;
mod logic;
mod store;


use log::trace;

use crate::{
    assembly::{opcodes, Instruction},
    emulation::{EmValue, EmulationError, EmulationLimits, ExecutionContext, HeapRef},
};

use self::{
    arithmetic::ArithmeticOp,
    logic::{BitwiseOp, ShiftOp},
};

/// How the cursor moves after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Proceed to the next instruction
    Continue,
    /// Jump to the instruction starting at this offset
    Branch(u64),
    /// Stop the run successfully
    Return,
}

pub(super) fn invalid_operand(instruction: &Instruction, expected: &'static str) -> EmulationError {
    EmulationError::InvalidOperand {
        instruction: instruction.mnemonic,
        expected,
    }
}

fn unhandled(instruction: &Instruction) -> EmulationError {
    EmulationError::UnhandledOpcode {
        mnemonic: instruction.mnemonic,
        offset: instruction.offset,
    }
}

/// An instruction sequence plus the argument/local seeds of the next run.
///
/// The sequence is borrowed and never changes. Seeds are copied into a fresh
/// [`ExecutionContext`] by every call to [`Routine::emulate`], so re-running the same routine
/// never observes state from an earlier run.
///
/// # Examples
///
/// ```rust
/// use cilprobe::assembly::Instruction;
/// use cilprobe::emulation::{EmValue, Routine};
///
/// let code = vec![
///     Instruction::ldloc(0).at(0),
///     Instruction::ldc_i4(1).at(1),
///     Instruction::new(cilprobe::assembly::opcodes::ADD, cilprobe::assembly::Operand::None).at(2),
///     Instruction::ret().at(3),
/// ];
///
/// let mut routine = Routine::new(&code);
/// routine.set_local(0, EmValue::I32(41));
/// let ctx = routine.emulate()?;
/// assert_eq!(ctx.peek(), Some(&EmValue::I32(42)));
/// # Ok::<(), cilprobe::emulation::EmulationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Routine<'a> {
    instructions: &'a [Instruction],
    args: Vec<(u16, EmValue)>,
    locals: Vec<(u16, EmValue)>,
    arrays: Vec<Vec<i32>>,
    limits: EmulationLimits,
}

impl<'a> Routine<'a> {
    /// Creates a routine over `instructions` with default limits and no seeds
    #[must_use]
    pub fn new(instructions: &'a [Instruction]) -> Self {
        Routine {
            instructions,
            args: Vec::new(),
            locals: Vec::new(),
            arrays: Vec::new(),
            limits: EmulationLimits::default(),
        }
    }

    /// Replaces the emulation limits
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Seeds argument `index` for every following run
    pub fn set_arg(&mut self, index: u16, value: EmValue) {
        self.args.retain(|(idx, _)| *idx != index);
        self.args.push((index, value));
    }

    /// Seeds local `index` for every following run
    pub fn set_local(&mut self, index: u16, value: EmValue) {
        self.locals.retain(|(idx, _)| *idx != index);
        self.locals.push((index, value));
    }

    /// Seeds an `int32` array that every following run starts with
    pub fn alloc_array(&mut self, values: Vec<i32>) -> EmValue {
        self.arrays.push(values);
        EmValue::ArrayRef(HeapRef::new((self.arrays.len() - 1) as u64))
    }

    /// The instruction sequence
    #[must_use]
    pub fn instructions(&self) -> &'a [Instruction] {
        self.instructions
    }

    /// Runs the routine to completion from a fresh context.
    ///
    /// # Errors
    /// Returns the [`EmulationError`] that stopped the run.
    pub fn emulate(&self) -> Result<ExecutionContext, EmulationError> {
        let mut ctx = ExecutionContext::new(self.instructions);
        for array in &self.arrays {
            ctx.alloc_array(array.clone());
        }
        for (index, value) in &self.args {
            ctx.set_arg(*index, *value);
        }
        for (index, value) in &self.locals {
            ctx.set_local(*index, *value);
        }

        Interpreter::new(self.limits).run(self.instructions, ctx)
    }
}

/// Core CIL instruction interpreter.
///
/// Stateless apart from its limits; one interpreter can drive any number of runs.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    limits: EmulationLimits,
}

impl Interpreter {
    /// Creates a new interpreter with the given execution limits.
    #[must_use]
    pub fn new(limits: EmulationLimits) -> Self {
        Interpreter { limits }
    }

    /// Returns the execution limits.
    #[must_use]
    pub fn limits(&self) -> &EmulationLimits {
        &self.limits
    }

    /// Executes `instructions` against `ctx` until `ret` or the end of the sequence.
    ///
    /// # Errors
    /// Returns the first [`EmulationError`] raised by an instruction, or
    /// [`EmulationError::InstructionLimitExceeded`] if the step ceiling is reached.
    pub fn run(
        &self,
        instructions: &[Instruction],
        mut ctx: ExecutionContext,
    ) -> Result<ExecutionContext, EmulationError> {
        let mut cursor = 0usize;
        let mut executed = 0u64;

        while let Some(instruction) = instructions.get(cursor) {
            self.limits.check(executed)?;
            executed += 1;

            ctx.set_position(instruction.offset);
            trace!("{instruction}");

            cursor = match self.step(&mut ctx, instruction)? {
                StepResult::Continue => cursor + 1,
                StepResult::Branch(target) => ctx.index_of(target)?,
                StepResult::Return => break,
            };
        }

        Ok(ctx)
    }

    /// Executes a single instruction.
    ///
    /// # Errors
    /// Returns [`EmulationError::UnhandledOpcode`] for opcodes outside the supported subset,
    /// and the handler's error otherwise.
    pub fn step(
        &self,
        ctx: &mut ExecutionContext,
        instruction: &Instruction,
    ) -> Result<StepResult, EmulationError> {
        match instruction.prefix {
            0 => self.execute_standard(ctx, instruction),
            opcodes::FE_PREFIX => self.execute_fe_prefixed(ctx, instruction),
            _ => Err(unhandled(instruction)),
        }
    }

    #[allow(clippy::unused_self)]
    fn execute_standard(
        &self,
        ctx: &mut ExecutionContext,
        instruction: &Instruction,
    ) -> Result<StepResult, EmulationError> {
        match instruction.opcode {
            opcodes::NOP => Ok(StepResult::Continue),

            opcodes::LDC_I4_M1..=opcodes::LDC_R8 => load::constant(ctx, instruction),
            opcodes::LDARG_0..=opcodes::LDARG_3 | opcodes::LDARG_S => {
                load::argument(ctx, instruction)
            }
            opcodes::LDLOC_0..=opcodes::LDLOC_3 | opcodes::LDLOC_S => {
                load::local(ctx, instruction)
            }
            opcodes::LDELEM_U4 => load::array_element(ctx),

            opcodes::STLOC_0..=opcodes::STLOC_3 | opcodes::STLOC_S => {
                store::local(ctx, instruction)
            }
            opcodes::STELEM_I4 => store::array_element(ctx),
            opcodes::STFLD => store::field(),

            opcodes::ADD => arithmetic::binary(ctx, ArithmeticOp::Add),
            opcodes::SUB => arithmetic::binary(ctx, ArithmeticOp::Sub),
            opcodes::MUL => arithmetic::binary(ctx, ArithmeticOp::Mul),
            opcodes::OR => arithmetic::binary(ctx, ArithmeticOp::Or),
            opcodes::NEG => arithmetic::negate(ctx),

            opcodes::AND => logic::binary(ctx, BitwiseOp::And),
            opcodes::XOR => logic::binary(ctx, BitwiseOp::Xor),
            opcodes::NOT => logic::not(ctx),
            opcodes::SHL => logic::shift(ctx, ShiftOp::Shl),
            opcodes::SHR => logic::shift(ctx, ShiftOp::Shr),
            opcodes::SHR_UN => logic::shift(ctx, ShiftOp::ShrUn),

            opcodes::BR | opcodes::BR_S => Self::branch_target(instruction).map(StepResult::Branch),
            opcodes::BEQ | opcodes::BEQ_S => Self::equality_branch(ctx, instruction, true),
            opcodes::BNE_UN | opcodes::BNE_UN_S => Self::equality_branch(ctx, instruction, false),

            opcodes::CONV_U8 => Self::widen(ctx),

            opcodes::RET => Ok(StepResult::Return),

            _ => Err(unhandled(instruction)),
        }
    }

    #[allow(clippy::unused_self)]
    fn execute_fe_prefixed(
        &self,
        ctx: &mut ExecutionContext,
        instruction: &Instruction,
    ) -> Result<StepResult, EmulationError> {
        match instruction.opcode {
            opcodes::FE_LDARG => load::argument(ctx, instruction),
            opcodes::FE_LDLOC => load::local(ctx, instruction),
            opcodes::FE_STLOC => store::local(ctx, instruction),
            _ => Err(unhandled(instruction)),
        }
    }

    fn branch_target(instruction: &Instruction) -> Result<u64, EmulationError> {
        instruction
            .branch_target()
            .ok_or_else(|| invalid_operand(instruction, "branch target"))
    }

    /// `beq` jumps when equal, `bne.un` when not equal; kinds must match and be integers
    fn equality_branch(
        ctx: &mut ExecutionContext,
        instruction: &Instruction,
        jump_if_equal: bool,
    ) -> Result<StepResult, EmulationError> {
        let target = Self::branch_target(instruction)?;
        let rhs = ctx.pop()?;
        let lhs = ctx.pop()?;

        let equal = match (lhs, rhs) {
            (EmValue::I32(a), EmValue::I32(b)) => a == b,
            (EmValue::I64(a), EmValue::I64(b)) => a == b,
            (lhs, rhs) => {
                return Err(EmulationError::TypeMismatch {
                    operation: instruction.mnemonic,
                    expected: if lhs.same_kind(&rhs) {
                        "I32 or I64"
                    } else {
                        lhs.type_name()
                    },
                    found: rhs.type_name(),
                })
            }
        };

        if equal == jump_if_equal {
            Ok(StepResult::Branch(target))
        } else {
            Ok(StepResult::Continue)
        }
    }

    /// `conv.u8` from int32, sign-extending
    fn widen(ctx: &mut ExecutionContext) -> Result<StepResult, EmulationError> {
        match ctx.pop()? {
            EmValue::I32(v) => {
                ctx.push(EmValue::I64(i64::from(v)));
                Ok(StepResult::Continue)
            }
            other => Err(EmulationError::TypeMismatch {
                operation: "conv.u8",
                expected: "I32",
                found: other.type_name(),
            }),
        }
    }
}
