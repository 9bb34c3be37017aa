//! CIL instruction representation and operand types.
//!
//! An [`Instruction`] is a decoded, position-tagged record. The host hands method bodies over as
//! `Vec<Instruction>` and receives them back after rewriting; everything in this crate reads and
//! writes that one representation. Branch operands are stored as absolute byte offsets
//! ([`Operand::Target`]), never as relative displacements, so a stream can be edited and
//! renumbered without re-encoding.
//!
//! Constructors pick the encoded size and flow type from the opcode table in
//! [`crate::assembly::opcodes`]; the compact forms (`ldc.i4.3`, `ldloc.1`, ...) are chosen
//! automatically where the value allows it.

use std::{
    fmt::{self, UpperHex},
    sync::Arc,
};

use crate::{
    assembly::opcodes,
    metadata::{signatures::TypeSignature, token::Token},
};

/// Encoding of an inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// 8-bit signed integer
    Int8,
    /// 8-bit unsigned integer (short local/argument index)
    UInt8,
    /// 16-bit unsigned integer (long local/argument index)
    UInt16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token
    Token,
    /// Switch table: a 32-bit count followed by one 32-bit offset per target
    Switch,
}

impl OperandType {
    /// Encoded size of the operand in bytes.
    ///
    /// Returns `None` for [`OperandType::Switch`], whose size depends on the number of targets.
    #[must_use]
    pub fn size(self) -> Option<u64> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// Immediate values embedded in an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::UInt8(value) => write!(f, "{value:02X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Int64(value) => write!(f, "{value:016X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:016X}", value.to_bits()),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

/// Represents an operand in a structured way.
///
/// Besides the encodable operand kinds this carries two resolved forms produced by constant
/// recovery: [`Operand::String`] for a rewritten `ldstr` and [`Operand::Type`] for a rewritten
/// `initobj`. The host turns them back into user-string and `TypeSpec` tokens on write-back.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// Absolute branch target offset
    Target(u64),
    /// Absolute target offsets of a `switch`, in table order
    Switch(Vec<u64>),
    /// Metadata token reference
    Token(Token),
    /// Local variable index
    Local(u16),
    /// Method argument index
    Argument(u16),
    /// Literal text of an `ldstr`
    String(Arc<str>),
    /// Type operand of an `initobj`
    Type(TypeSignature),
}

/// Control flow behavior of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal sequential execution to the next instruction
    Sequential,
    /// Conditional branch - may branch or continue sequentially
    ConditionalBranch,
    /// Unconditional branch - always transfers control
    UnconditionalBranch,
    /// Method call - calls another method, then continues
    Call,
    /// Return from method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Throw exception
    Throw,
    /// End of finally block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset of this instruction within its method body
    pub offset: u64,
    /// Size of this instruction in bytes
    pub size: u64,
    /// Primary opcode byte
    pub opcode: u8,
    /// Prefix byte (0 if no prefix)
    pub prefix: u8,
    /// Human-readable instruction mnemonic (e.g., "add", "ldloc.s", "ret")
    pub mnemonic: &'static str,
    /// How this instruction affects control flow
    pub flow_type: FlowType,
    /// The operand data for this instruction
    pub operand: Operand,
}

impl Instruction {
    /// Creates a single-byte opcode instruction at offset 0.
    ///
    /// Opcodes missing from the table are kept with the mnemonic `"unknown"`; their size is
    /// derived from the operand.
    #[must_use]
    pub fn new(opcode: u8, operand: Operand) -> Self {
        Self::build(0, opcode, operand)
    }

    /// Creates a two-byte (`0xFE`-prefixed) opcode instruction at offset 0.
    #[must_use]
    pub fn prefixed(opcode: u8, operand: Operand) -> Self {
        Self::build(opcodes::FE_PREFIX, opcode, operand)
    }

    fn build(prefix: u8, opcode: u8, operand: Operand) -> Self {
        let head = if prefix == 0 { 1 } else { 2 };
        let (mnemonic, flow_type, operand_size) = match opcodes::lookup(prefix, opcode) {
            Some(info) => (
                info.mnemonic,
                info.flow,
                info.operand.size().unwrap_or_else(|| inferred_size(&operand)),
            ),
            None => ("unknown", FlowType::Sequential, inferred_size(&operand)),
        };

        Instruction {
            offset: 0,
            size: head + operand_size,
            opcode,
            prefix,
            mnemonic,
            flow_type,
            operand,
        }
    }

    /// Moves the instruction to `offset`
    #[must_use]
    pub fn at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// `ldc.i4` in its shortest encoding
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        match value {
            -1 => Self::new(opcodes::LDC_I4_M1, Operand::None),
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            0..=8 => Self::new(opcodes::LDC_I4_0 + value as u8, Operand::None),
            _ => match i8::try_from(value) {
                Ok(short) => Self::new(
                    opcodes::LDC_I4_S,
                    Operand::Immediate(Immediate::Int8(short)),
                ),
                Err(_) => Self::new(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(value))),
            },
        }
    }

    /// `ldc.i8`
    #[must_use]
    pub fn ldc_i8(value: i64) -> Self {
        Self::new(opcodes::LDC_I8, Operand::Immediate(Immediate::Int64(value)))
    }

    /// `ldc.r4`
    #[must_use]
    pub fn ldc_r4(value: f32) -> Self {
        Self::new(opcodes::LDC_R4, Operand::Immediate(Immediate::Float32(value)))
    }

    /// `ldc.r8`
    #[must_use]
    pub fn ldc_r8(value: f64) -> Self {
        Self::new(opcodes::LDC_R8, Operand::Immediate(Immediate::Float64(value)))
    }

    /// `ldstr` carrying resolved text
    #[must_use]
    pub fn ldstr(text: impl Into<Arc<str>>) -> Self {
        Self::new(opcodes::LDSTR, Operand::String(text.into()))
    }

    /// `ldloc` in its shortest encoding
    #[must_use]
    pub fn ldloc(index: u16) -> Self {
        match index {
            #[allow(clippy::cast_possible_truncation)]
            0..=3 => Self::new(opcodes::LDLOC_0 + index as u8, Operand::None),
            4..=255 => Self::new(opcodes::LDLOC_S, Operand::Local(index)),
            _ => Self::prefixed(opcodes::FE_LDLOC, Operand::Local(index)),
        }
    }

    /// `stloc` in its shortest encoding
    #[must_use]
    pub fn stloc(index: u16) -> Self {
        match index {
            #[allow(clippy::cast_possible_truncation)]
            0..=3 => Self::new(opcodes::STLOC_0 + index as u8, Operand::None),
            4..=255 => Self::new(opcodes::STLOC_S, Operand::Local(index)),
            _ => Self::prefixed(opcodes::FE_STLOC, Operand::Local(index)),
        }
    }

    /// `ldarg` in its shortest encoding
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        match index {
            #[allow(clippy::cast_possible_truncation)]
            0..=3 => Self::new(opcodes::LDARG_0 + index as u8, Operand::None),
            4..=255 => Self::new(opcodes::LDARG_S, Operand::Argument(index)),
            _ => Self::prefixed(opcodes::FE_LDARG, Operand::Argument(index)),
        }
    }

    /// A branch opcode (`br`, `beq.s`, ...) to an absolute target offset
    #[must_use]
    pub fn branch(opcode: u8, target: u64) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    /// `switch` over absolute target offsets
    #[must_use]
    pub fn switch(targets: Vec<u64>) -> Self {
        Self::new(opcodes::SWITCH, Operand::Switch(targets))
    }

    /// `call` to a method token
    #[must_use]
    pub fn call(method: Token) -> Self {
        Self::new(opcodes::CALL, Operand::Token(method))
    }

    /// `initobj` of a resolved type
    #[must_use]
    pub fn initobj(ty: TypeSignature) -> Self {
        Self::prefixed(opcodes::FE_INITOBJ, Operand::Type(ty))
    }

    /// `nop`
    #[must_use]
    pub fn nop() -> Self {
        Self::new(opcodes::NOP, Operand::None)
    }

    /// `ret`
    #[must_use]
    pub fn ret() -> Self {
        Self::new(opcodes::RET, Operand::None)
    }

    /// Returns true for the single-byte opcode `opcode`
    #[must_use]
    pub fn is_op(&self, opcode: u8) -> bool {
        self.prefix == 0 && self.opcode == opcode
    }

    /// Returns true for the `0xFE`-prefixed opcode `opcode`
    #[must_use]
    pub fn is_fe_op(&self, opcode: u8) -> bool {
        self.prefix == opcodes::FE_PREFIX && self.opcode == opcode
    }

    /// Check if this instruction is a branch instruction.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch
        )
    }

    /// Returns true for `leave` / `leave.s`
    #[must_use]
    pub fn is_leave(&self) -> bool {
        self.flow_type == FlowType::Leave
    }

    /// Returns true for `br` / `br.s`
    #[must_use]
    pub fn is_unconditional_branch(&self) -> bool {
        self.flow_type == FlowType::UnconditionalBranch
    }

    /// Returns true for the conditional branch family
    #[must_use]
    pub fn is_conditional_branch(&self) -> bool {
        self.flow_type == FlowType::ConditionalBranch
    }

    /// Check if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Switch
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Absolute target offset of a single-target branch or `leave`
    #[must_use]
    pub fn branch_target(&self) -> Option<u64> {
        match (&self.operand, self.is_branch() || self.is_leave()) {
            (Operand::Target(target), true) => Some(*target),
            _ => None,
        }
    }

    /// Every absolute offset this instruction can jump to.
    ///
    /// For conditional branches the fall-through is not included; for `switch` the targets are
    /// in table order.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u64> {
        match &self.operand {
            Operand::Switch(targets) if self.flow_type == FlowType::Switch => targets.clone(),
            _ => self.branch_target().into_iter().collect(),
        }
    }

    /// Mutable view of the jump targets, used when offsets move
    pub fn branch_targets_mut(&mut self) -> &mut [u64] {
        if !(self.is_branch() || self.is_leave()) {
            return &mut [];
        }
        match &mut self.operand {
            Operand::Target(target) => std::slice::from_mut(target),
            Operand::Switch(targets) => targets.as_mut_slice(),
            _ => &mut [],
        }
    }

    /// Metadata token operand, if any
    #[must_use]
    pub fn token_operand(&self) -> Option<Token> {
        match &self.operand {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }

    /// Local index read by any `ldloc` form
    #[must_use]
    pub fn local_load_index(&self) -> Option<u16> {
        if self.prefix == 0 {
            match self.opcode {
                opcodes::LDLOC_0..=opcodes::LDLOC_3 => {
                    Some(u16::from(self.opcode - opcodes::LDLOC_0))
                }
                opcodes::LDLOC_S => self.index_operand(),
                _ => None,
            }
        } else if self.is_fe_op(opcodes::FE_LDLOC) {
            self.index_operand()
        } else {
            None
        }
    }

    /// Local index written by any `stloc` form
    #[must_use]
    pub fn local_store_index(&self) -> Option<u16> {
        if self.prefix == 0 {
            match self.opcode {
                opcodes::STLOC_0..=opcodes::STLOC_3 => {
                    Some(u16::from(self.opcode - opcodes::STLOC_0))
                }
                opcodes::STLOC_S => self.index_operand(),
                _ => None,
            }
        } else if self.is_fe_op(opcodes::FE_STLOC) {
            self.index_operand()
        } else {
            None
        }
    }

    /// Argument index read by any `ldarg` form
    #[must_use]
    pub fn arg_load_index(&self) -> Option<u16> {
        if self.prefix == 0 {
            match self.opcode {
                opcodes::LDARG_0..=opcodes::LDARG_3 => {
                    Some(u16::from(self.opcode - opcodes::LDARG_0))
                }
                opcodes::LDARG_S => self.index_operand(),
                _ => None,
            }
        } else if self.is_fe_op(opcodes::FE_LDARG) {
            self.index_operand()
        } else {
            None
        }
    }

    fn index_operand(&self) -> Option<u16> {
        match &self.operand {
            Operand::Local(idx) | Operand::Argument(idx) => Some(*idx),
            Operand::Immediate(Immediate::UInt8(idx)) => Some(u16::from(*idx)),
            _ => None,
        }
    }

    /// Returns true for any `ldloc` form
    #[must_use]
    pub fn is_ldloc(&self) -> bool {
        self.local_load_index().is_some()
    }

    /// Returns true for any `ldc.i4` form
    #[must_use]
    pub fn is_ldc_i4(&self) -> bool {
        self.ldc_i4_value().is_some()
    }

    /// Literal pushed by any `ldc.i4` form
    #[must_use]
    pub fn ldc_i4_value(&self) -> Option<i32> {
        if self.prefix != 0 {
            return None;
        }
        match (self.opcode, &self.operand) {
            (opcodes::LDC_I4_M1..=opcodes::LDC_I4_8, _) => {
                Some(i32::from(self.opcode) - i32::from(opcodes::LDC_I4_0))
            }
            (opcodes::LDC_I4_S, Operand::Immediate(Immediate::Int8(v))) => Some(i32::from(*v)),
            (opcodes::LDC_I4_S, Operand::Immediate(Immediate::UInt8(v))) => {
                Some(i32::from(i8::from_ne_bytes(v.to_ne_bytes())))
            }
            (opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(v))) => Some(*v),
            _ => None,
        }
    }
}

fn inferred_size(operand: &Operand) -> u64 {
    match operand {
        Operand::None => 0,
        Operand::Immediate(Immediate::Int8(_) | Immediate::UInt8(_)) => 1,
        Operand::Local(_) | Operand::Argument(_) => 2,
        Operand::Immediate(Immediate::Int64(_) | Immediate::Float64(_)) => 8,
        Operand::Switch(targets) => 4 + 4 * targets.len() as u64,
        _ => 4,
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, " {imm}"),
            Operand::Target(target) => write!(f, " IL_{target:04x}"),
            Operand::Switch(targets) => {
                write!(f, " (")?;
                for (idx, target) in targets.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "IL_{target:04x}")?;
                }
                write!(f, ")")
            }
            Operand::Token(token) => write!(f, " {token}"),
            Operand::Local(idx) => write!(f, " V_{idx}"),
            Operand::Argument(idx) => write!(f, " A_{idx}"),
            Operand::String(text) => write!(f, " {:?}", &**text),
            Operand::Type(ty) => write!(f, " {ty}"),
        }
    }
}
