//! Bitwise handlers: `and`, `xor`, `not`, `shl`, `shr`, `shr.un`.
//!
//! Integer kinds only. Shift amounts are masked to the width of the shifted value.

use crate::emulation::{interpreter::StepResult, EmValue, EmulationError, ExecutionContext};

/// Two-operand bitwise opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BitwiseOp {
    And,
    Xor,
}

/// Shift opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ShiftOp {
    Shl,
    Shr,
    ShrUn,
}

impl BitwiseOp {
    fn mnemonic(self) -> &'static str {
        match self {
            BitwiseOp::And => "and",
            BitwiseOp::Xor => "xor",
        }
    }
}

impl ShiftOp {
    fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Shl => "shl",
            ShiftOp::Shr => "shr",
            ShiftOp::ShrUn => "shr.un",
        }
    }
}

/// Pops `rhs` then `lhs`, pushes `lhs op rhs`
pub(super) fn binary(
    ctx: &mut ExecutionContext,
    op: BitwiseOp,
) -> Result<StepResult, EmulationError> {
    let rhs = ctx.pop()?;
    let lhs = ctx.pop()?;
    let value = match (lhs, rhs) {
        (EmValue::I32(a), EmValue::I32(b)) => EmValue::I32(match op {
            BitwiseOp::And => a & b,
            BitwiseOp::Xor => a ^ b,
        }),
        (EmValue::I64(a), EmValue::I64(b)) => EmValue::I64(match op {
            BitwiseOp::And => a & b,
            BitwiseOp::Xor => a ^ b,
        }),
        (lhs, rhs) => {
            return Err(EmulationError::TypeMismatch {
                operation: op.mnemonic(),
                expected: if lhs.same_kind(&rhs) {
                    "I32 or I64"
                } else {
                    lhs.type_name()
                },
                found: rhs.type_name(),
            })
        }
    };
    ctx.push(value);
    Ok(StepResult::Continue)
}

/// Pops the shift amount then the value, pushes the shifted value
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub(super) fn shift(ctx: &mut ExecutionContext, op: ShiftOp) -> Result<StepResult, EmulationError> {
    let amount = ctx.pop()?;
    let value = ctx.pop()?;

    let EmValue::I32(amount) = amount else {
        return Err(EmulationError::TypeMismatch {
            operation: op.mnemonic(),
            expected: "I32",
            found: amount.type_name(),
        });
    };
    // wrapping_* masks the amount to the value's bit width
    let amount = amount as u32;

    let result = match value {
        EmValue::I32(v) => EmValue::I32(match op {
            ShiftOp::Shl => v.wrapping_shl(amount),
            ShiftOp::Shr => v.wrapping_shr(amount),
            ShiftOp::ShrUn => (v as u32).wrapping_shr(amount) as i32,
        }),
        EmValue::I64(v) => EmValue::I64(match op {
            ShiftOp::Shl => v.wrapping_shl(amount),
            ShiftOp::Shr => v.wrapping_shr(amount),
            ShiftOp::ShrUn => (v as u64).wrapping_shr(amount) as i64,
        }),
        other => {
            return Err(EmulationError::TypeMismatch {
                operation: op.mnemonic(),
                expected: "I32 or I64",
                found: other.type_name(),
            })
        }
    };
    ctx.push(result);
    Ok(StepResult::Continue)
}

/// `not`
pub(super) fn not(ctx: &mut ExecutionContext) -> Result<StepResult, EmulationError> {
    let value = match ctx.pop()? {
        EmValue::I32(v) => EmValue::I32(!v),
        EmValue::I64(v) => EmValue::I64(!v),
        other => {
            return Err(EmulationError::TypeMismatch {
                operation: "not",
                expected: "I32 or I64",
                found: other.type_name(),
            })
        }
    };
    ctx.push(value);
    Ok(StepResult::Continue)
}
