//! Arithmetic handlers: `add`, `sub`, `mul`, `or`, `neg`.
//!
//! Integer operations wrap at the operand's own width. Both operands must have the same kind.

use crate::emulation::{interpreter::StepResult, EmValue, EmulationError, ExecutionContext};

/// Two-operand arithmetic opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Or,
}

impl ArithmeticOp {
    fn mnemonic(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::Or => "or",
        }
    }

    fn apply(self, lhs: EmValue, rhs: EmValue) -> Result<EmValue, EmulationError> {
        let result = match (lhs, rhs) {
            (EmValue::I32(a), EmValue::I32(b)) => EmValue::I32(match self {
                ArithmeticOp::Add => a.wrapping_add(b),
                ArithmeticOp::Sub => a.wrapping_sub(b),
                ArithmeticOp::Mul => a.wrapping_mul(b),
                ArithmeticOp::Or => a | b,
            }),
            (EmValue::I64(a), EmValue::I64(b)) => EmValue::I64(match self {
                ArithmeticOp::Add => a.wrapping_add(b),
                ArithmeticOp::Sub => a.wrapping_sub(b),
                ArithmeticOp::Mul => a.wrapping_mul(b),
                ArithmeticOp::Or => a | b,
            }),
            (EmValue::F32(a), EmValue::F32(b)) if self != ArithmeticOp::Or => {
                EmValue::F32(match self {
                    ArithmeticOp::Add => a + b,
                    ArithmeticOp::Sub => a - b,
                    _ => a * b,
                })
            }
            (EmValue::F64(a), EmValue::F64(b)) if self != ArithmeticOp::Or => {
                EmValue::F64(match self {
                    ArithmeticOp::Add => a + b,
                    ArithmeticOp::Sub => a - b,
                    _ => a * b,
                })
            }
            (lhs, rhs) if lhs.same_kind(&rhs) => {
                return Err(EmulationError::TypeMismatch {
                    operation: self.mnemonic(),
                    expected: "I32 or I64",
                    found: lhs.type_name(),
                })
            }
            (lhs, rhs) => {
                return Err(EmulationError::TypeMismatch {
                    operation: self.mnemonic(),
                    expected: lhs.type_name(),
                    found: rhs.type_name(),
                })
            }
        };
        Ok(result)
    }
}

/// Pops `rhs` then `lhs`, pushes `lhs op rhs`
pub(super) fn binary(
    ctx: &mut ExecutionContext,
    op: ArithmeticOp,
) -> Result<StepResult, EmulationError> {
    let rhs = ctx.pop()?;
    let lhs = ctx.pop()?;
    ctx.push(op.apply(lhs, rhs)?);
    Ok(StepResult::Continue)
}

/// `neg`
pub(super) fn negate(ctx: &mut ExecutionContext) -> Result<StepResult, EmulationError> {
    let value = match ctx.pop()? {
        EmValue::I32(v) => EmValue::I32(v.wrapping_neg()),
        EmValue::I64(v) => EmValue::I64(v.wrapping_neg()),
        EmValue::F32(v) => EmValue::F32(-v),
        EmValue::F64(v) => EmValue::F64(-v),
        other @ EmValue::ArrayRef(_) => {
            return Err(EmulationError::TypeMismatch {
                operation: "neg",
                expected: "numeric",
                found: other.type_name(),
            })
        }
    };
    ctx.push(value);
    Ok(StepResult::Continue)
}
