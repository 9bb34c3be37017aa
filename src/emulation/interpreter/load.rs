//! Load handlers: constants, arguments, locals and array elements.

use crate::{
    assembly::{opcodes, Immediate, Instruction, Operand},
    emulation::{
        interpreter::{invalid_operand, StepResult},
        EmValue, EmulationError, ExecutionContext, HeapRef,
    },
};

/// `ldc.i4` (all encodings), `ldc.i8`, `ldc.r4`, `ldc.r8`
pub(super) fn constant(
    ctx: &mut ExecutionContext,
    instruction: &Instruction,
) -> Result<StepResult, EmulationError> {
    let value = if let Some(value) = instruction.ldc_i4_value() {
        EmValue::I32(value)
    } else {
        match (instruction.opcode, &instruction.operand) {
            (opcodes::LDC_I8, Operand::Immediate(Immediate::Int64(v))) => EmValue::I64(*v),
            (opcodes::LDC_R4, Operand::Immediate(Immediate::Float32(v))) => EmValue::F32(*v),
            (opcodes::LDC_R8, Operand::Immediate(Immediate::Float64(v))) => EmValue::F64(*v),
            _ => return Err(invalid_operand(instruction, "numeric literal")),
        }
    };
    ctx.push(value);
    Ok(StepResult::Continue)
}

/// `ldarg` (all forms)
pub(super) fn argument(
    ctx: &mut ExecutionContext,
    instruction: &Instruction,
) -> Result<StepResult, EmulationError> {
    let index = instruction
        .arg_load_index()
        .ok_or_else(|| invalid_operand(instruction, "argument index"))?;
    let value = ctx.arg(index)?;
    ctx.push(value);
    Ok(StepResult::Continue)
}

/// `ldloc` (all forms)
pub(super) fn local(
    ctx: &mut ExecutionContext,
    instruction: &Instruction,
) -> Result<StepResult, EmulationError> {
    let index = instruction
        .local_load_index()
        .ok_or_else(|| invalid_operand(instruction, "local index"))?;
    let value = ctx.local(index)?;
    ctx.push(value);
    Ok(StepResult::Continue)
}

/// `ldelem.u4`
pub(super) fn array_element(ctx: &mut ExecutionContext) -> Result<StepResult, EmulationError> {
    let index = ctx.pop()?;
    let array = ctx.pop()?;

    let array = array_ref(&array, "ldelem.u4")?;
    let elements = ctx.array(array)?;
    let slot = element_slot(&index, elements.len(), "ldelem.u4")?;

    // uint32 element; the stack keeps its bit pattern as int32
    let value = EmValue::I32(elements[slot]);
    ctx.push(value);
    Ok(StepResult::Continue)
}

pub(super) fn array_ref(
    value: &EmValue,
    operation: &'static str,
) -> Result<HeapRef, EmulationError> {
    value.as_array_ref().ok_or(EmulationError::TypeMismatch {
        operation,
        expected: "ArrayRef",
        found: value.type_name(),
    })
}

pub(super) fn element_slot(
    index: &EmValue,
    length: usize,
    operation: &'static str,
) -> Result<usize, EmulationError> {
    let index = match index {
        EmValue::I32(v) => i64::from(*v),
        EmValue::I64(v) => *v,
        other => {
            return Err(EmulationError::TypeMismatch {
                operation,
                expected: "I32",
                found: other.type_name(),
            })
        }
    };
    usize::try_from(index)
        .ok()
        .filter(|&slot| slot < length)
        .ok_or(EmulationError::ArrayIndexOutOfRange { index, length })
}
