//! Store handlers: locals, array elements and fields.

use crate::{
    assembly::Instruction,
    emulation::{
        interpreter::{
            invalid_operand,
            load::{array_ref, element_slot},
            StepResult,
        },
        EmValue, EmulationError, ExecutionContext,
    },
};

/// `stloc` (all forms)
pub(super) fn local(
    ctx: &mut ExecutionContext,
    instruction: &Instruction,
) -> Result<StepResult, EmulationError> {
    let index = instruction
        .local_store_index()
        .ok_or_else(|| invalid_operand(instruction, "local index"))?;
    let value = ctx.pop()?;
    ctx.set_local(index, value);
    Ok(StepResult::Continue)
}

/// `stelem.i4`
pub(super) fn array_element(ctx: &mut ExecutionContext) -> Result<StepResult, EmulationError> {
    let value = ctx.pop()?;
    let index = ctx.pop()?;
    let array = ctx.pop()?;

    let EmValue::I32(value) = value else {
        return Err(EmulationError::TypeMismatch {
            operation: "stelem.i4",
            expected: "I32",
            found: value.type_name(),
        });
    };
    let array = array_ref(&array, "stelem.i4")?;
    let elements = ctx.array_mut(array)?;
    let slot = element_slot(&index, elements.len(), "stelem.i4")?;
    elements[slot] = value;
    Ok(StepResult::Continue)
}

/// `stfld`: field state is not tracked
pub(super) fn field() -> Result<StepResult, EmulationError> {
    Ok(StepResult::Continue)
}
