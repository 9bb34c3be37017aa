//! # cilprobe Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the cilprobe library. Import this module to get quick access to everything needed to
//! recover ConfuserEx constants.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilprobe operations
pub use crate::Error;

/// The result type used throughout cilprobe
pub use crate::Result;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::Token;

/// Method bodies, generic arguments and the member resolution seam
pub use crate::metadata::{MemberResolver, MemberTable, Method, MethodInstantiation, TypeSignature};

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model and block view
pub use crate::assembly::{
    build_blocks, flatten_blocks, remove_dead_blocks, renumber_offsets, BasicBlock, FlowType,
    Immediate, Instruction, InstructionAssembler, Operand,
};

// ================================================================================================
// Emulation
// ================================================================================================

/// Interpreter, execution state and runtime values
pub use crate::emulation::{
    EmValue, EmulationError, EmulationLimits, ExecutionContext, Interpreter, Routine,
};

// ================================================================================================
// Constant Recovery
// ================================================================================================

/// Tag resolution, call-site patching and orchestration
pub use crate::deobfuscation::{
    constants::{
        find_consumers, ConstantBlob, ConstantKeys, ConstantKind, ConstantPatcher,
        ConstantsConfig, ConstantsDecryptor, PatchFailure, PatchReport, ProtectionInstance,
        StringInterner, TagMapping, TagResolver,
    },
    ControlFlowCleaner,
};
