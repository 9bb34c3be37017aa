//! CIL opcode byte constants and the opcode info table (ECMA-335).
//!
//! Single-byte opcodes are named after their mnemonic (e.g. [`CALL`] = `0x28`). Two-byte
//! opcodes that use the `0xFE` prefix have their second byte stored with an `FE_` prefix
//! (e.g. [`FE_INITOBJ`] = `0x15` for `initobj`, encoded `0xFE 0x15`).
//!
//! Only the opcodes that show up in constant getters and their call sites are listed. The
//! table is what gives a constructed [`crate::assembly::Instruction`] its mnemonic, encoded
//! size and flow type; anything not listed is still representable but carries the mnemonic
//! `"unknown"`.
#![allow(missing_docs)]

use crate::assembly::{FlowType, OperandType};

pub const NOP: u8 = 0x00;
pub const BREAK: u8 = 0x01;

pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDARG_2: u8 = 0x04;
pub const LDARG_3: u8 = 0x05;
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_1: u8 = 0x07;
pub const LDLOC_2: u8 = 0x08;
pub const LDLOC_3: u8 = 0x09;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_1: u8 = 0x0B;
pub const STLOC_2: u8 = 0x0C;
pub const STLOC_3: u8 = 0x0D;
pub const LDARG_S: u8 = 0x0E;
pub const LDARGA_S: u8 = 0x0F;
pub const STARG_S: u8 = 0x10;
pub const LDLOC_S: u8 = 0x11;
pub const LDLOCA_S: u8 = 0x12;
pub const STLOC_S: u8 = 0x13;

pub const LDNULL: u8 = 0x14;
pub const LDC_I4_M1: u8 = 0x15;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const LDC_I4_2: u8 = 0x18;
pub const LDC_I4_3: u8 = 0x19;
pub const LDC_I4_4: u8 = 0x1A;
pub const LDC_I4_5: u8 = 0x1B;
pub const LDC_I4_6: u8 = 0x1C;
pub const LDC_I4_7: u8 = 0x1D;
pub const LDC_I4_8: u8 = 0x1E;
pub const LDC_I4_S: u8 = 0x1F;
pub const LDC_I4: u8 = 0x20;
pub const LDC_I8: u8 = 0x21;
pub const LDC_R4: u8 = 0x22;
pub const LDC_R8: u8 = 0x23;

pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;

pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BEQ_S: u8 = 0x2E;
pub const BGE_S: u8 = 0x2F;
pub const BGT_S: u8 = 0x30;
pub const BLE_S: u8 = 0x31;
pub const BLT_S: u8 = 0x32;
pub const BNE_UN_S: u8 = 0x33;
pub const BGE_UN_S: u8 = 0x34;
pub const BGT_UN_S: u8 = 0x35;
pub const BLE_UN_S: u8 = 0x36;
pub const BLT_UN_S: u8 = 0x37;
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;
pub const BEQ: u8 = 0x3B;
pub const BGE: u8 = 0x3C;
pub const BGT: u8 = 0x3D;
pub const BLE: u8 = 0x3E;
pub const BLT: u8 = 0x3F;
pub const BNE_UN: u8 = 0x40;
pub const BGE_UN: u8 = 0x41;
pub const BGT_UN: u8 = 0x42;
pub const BLE_UN: u8 = 0x43;
pub const BLT_UN: u8 = 0x44;
pub const SWITCH: u8 = 0x45;

pub const ADD: u8 = 0x58;
pub const SUB: u8 = 0x59;
pub const MUL: u8 = 0x5A;
pub const DIV: u8 = 0x5B;
pub const DIV_UN: u8 = 0x5C;
pub const REM: u8 = 0x5D;
pub const REM_UN: u8 = 0x5E;
pub const AND: u8 = 0x5F;
pub const OR: u8 = 0x60;
pub const XOR: u8 = 0x61;
pub const SHL: u8 = 0x62;
pub const SHR: u8 = 0x63;
pub const SHR_UN: u8 = 0x64;
pub const NEG: u8 = 0x65;
pub const NOT: u8 = 0x66;

pub const CONV_I1: u8 = 0x67;
pub const CONV_I2: u8 = 0x68;
pub const CONV_I4: u8 = 0x69;
pub const CONV_I8: u8 = 0x6A;
pub const CONV_R4: u8 = 0x6B;
pub const CONV_R8: u8 = 0x6C;
pub const CONV_U4: u8 = 0x6D;
pub const CONV_U8: u8 = 0x6E;

pub const CALLVIRT: u8 = 0x6F;
pub const LDSTR: u8 = 0x72;
pub const NEWOBJ: u8 = 0x73;
pub const CASTCLASS: u8 = 0x74;
pub const ISINST: u8 = 0x75;
pub const THROW: u8 = 0x7A;
pub const LDFLD: u8 = 0x7B;
pub const STFLD: u8 = 0x7D;
pub const LDSFLD: u8 = 0x7E;
pub const STSFLD: u8 = 0x80;
pub const BOX: u8 = 0x8C;
pub const NEWARR: u8 = 0x8D;
pub const LDLEN: u8 = 0x8E;
pub const LDELEM_U1: u8 = 0x91;
pub const LDELEM_I4: u8 = 0x94;
pub const LDELEM_U4: u8 = 0x95;
pub const STELEM_I1: u8 = 0x9C;
pub const STELEM_I4: u8 = 0x9E;
pub const UNBOX_ANY: u8 = 0xA5;
pub const LDTOKEN: u8 = 0xD0;
pub const CONV_U2: u8 = 0xD1;
pub const CONV_U1: u8 = 0xD2;
pub const ENDFINALLY: u8 = 0xDC;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

// Two-byte opcodes; the first byte is always FE_PREFIX.
pub const FE_PREFIX: u8 = 0xFE;
pub const FE_CEQ: u8 = 0x01;
pub const FE_CGT: u8 = 0x02;
pub const FE_CGT_UN: u8 = 0x03;
pub const FE_CLT: u8 = 0x04;
pub const FE_CLT_UN: u8 = 0x05;
pub const FE_LDARG: u8 = 0x09;
pub const FE_STARG: u8 = 0x0B;
pub const FE_LDLOC: u8 = 0x0C;
pub const FE_STLOC: u8 = 0x0E;
pub const FE_INITOBJ: u8 = 0x15;

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Mnemonic as printed by ildasm
    pub mnemonic: &'static str,
    /// Encoding of the inline operand
    pub operand: OperandType,
    /// How the instruction affects control flow
    pub flow: FlowType,
}

const fn op(mnemonic: &'static str, operand: OperandType, flow: FlowType) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        operand,
        flow,
    }
}

const fn seq(mnemonic: &'static str) -> OpcodeInfo {
    op(mnemonic, OperandType::None, FlowType::Sequential)
}

const fn cond(mnemonic: &'static str, operand: OperandType) -> OpcodeInfo {
    op(mnemonic, operand, FlowType::ConditionalBranch)
}

/// Looks up an opcode. `prefix` is `0` for single-byte opcodes and [`FE_PREFIX`] otherwise.
#[must_use]
pub fn lookup(prefix: u8, opcode: u8) -> Option<OpcodeInfo> {
    use OperandType as O;

    if prefix == FE_PREFIX {
        return match opcode {
            FE_CEQ => Some(seq("ceq")),
            FE_CGT => Some(seq("cgt")),
            FE_CGT_UN => Some(seq("cgt.un")),
            FE_CLT => Some(seq("clt")),
            FE_CLT_UN => Some(seq("clt.un")),
            FE_LDARG => Some(op("ldarg", O::UInt16, FlowType::Sequential)),
            FE_STARG => Some(op("starg", O::UInt16, FlowType::Sequential)),
            FE_LDLOC => Some(op("ldloc", O::UInt16, FlowType::Sequential)),
            FE_STLOC => Some(op("stloc", O::UInt16, FlowType::Sequential)),
            FE_INITOBJ => Some(op("initobj", O::Token, FlowType::Sequential)),
            _ => None,
        };
    }
    if prefix != 0 {
        return None;
    }

    let info = match opcode {
        NOP => seq("nop"),
        BREAK => seq("break"),
        LDARG_0 => seq("ldarg.0"),
        LDARG_1 => seq("ldarg.1"),
        LDARG_2 => seq("ldarg.2"),
        LDARG_3 => seq("ldarg.3"),
        LDLOC_0 => seq("ldloc.0"),
        LDLOC_1 => seq("ldloc.1"),
        LDLOC_2 => seq("ldloc.2"),
        LDLOC_3 => seq("ldloc.3"),
        STLOC_0 => seq("stloc.0"),
        STLOC_1 => seq("stloc.1"),
        STLOC_2 => seq("stloc.2"),
        STLOC_3 => seq("stloc.3"),
        LDARG_S => op("ldarg.s", O::UInt8, FlowType::Sequential),
        LDARGA_S => op("ldarga.s", O::UInt8, FlowType::Sequential),
        STARG_S => op("starg.s", O::UInt8, FlowType::Sequential),
        LDLOC_S => op("ldloc.s", O::UInt8, FlowType::Sequential),
        LDLOCA_S => op("ldloca.s", O::UInt8, FlowType::Sequential),
        STLOC_S => op("stloc.s", O::UInt8, FlowType::Sequential),
        LDNULL => seq("ldnull"),
        LDC_I4_M1 => seq("ldc.i4.m1"),
        LDC_I4_0 => seq("ldc.i4.0"),
        LDC_I4_1 => seq("ldc.i4.1"),
        LDC_I4_2 => seq("ldc.i4.2"),
        LDC_I4_3 => seq("ldc.i4.3"),
        LDC_I4_4 => seq("ldc.i4.4"),
        LDC_I4_5 => seq("ldc.i4.5"),
        LDC_I4_6 => seq("ldc.i4.6"),
        LDC_I4_7 => seq("ldc.i4.7"),
        LDC_I4_8 => seq("ldc.i4.8"),
        LDC_I4_S => op("ldc.i4.s", O::Int8, FlowType::Sequential),
        LDC_I4 => op("ldc.i4", O::Int32, FlowType::Sequential),
        LDC_I8 => op("ldc.i8", O::Int64, FlowType::Sequential),
        LDC_R4 => op("ldc.r4", O::Float32, FlowType::Sequential),
        LDC_R8 => op("ldc.r8", O::Float64, FlowType::Sequential),
        DUP => seq("dup"),
        POP => seq("pop"),
        CALL => op("call", O::Token, FlowType::Call),
        RET => op("ret", O::None, FlowType::Return),
        BR_S => op("br.s", O::Int8, FlowType::UnconditionalBranch),
        BRFALSE_S => cond("brfalse.s", O::Int8),
        BRTRUE_S => cond("brtrue.s", O::Int8),
        BEQ_S => cond("beq.s", O::Int8),
        BGE_S => cond("bge.s", O::Int8),
        BGT_S => cond("bgt.s", O::Int8),
        BLE_S => cond("ble.s", O::Int8),
        BLT_S => cond("blt.s", O::Int8),
        BNE_UN_S => cond("bne.un.s", O::Int8),
        BGE_UN_S => cond("bge.un.s", O::Int8),
        BGT_UN_S => cond("bgt.un.s", O::Int8),
        BLE_UN_S => cond("ble.un.s", O::Int8),
        BLT_UN_S => cond("blt.un.s", O::Int8),
        BR => op("br", O::Int32, FlowType::UnconditionalBranch),
        BRFALSE => cond("brfalse", O::Int32),
        BRTRUE => cond("brtrue", O::Int32),
        BEQ => cond("beq", O::Int32),
        BGE => cond("bge", O::Int32),
        BGT => cond("bgt", O::Int32),
        BLE => cond("ble", O::Int32),
        BLT => cond("blt", O::Int32),
        BNE_UN => cond("bne.un", O::Int32),
        BGE_UN => cond("bge.un", O::Int32),
        BGT_UN => cond("bgt.un", O::Int32),
        BLE_UN => cond("ble.un", O::Int32),
        BLT_UN => cond("blt.un", O::Int32),
        SWITCH => op("switch", O::Switch, FlowType::Switch),
        ADD => seq("add"),
        SUB => seq("sub"),
        MUL => seq("mul"),
        DIV => seq("div"),
        DIV_UN => seq("div.un"),
        REM => seq("rem"),
        REM_UN => seq("rem.un"),
        AND => seq("and"),
        OR => seq("or"),
        XOR => seq("xor"),
        SHL => seq("shl"),
        SHR => seq("shr"),
        SHR_UN => seq("shr.un"),
        NEG => seq("neg"),
        NOT => seq("not"),
        CONV_I1 => seq("conv.i1"),
        CONV_I2 => seq("conv.i2"),
        CONV_I4 => seq("conv.i4"),
        CONV_I8 => seq("conv.i8"),
        CONV_R4 => seq("conv.r4"),
        CONV_R8 => seq("conv.r8"),
        CONV_U4 => seq("conv.u4"),
        CONV_U8 => seq("conv.u8"),
        CALLVIRT => op("callvirt", O::Token, FlowType::Call),
        LDSTR => op("ldstr", O::Token, FlowType::Sequential),
        NEWOBJ => op("newobj", O::Token, FlowType::Call),
        CASTCLASS => op("castclass", O::Token, FlowType::Sequential),
        ISINST => op("isinst", O::Token, FlowType::Sequential),
        THROW => op("throw", O::None, FlowType::Throw),
        LDFLD => op("ldfld", O::Token, FlowType::Sequential),
        STFLD => op("stfld", O::Token, FlowType::Sequential),
        LDSFLD => op("ldsfld", O::Token, FlowType::Sequential),
        STSFLD => op("stsfld", O::Token, FlowType::Sequential),
        BOX => op("box", O::Token, FlowType::Sequential),
        NEWARR => op("newarr", O::Token, FlowType::Sequential),
        LDLEN => seq("ldlen"),
        LDELEM_U1 => seq("ldelem.u1"),
        LDELEM_I4 => seq("ldelem.i4"),
        LDELEM_U4 => seq("ldelem.u4"),
        STELEM_I1 => seq("stelem.i1"),
        STELEM_I4 => seq("stelem.i4"),
        UNBOX_ANY => op("unbox.any", O::Token, FlowType::Sequential),
        LDTOKEN => op("ldtoken", O::Token, FlowType::Sequential),
        CONV_U2 => seq("conv.u2"),
        CONV_U1 => seq("conv.u1"),
        ENDFINALLY => op("endfinally", O::None, FlowType::EndFinally),
        LEAVE => op("leave", O::Int32, FlowType::Leave),
        LEAVE_S => op("leave.s", O::Int8, FlowType::Leave),
        _ => return None,
    };
    Some(info)
}

/// Returns the long form of a short branch opcode, or the opcode itself
#[must_use]
pub fn long_branch(opcode: u8) -> u8 {
    match opcode {
        BR_S..=BLT_UN_S => opcode + (BR - BR_S),
        LEAVE_S => LEAVE,
        _ => opcode,
    }
}
