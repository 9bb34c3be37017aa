//! Synthetic ConfuserEx constant getters, member tables and blobs for unit tests.
//!
//! [`build_getter`] produces a getter with the same shape as the injected `<Module>::Get<T>`:
//! key mixing prologue, tag/offset split, an equality-branch dispatch chain, a `default(T)`
//! fall-through and three decode blocks. [`GetterLayout`] controls which tag selects which block
//! and in which physical order the blocks appear.

use crate::{
    assembly::{opcodes, Immediate, Instruction, InstructionAssembler, Operand},
    deobfuscation::constants::{ConstantBlob, ConstantKeys, ConstantKind},
    metadata::{MemberTable, Method, Token, TypeSignature},
};

pub const GETTER: Token = Token(0x0600_0001);
pub const DATA_FIELD: Token = Token(0x0400_0001);
pub const GENERIC_PARAM: Token = Token(0x1B00_0001);
pub const POINT_TYPE: Token = Token(0x0200_0005);

pub const GET_UTF8: Token = Token(0x0A00_0001);
pub const GET_STRING: Token = Token(0x0A00_0002);
pub const BLOCK_COPY: Token = Token(0x0A00_0003);
pub const TYPE_FROM_HANDLE: Token = Token(0x0A00_0004);
pub const GET_EXECUTING_ASSEMBLY: Token = Token(0x0A00_0005);
pub const GET_CALLING_ASSEMBLY: Token = Token(0x0A00_0006);
pub const ASSEMBLY_EQUALITY: Token = Token(0x0A00_0007);
pub const WRITE_LINE: Token = Token(0x0A00_0008);

pub const SPEC_STRING: Token = Token(0x2B00_0001);
pub const SPEC_INT: Token = Token(0x2B00_0002);
pub const SPEC_DOUBLE: Token = Token(0x2B00_0003);
pub const SPEC_FLOAT: Token = Token(0x2B00_0004);
pub const SPEC_LONG: Token = Token(0x2B00_0005);
pub const SPEC_OBJECT: Token = Token(0x2B00_0006);
pub const SPEC_POINT: Token = Token(0x2B00_0007);

/// Member names and getter instantiations referenced by the fixtures
pub fn members() -> MemberTable {
    let mut table = MemberTable::new();
    table
        .add_member(GETTER, "<Module>::Get")
        .add_member(GET_UTF8, "System.Text.Encoding::get_UTF8")
        .add_member(GET_STRING, "System.Text.Encoding::GetString")
        .add_member(BLOCK_COPY, "System.Buffer::BlockCopy")
        .add_member(TYPE_FROM_HANDLE, "System.Type::GetTypeFromHandle")
        .add_member(
            GET_EXECUTING_ASSEMBLY,
            "System.Reflection.Assembly::GetExecutingAssembly",
        )
        .add_member(
            GET_CALLING_ASSEMBLY,
            "System.Reflection.Assembly::GetCallingAssembly",
        )
        .add_member(ASSEMBLY_EQUALITY, "System.Reflection.Assembly::op_Equality")
        .add_member(WRITE_LINE, "System.Console::WriteLine")
        .add_method_spec(SPEC_STRING, GETTER, vec![TypeSignature::String])
        .add_method_spec(SPEC_INT, GETTER, vec![TypeSignature::I4])
        .add_method_spec(SPEC_DOUBLE, GETTER, vec![TypeSignature::R8])
        .add_method_spec(SPEC_FLOAT, GETTER, vec![TypeSignature::R4])
        .add_method_spec(SPEC_LONG, GETTER, vec![TypeSignature::I8])
        .add_method_spec(SPEC_OBJECT, GETTER, vec![TypeSignature::Object])
        .add_method_spec(
            SPEC_POINT,
            GETTER,
            vec![TypeSignature::ValueType(POINT_TYPE)],
        );
    table
}

/// Shape parameters of a synthetic getter
#[derive(Debug, Clone)]
pub struct GetterLayout {
    /// Kind selected by tags 0 to 3
    pub tags: [ConstantKind; 4],
    /// Physical order of the decode blocks (and of the dispatch comparisons)
    pub block_order: [ConstantKind; 3],
    pub key1: i32,
    pub key2: i32,
    /// Open with the `GetExecutingAssembly() == GetCallingAssembly()` check
    pub module_check: bool,
}

impl Default for GetterLayout {
    fn default() -> Self {
        GetterLayout {
            tags: [
                ConstantKind::Object,
                ConstantKind::String,
                ConstantKind::Number,
                ConstantKind::Default,
            ],
            block_order: [
                ConstantKind::Number,
                ConstantKind::Object,
                ConstantKind::String,
            ],
            key1: 17,
            key2: 0x5A,
            module_check: false,
        }
    }
}

impl GetterLayout {
    pub fn keys(&self) -> ConstantKeys {
        ConstantKeys::new(self.key1, self.key2)
    }

    pub fn tag_of(&self, kind: ConstantKind) -> u32 {
        self.tags.iter().position(|k| *k == kind).unwrap() as u32
    }
}

fn op(opcode: u8) -> Instruction {
    Instruction::new(opcode, Operand::None)
}

fn ldc_i4_long(value: i32) -> Instruction {
    Instruction::new(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(value)))
}

fn decode_block(asm: &mut InstructionAssembler, kind: ConstantKind) {
    let code = match kind {
        ConstantKind::Number => vec![
            Instruction::ldc_i4(1),
            Instruction::new(opcodes::NEWARR, Operand::Token(GENERIC_PARAM)),
            Instruction::stloc(2),
            Instruction::new(opcodes::LDSFLD, Operand::Token(DATA_FIELD)),
            Instruction::ldloc(1),
            Instruction::ldloc(2),
            Instruction::ldc_i4(0),
            Instruction::ldc_i4(4),
            Instruction::call(BLOCK_COPY),
            Instruction::ldloc(2),
            Instruction::ldc_i4(0),
            op(opcodes::LDELEM_U4),
            op(opcodes::RET),
        ],
        ConstantKind::Object => vec![
            Instruction::new(opcodes::LDTOKEN, Operand::Token(GENERIC_PARAM)),
            Instruction::call(TYPE_FROM_HANDLE),
            op(opcodes::POP),
            Instruction::ldloc(2),
            op(opcodes::RET),
        ],
        ConstantKind::String => vec![
            Instruction::call(GET_UTF8),
            Instruction::new(opcodes::LDSFLD, Operand::Token(DATA_FIELD)),
            Instruction::ldloc(1),
            Instruction::ldc_i4(4),
            op(opcodes::ADD),
            Instruction::ldloc(2),
            Instruction::new(opcodes::CALLVIRT, Operand::Token(GET_STRING)),
            op(opcodes::RET),
        ],
        ConstantKind::Default => unreachable!("the default path is the fall-through"),
    };
    for instr in code {
        asm.emit(instr);
    }
}

/// Builds `<Module>::Get<T>(int)` for `layout`
pub fn build_getter(layout: &GetterLayout) -> Method {
    let mut asm = InstructionAssembler::new();

    if layout.module_check {
        asm.emit(Instruction::call(GET_EXECUTING_ASSEMBLY));
        asm.emit(Instruction::call(GET_CALLING_ASSEMBLY));
        asm.emit(Instruction::call(ASSEMBLY_EQUALITY));
        asm.emit(op(opcodes::POP));
    }

    // id = id * key1 ^ key2
    asm.emit(Instruction::ldarg(0));
    asm.emit(ldc_i4_long(layout.key1));
    asm.emit(op(opcodes::MUL));
    asm.emit(ldc_i4_long(layout.key2));
    asm.emit(op(opcodes::XOR));
    asm.emit(Instruction::stloc(1));

    // tag = id >>> 30
    asm.emit(Instruction::ldloc(1));
    asm.emit(Instruction::ldc_i4(30));
    asm.emit(op(opcodes::SHR_UN));
    asm.emit(Instruction::stloc(0));

    // offset = (id & 0x3FFFFFFF) << 2
    asm.emit(Instruction::ldloc(1));
    asm.emit(ldc_i4_long(0x3FFF_FFFF));
    asm.emit(op(opcodes::AND));
    asm.emit(Instruction::ldc_i4(2));
    asm.emit(op(opcodes::SHL));
    asm.emit(Instruction::stloc(1));

    for kind in layout.block_order {
        asm.emit(Instruction::ldloc(0));
        asm.emit(Instruction::ldc_i4(layout.tag_of(kind) as i32));
        asm.emit_branch(opcodes::BEQ, &kind.to_string());
    }

    // default(T)
    asm.emit(Instruction::new(opcodes::LDLOCA_S, Operand::Local(1)));
    asm.emit(Instruction::prefixed(
        opcodes::FE_INITOBJ,
        Operand::Token(GENERIC_PARAM),
    ));
    asm.emit(Instruction::ldloc(1));
    asm.emit(op(opcodes::RET));

    for kind in layout.block_order {
        asm.define_label(&kind.to_string()).unwrap();
        decode_block(&mut asm, kind);
    }

    Method::new(GETTER, "<Module>::Get", asm.finish().unwrap())
}

/// `ldc.i4 <raw>; call <spec>` for a constant of `kind` stored at `offset`
pub fn call_site(
    layout: &GetterLayout,
    kind: ConstantKind,
    offset: usize,
    spec: Token,
) -> [Instruction; 2] {
    let raw = layout
        .keys()
        .encode(layout.tag_of(kind), offset)
        .unwrap();
    [ldc_i4_long(raw), Instruction::call(spec)]
}

/// Appends 4-byte aligned constant entries
#[derive(Debug, Default)]
pub struct BlobBuilder {
    data: Vec<u8>,
}

impl BlobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        offset
    }

    pub fn string(&mut self, text: &str) -> usize {
        let mut entry = (text.len() as u32).to_le_bytes().to_vec();
        entry.extend_from_slice(text.as_bytes());
        self.push(&entry)
    }

    /// A string whose length prefix is stored rotated right by four bits
    pub fn rotated_string(&mut self, text: &str) -> usize {
        let mut entry = (text.len() as u32).rotate_right(4).to_le_bytes().to_vec();
        entry.extend_from_slice(text.as_bytes());
        self.push(&entry)
    }

    pub fn i32(&mut self, value: i32) -> usize {
        self.push(&value.to_le_bytes())
    }

    pub fn f32(&mut self, value: f32) -> usize {
        self.push(&value.to_le_bytes())
    }

    pub fn f64(&mut self, value: f64) -> usize {
        self.push(&value.to_le_bytes())
    }

    pub fn build(self) -> ConstantBlob {
        ConstantBlob::new(self.data)
    }
}
