//! ConfuserEx constants recovery integration tests.
//!
//! Every test builds a synthetic protection instance through the public API: a getter shaped
//! like the injected `<Module>::Get<T>(int)`, a member table, a constant blob and consumer
//! methods. The getter here dispatches with a `bne.un` chain where each decode block directly
//! follows its comparison.

use std::sync::Arc;

use cilprobe::{
    assembly::{opcodes, renumber_offsets, Immediate, Instruction, InstructionAssembler, Operand},
    deobfuscation::constants::{
        ConstantBlob, ConstantKeys, ConstantKind, ConstantsConfig, ConstantsDecryptor,
        ProtectionInstance, TagResolver,
    },
    metadata::{MemberTable, Method, Token, TypeSignature},
    Error,
};

const GETTER: Token = Token(0x0600_0002);
const GET_UTF8: Token = Token(0x0A00_0011);
const GET_EXECUTING_ASSEMBLY: Token = Token(0x0A00_0012);
const GET_CALLING_ASSEMBLY: Token = Token(0x0A00_0013);
const ASSEMBLY_EQUALITY: Token = Token(0x0A00_0014);
const TYPE_FROM_HANDLE: Token = Token(0x0A00_0015);
const CONCAT: Token = Token(0x0A00_0016);
const DATA: Token = Token(0x0400_0002);
const T: Token = Token(0x1B00_0002);

const GET_STRING: Token = Token(0x2B00_0011);
const GET_INT: Token = Token(0x2B00_0012);
const GET_DOUBLE: Token = Token(0x2B00_0013);
const GET_OBJECT: Token = Token(0x2B00_0014);

fn members() -> MemberTable {
    let mut table = MemberTable::new();
    table
        .add_member(GETTER, "<Module>::Get")
        .add_member(GET_UTF8, "System.Text.Encoding::get_UTF8")
        .add_member(
            GET_EXECUTING_ASSEMBLY,
            "System.Reflection.Assembly::GetExecutingAssembly",
        )
        .add_member(
            GET_CALLING_ASSEMBLY,
            "System.Reflection.Assembly::GetCallingAssembly",
        )
        .add_member(ASSEMBLY_EQUALITY, "System.Reflection.Assembly::op_Equality")
        .add_member(TYPE_FROM_HANDLE, "System.Type::GetTypeFromHandle")
        .add_member(CONCAT, "System.String::Concat")
        .add_method_spec(GET_STRING, GETTER, vec![TypeSignature::String])
        .add_method_spec(GET_INT, GETTER, vec![TypeSignature::I4])
        .add_method_spec(GET_DOUBLE, GETTER, vec![TypeSignature::R8])
        .add_method_spec(GET_OBJECT, GETTER, vec![TypeSignature::Object]);
    table
}

struct Getter {
    tags: [ConstantKind; 4],
    order: [ConstantKind; 3],
    keys: ConstantKeys,
    module_check: bool,
}

impl Getter {
    fn new(tags: [ConstantKind; 4], order: [ConstantKind; 3]) -> Self {
        Getter {
            tags,
            order,
            keys: ConstantKeys::new(0x3C6E_F35F, 0x1F12_3BB5),
            module_check: false,
        }
    }

    fn tag_of(&self, kind: ConstantKind) -> u32 {
        self.tags.iter().position(|k| *k == kind).unwrap() as u32
    }

    fn raw(&self, kind: ConstantKind, offset: usize) -> i32 {
        self.keys.encode(self.tag_of(kind), offset).unwrap()
    }

    fn build(&self) -> Method {
        let literal = |value: i32| {
            Instruction::new(opcodes::LDC_I4, Operand::Immediate(Immediate::Int32(value)))
        };
        let op = |opcode: u8| Instruction::new(opcode, Operand::None);

        let mut asm = InstructionAssembler::new();
        if self.module_check {
            asm.emit(Instruction::call(GET_EXECUTING_ASSEMBLY));
            asm.emit(Instruction::call(GET_CALLING_ASSEMBLY));
            asm.emit(Instruction::call(ASSEMBLY_EQUALITY));
            asm.emit(op(opcodes::POP));
        }
        asm.emit(Instruction::ldarg(0));
        asm.emit(literal(self.keys.key1));
        asm.emit(op(opcodes::MUL));
        asm.emit(literal(self.keys.key2));
        asm.emit(op(opcodes::XOR));
        asm.emit(Instruction::stloc(1));
        asm.emit(Instruction::ldloc(1));
        asm.emit(Instruction::ldc_i4(30));
        asm.emit(op(opcodes::SHR_UN));
        asm.emit(Instruction::stloc(0));

        for (idx, kind) in self.order.iter().enumerate() {
            let next = format!("next{idx}");
            asm.emit(Instruction::ldloc(0));
            asm.emit(Instruction::ldc_i4(self.tag_of(*kind) as i32));
            asm.emit_branch(opcodes::BNE_UN_S, &next);

            match kind {
                ConstantKind::Number => {
                    asm.emit(Instruction::ldc_i4(1));
                    asm.emit(Instruction::new(opcodes::NEWARR, Operand::Token(T)));
                    asm.emit(Instruction::stloc(2));
                    asm.emit(Instruction::ldloc(2));
                }
                ConstantKind::Object => {
                    asm.emit(Instruction::new(opcodes::LDTOKEN, Operand::Token(T)));
                    asm.emit(Instruction::call(TYPE_FROM_HANDLE));
                }
                ConstantKind::String => {
                    asm.emit(Instruction::call(GET_UTF8));
                    asm.emit(Instruction::new(opcodes::LDSFLD, Operand::Token(DATA)));
                    asm.emit(Instruction::ldloc(1));
                }
                ConstantKind::Default => unreachable!(),
            }
            asm.emit(op(opcodes::RET));
            asm.define_label(&next).unwrap();
        }

        asm.emit(Instruction::new(opcodes::LDLOCA_S, Operand::Local(1)));
        asm.emit(Instruction::prefixed(opcodes::FE_INITOBJ, Operand::Token(T)));
        asm.emit(Instruction::ldloc(1));
        asm.emit(op(opcodes::RET));

        Method::new(GETTER, "<Module>::Get", asm.finish().unwrap())
    }
}

struct Blob {
    data: Vec<u8>,
}

impl Blob {
    fn new() -> Self {
        // offset 0 stays unused so a zero literal never points at real data
        Blob { data: vec![0; 4] }
    }

    fn push(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len().next_multiple_of(4), 0);
        offset
    }

    fn string(&mut self, text: &str, rotated: bool) -> usize {
        let length = text.len() as u32;
        let prefix = if rotated { length.rotate_right(4) } else { length };
        let mut entry = prefix.to_le_bytes().to_vec();
        entry.extend_from_slice(text.as_bytes());
        self.push(&entry)
    }

    fn finish(self) -> ConstantBlob {
        ConstantBlob::new(self.data)
    }
}

fn consumer(token: u32, name: &str, sites: &[(i32, Token)]) -> Method {
    let mut body = Vec::new();
    for &(raw, spec) in sites {
        body.push(Instruction::ldc_i4(raw));
        body.push(Instruction::call(spec));
        body.push(Instruction::new(opcodes::POP, Operand::None));
    }
    body.push(Instruction::ret());

    let mut method = Method::new(Token(token), name, body);
    renumber_offsets(&mut method.instructions);
    method
}

fn ldstr_text(instr: &Instruction) -> Option<&str> {
    match &instr.operand {
        Operand::String(text) if instr.is_op(opcodes::LDSTR) => Some(text),
        _ => None,
    }
}

#[test]
fn tag_recovery_round_trip() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    let orders = [
        [Number, Object, String],
        [String, Object, Number],
        [Object, Number, String],
        [String, Number, Object],
    ];

    for order in orders {
        let getter = Getter::new([Object, String, Number, ConstantKind::Default], order);
        let (mapping, keys) = TagResolver::new(&members).resolve(&getter.build()).unwrap();

        assert_eq!(mapping.kind(2), Number, "order {order:?}");
        assert_eq!(mapping.kind(0), Object, "order {order:?}");
        assert_eq!(mapping.kind(1), String, "order {order:?}");
        assert_eq!(mapping.kind(3), ConstantKind::Default, "order {order:?}");
        assert_eq!(keys, getter.keys);
    }
}

#[test]
fn tag_recovery_every_default_position() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    for tags in [
        [ConstantKind::Default, Number, Object, String],
        [Number, ConstantKind::Default, String, Object],
        [String, Object, ConstantKind::Default, Number],
    ] {
        let getter = Getter::new(tags, [Number, Object, String]);
        let (mapping, _) = TagResolver::new(&members).resolve(&getter.build()).unwrap();

        for (tag, kind) in tags.iter().enumerate() {
            assert_eq!(mapping.kind(tag as u32), *kind);
        }
    }
}

#[test]
fn id_decode_worked_example() {
    let decoded = ConstantKeys::new(17, 0x5A).decode(9001);

    assert_eq!(decoded.id, (9001 * 17) ^ 0x5A);
    assert_eq!(decoded.id, 0x0002_55E3);
    assert_eq!(decoded.tag, 0);
    assert_eq!(decoded.offset, 0x0009_578C);
}

#[test]
fn module_check_shifts_key_positions() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    let mut getter = Getter::new(
        [Number, ConstantKind::Default, String, Object],
        [String, Number, Object],
    );
    getter.module_check = true;
    let method = getter.build();

    assert_eq!(method.instructions[5].ldc_i4_value(), Some(getter.keys.key1));
    assert_eq!(method.instructions[7].ldc_i4_value(), Some(getter.keys.key2));

    let (mapping, keys) = TagResolver::new(&members).resolve(&method).unwrap();
    assert_eq!(keys, getter.keys);
    assert_eq!(mapping.tag_of(ConstantKind::Default), Some(1));
}

#[test]
fn getter_with_two_decode_blocks_is_malformed() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    let mut method = Getter::new(
        [Object, String, Number, ConstantKind::Default],
        [Number, Object, String],
    )
    .build();

    // turn the String block's get_UTF8 call into something unrecognised
    for instr in &mut method.instructions {
        if instr.token_operand() == Some(GET_UTF8) {
            instr.operand = Operand::Token(CONCAT);
        }
    }

    let decryptor = ConstantsDecryptor::new(&members, ConstantsConfig::default());
    let mut consumers: Vec<Method> = Vec::new();
    let result = decryptor.process(&method, &mut consumers, &ConstantBlob::new(Vec::new()));
    assert!(matches!(result, Err(Error::MalformedGetter(_))));
}

#[test]
fn rotated_string_length() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    let getter = Getter::new(
        [String, ConstantKind::Default, Object, Number],
        [Object, String, Number],
    );

    let mut blob = Blob::new();
    let plain = blob.string("plain", false);
    let rotated = blob.string("pre-rotated length", true);
    let blob = blob.finish();

    // the stored prefix does not fit the blob and must be rotated back
    assert!(blob.read_u32_le(rotated).unwrap() as usize > blob.len());
    assert_eq!(blob.read_string(rotated).unwrap(), "pre-rotated length");

    let mut consumers = vec![consumer(
        0x0600_0040,
        "Program::Greet",
        &[
            (getter.raw(String, plain), GET_STRING),
            (getter.raw(String, rotated), GET_STRING),
        ],
    )];

    let decryptor = ConstantsDecryptor::new(&members, ConstantsConfig::default());
    let report = decryptor
        .process(&getter.build(), &mut consumers, &blob)
        .unwrap();

    assert_eq!(report.strings, 2);
    let code = &consumers[0].instructions;
    assert_eq!(ldstr_text(&code[0]), Some("plain"));
    assert_eq!(ldstr_text(&code[2]), Some("pre-rotated length"));
}

#[test]
fn partial_failure_isolation() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    let getter = Getter::new(
        [Object, String, Number, ConstantKind::Default],
        [String, Number, Object],
    );

    let mut blob = Blob::new();
    let greeting = blob.string("Hello", false);
    let answer = blob.push(&42i32.to_le_bytes());
    let ratio = blob.push(&0.75f64.to_le_bytes());
    let blob = blob.finish();

    let mut consumers = vec![
        consumer(
            0x0600_0050,
            "Program::Broken",
            &[(getter.raw(Object, 16), GET_OBJECT)],
        ),
        consumer(
            0x0600_0051,
            "Program::Fine",
            &[
                (getter.raw(String, greeting), GET_STRING),
                (getter.raw(Number, answer), GET_INT),
                (getter.raw(Number, ratio), GET_DOUBLE),
                (getter.raw(ConstantKind::Default, 0), GET_INT),
            ],
        ),
    ];
    let broken_before = consumers[0].clone();

    let decryptor = ConstantsDecryptor::new(&members, ConstantsConfig::default());
    let report = decryptor
        .process(&getter.build(), &mut consumers, &blob)
        .unwrap();

    assert_eq!(report.methods, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].method, Token(0x0600_0050));
    assert_eq!(report.failures[0].method_name, "Program::Broken");
    assert_eq!(report.failures[0].offset, broken_before.instructions[1].offset);
    assert_eq!(consumers[0], broken_before);

    assert_eq!(report.rewritten(), 4);
    let code = &consumers[1].instructions;
    assert_eq!(code.len(), 9);
    assert_eq!(ldstr_text(&code[0]), Some("Hello"));
    assert_eq!(code[2].ldc_i4_value(), Some(42));
    assert_eq!(code[4].operand, Operand::Immediate(Immediate::Float64(0.75)));
    assert!(code[6].is_fe_op(opcodes::FE_INITOBJ));
    assert_eq!(code[6].operand, Operand::Type(TypeSignature::I4));

    let mut cursor = 0;
    for instr in code {
        assert_eq!(instr.offset, cursor);
        cursor += instr.size;
    }
}

#[test]
fn process_all_and_parallel_rewriting() {
    use ConstantKind::{Number, Object, String};

    let members = members();
    let getter = Getter::new(
        [Number, Object, ConstantKind::Default, String],
        [Object, Number, String],
    );

    let mut blob = Blob::new();
    let texts: Vec<usize> = (0..8)
        .map(|i| blob.string(&format!("text {}", i % 3), false))
        .collect();
    let blob = blob.finish();

    let consumers: Vec<Method> = texts
        .iter()
        .enumerate()
        .map(|(i, &offset)| {
            consumer(
                0x0600_0060 + i as u32,
                &format!("Program::M{i}"),
                &[(getter.raw(String, offset), GET_STRING)],
            )
        })
        .collect();

    let mut broken = getter.build();
    broken.instructions.retain(|instr| !instr.is_op(opcodes::NEWARR));

    let mut instances = vec![
        ProtectionInstance {
            getter: broken,
            consumers: consumers.clone(),
            blob: blob.clone(),
        },
        ProtectionInstance {
            getter: getter.build(),
            consumers,
            blob,
        },
    ];

    let config = ConstantsConfig::default().with_parallel(true);
    let decryptor = ConstantsDecryptor::new(&members, config);
    let results = decryptor.process_all(&mut instances);

    assert!(matches!(results[0], Err(Error::MalformedGetter(_))));
    let report = results[1].as_ref().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.strings, 8);

    // identical texts share one allocation
    assert_eq!(decryptor.interner().len(), 3);
    let first = &instances[1].consumers[0].instructions[0].operand;
    let fourth = &instances[1].consumers[3].instructions[0].operand;
    match (first, fourth) {
        (Operand::String(a), Operand::String(b)) => assert!(Arc::ptr_eq(a, b)),
        other => panic!("expected ldstr operands, got {other:?}"),
    }
}
