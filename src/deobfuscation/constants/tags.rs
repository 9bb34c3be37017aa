//! Recovery of the tag mapping and the id keys from a constant getter.
//!
//! The getter decodes its `int` argument with two embedded keys, takes the top two bits as a
//! tag, and dispatches on it to one of four decode paths. Which tag selects which path is
//! randomized per protected assembly. Rather than understanding the decode paths, the getter is
//! reduced to its dispatch skeleton:
//!
//! 1. Every decode block is replaced by `ldc.i4 <sentinel>; ret`. The Number path is recognised
//!    by its array allocation, the Object path by its token load, and the String path by its
//!    call to `Encoding::get_UTF8`.
//! 2. Everything else that is not a local load, an integer literal, `conv.u8`, `ret` or a
//!    branch becomes `nop`, which keeps the block topology but drops side effects.
//! 3. The blocks are flattened and everything before the first local load is dropped.
//! 4. The skeleton is run four times, once per tag, with the tag in local 0 and the Default
//!    sentinel standing in for the id in local 1. The value left on the stack names the path.
//!
//! The keys are read from the untouched getter: they are the literals at positions 1 and 3, or 5
//! and 7 when the getter opens with an `Assembly::GetExecutingAssembly` check.

use std::fmt;

use log::{debug, info};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::{
    assembly::{
        build_blocks, flatten_blocks, opcodes, remove_dead_blocks, BasicBlock, Instruction,
    },
    emulation::{EmValue, EmulationLimits, Routine},
    metadata::{MemberResolver, Method},
    Error, Result,
};

/// Sentinel left on the stack by the Number decode path
pub const NUMBER_SENTINEL: i32 = 0xAA;
/// Sentinel left on the stack by the Object decode path
pub const OBJECT_SENTINEL: i32 = 0xBB;
/// Sentinel left on the stack by the String decode path
pub const STRING_SENTINEL: i32 = 0xCC;
/// Seed of the id local; returned unchanged by the Default path
pub const DEFAULT_SENTINEL: i32 = 0xDD;

const UTF8_ACCESSOR: &str = "get_UTF8";
const MODULE_LOOKUP: &str = "GetExecutingAssembly";

/// The four decode paths of a constant getter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ConstantKind {
    /// `int`, `float` or `double` read from the blob
    Number,
    /// Arbitrary object, deserialized from the blob
    Object,
    /// Length-prefixed UTF-8 string
    String,
    /// `default(T)`, no blob read
    Default,
}

impl ConstantKind {
    /// The stack value that identifies this path during probing
    #[must_use]
    pub fn sentinel(self) -> i32 {
        match self {
            ConstantKind::Number => NUMBER_SENTINEL,
            ConstantKind::Object => OBJECT_SENTINEL,
            ConstantKind::String => STRING_SENTINEL,
            ConstantKind::Default => DEFAULT_SENTINEL,
        }
    }

    /// The path identified by a probe result
    #[must_use]
    pub fn from_sentinel(value: i32) -> Option<Self> {
        ConstantKind::iter().find(|kind| kind.sentinel() == value)
    }
}

/// Which decode path each of the four tags selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMapping {
    kinds: [ConstantKind; 4],
}

impl TagMapping {
    /// Builds a mapping from the kind selected by tags 0 to 3.
    ///
    /// # Errors
    /// Returns [`Error::MalformedGetter`] unless Number, Object and String are each selected by
    /// exactly one tag.
    pub fn new(kinds: [ConstantKind; 4]) -> Result<Self> {
        for kind in ConstantKind::iter().filter(|kind| *kind != ConstantKind::Default) {
            let claims = kinds.iter().filter(|k| **k == kind).count();
            if claims != 1 {
                return Err(Error::MalformedGetter(format!(
                    "{kind} decode path is selected by {claims} tags"
                )));
            }
        }
        Ok(TagMapping { kinds })
    }

    /// The kind selected by `tag`; only the low two bits are used
    #[must_use]
    pub fn kind(&self, tag: u32) -> ConstantKind {
        self.kinds[(tag & 3) as usize]
    }

    /// The tag that selects `kind`
    #[must_use]
    pub fn tag_of(&self, kind: ConstantKind) -> Option<u32> {
        self.kinds
            .iter()
            .position(|k| *k == kind)
            .and_then(|tag| u32::try_from(tag).ok())
    }

    /// `(tag, kind)` pairs in tag order
    pub fn iter(&self) -> impl Iterator<Item = (u32, ConstantKind)> + '_ {
        (0u32..).zip(self.kinds.iter().copied())
    }
}

impl fmt::Display for TagMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, kind) in self.iter() {
            if tag > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{tag}={kind}")?;
        }
        Ok(())
    }
}

/// The two literals the getter mixes into every id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantKeys {
    /// Multiplier
    pub key1: i32,
    /// XOR mask
    pub key2: i32,
}

/// A call-site literal after key mixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedId {
    /// `raw * key1 ^ key2`, 32-bit wrapping
    pub id: i32,
    /// Top two bits of `id`
    pub tag: u32,
    /// Byte offset of the entry in the constant blob
    pub offset: usize,
}

impl ConstantKeys {
    /// Creates a key pair
    #[must_use]
    pub fn new(key1: i32, key2: i32) -> Self {
        ConstantKeys { key1, key2 }
    }

    /// Mixes a call-site literal into an id and splits it into tag and blob offset
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn decode(&self, raw: i32) -> DecodedId {
        let id = raw.wrapping_mul(self.key1) ^ self.key2;
        let bits = id as u32;
        DecodedId {
            id,
            tag: bits >> 30,
            offset: ((bits & 0x3FFF_FFFF) << 2) as usize,
        }
    }

    /// The call-site literal that decodes to `tag` and `offset`.
    ///
    /// Returns `None` if `key1` is even (not invertible modulo 2^32), if `tag` does not fit two
    /// bits, or if `offset` is not a multiple of 4 below 2^32.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn encode(&self, tag: u32, offset: usize) -> Option<i32> {
        if self.key1 & 1 == 0 || tag > 3 || offset % 4 != 0 {
            return None;
        }
        let word = u32::try_from(offset / 4).ok().filter(|w| *w <= 0x3FFF_FFFF)?;
        let id = ((tag << 30) | word) as i32;

        // Newton iteration for the inverse of an odd number, each round doubles the correct bits
        let key1 = self.key1 as u32;
        let mut inverse = key1;
        for _ in 0..5 {
            inverse = inverse.wrapping_mul(2u32.wrapping_sub(key1.wrapping_mul(inverse)));
        }

        Some(((id ^ self.key2) as u32).wrapping_mul(inverse) as i32)
    }
}

impl fmt::Display for ConstantKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key1=0x{:08X}, key2=0x{:08X}", self.key1, self.key2)
    }
}

/// Returns true for `newarr`, the marker of the Number decode path
#[must_use]
pub fn is_array_allocation(instruction: &Instruction) -> bool {
    instruction.is_op(opcodes::NEWARR)
}

/// Returns true for `ldtoken`, the marker of the Object decode path
#[must_use]
pub fn is_token_load(instruction: &Instruction) -> bool {
    instruction.is_op(opcodes::LDTOKEN)
}

/// Returns true for a call to `Encoding::get_UTF8`, the marker of the String decode path
#[must_use]
pub fn is_utf8_accessor_call(instruction: &Instruction, resolver: &dyn MemberResolver) -> bool {
    is_call_to(instruction, resolver, UTF8_ACCESSOR)
}

/// Returns true for a call to `Assembly::GetExecutingAssembly`
#[must_use]
pub fn is_module_lookup_call(instruction: &Instruction, resolver: &dyn MemberResolver) -> bool {
    is_call_to(instruction, resolver, MODULE_LOOKUP)
}

fn is_call_to(instruction: &Instruction, resolver: &dyn MemberResolver, member: &str) -> bool {
    instruction.is_op(opcodes::CALL)
        && instruction
            .token_operand()
            .and_then(|token| resolver.member_name(token))
            .is_some_and(|name| name.contains(member))
}

/// The decode path a block implements, decided by its first marker instruction
#[must_use]
pub fn classify_block(
    instructions: &[Instruction],
    resolver: &dyn MemberResolver,
) -> Option<ConstantKind> {
    instructions.iter().find_map(|instr| {
        if is_array_allocation(instr) {
            Some(ConstantKind::Number)
        } else if is_token_load(instr) {
            Some(ConstantKind::Object)
        } else if is_utf8_accessor_call(instr, resolver) {
            Some(ConstantKind::String)
        } else {
            None
        }
    })
}

/// Instructions that survive canonicalization
fn drives_dispatch(instruction: &Instruction) -> bool {
    instruction.is_ldloc()
        || instruction.is_ldc_i4()
        || instruction.is_op(opcodes::LDC_I8)
        || instruction.is_op(opcodes::CONV_U8)
        || instruction.is_op(opcodes::RET)
        || instruction.is_branch()
}

/// Replaces decode blocks with sentinel stubs and neutralizes everything else.
///
/// Returns the kinds of the replaced blocks in physical order.
///
/// # Errors
/// Returns [`Error::MalformedGetter`] unless exactly three blocks were replaced.
pub fn canonicalize(
    blocks: &mut [BasicBlock],
    resolver: &dyn MemberResolver,
) -> Result<Vec<ConstantKind>> {
    let mut found = Vec::with_capacity(3);

    for block in blocks.iter_mut() {
        if let Some(kind) = classify_block(&block.instructions, resolver) {
            debug!(
                "Block {} at IL_{:04x} decodes {kind} constants",
                block.id, block.offset
            );
            let stub = Instruction::ldc_i4(kind.sentinel()).at(block.offset);
            let ret = Instruction::ret().at(block.offset + stub.size);
            block.instructions = vec![stub, ret];
            found.push(kind);
        }

        for instr in &mut block.instructions {
            if !drives_dispatch(instr) {
                *instr = Instruction::nop().at(instr.offset);
            }
        }
    }

    if found.len() != 3 {
        return Err(Error::MalformedGetter(format!(
            "expected 3 decode blocks, found {}",
            found.len()
        )));
    }
    Ok(found)
}

/// Drops the prologue in front of the first local load.
#[must_use]
pub fn trim(mut instructions: Vec<Instruction>) -> Vec<Instruction> {
    let start = instructions
        .iter()
        .position(Instruction::is_ldloc)
        .unwrap_or(instructions.len());
    instructions.drain(..start);
    instructions
}

/// Recovers the [`TagMapping`] and [`ConstantKeys`] of one constant getter.
///
/// # Examples
///
/// ```rust,no_run
/// use cilprobe::deobfuscation::constants::{ConstantKind, TagResolver};
/// use cilprobe::metadata::{MemberTable, Method};
///
/// # fn load() -> (Method, MemberTable) { unimplemented!() }
/// let (getter, members) = load();
/// let (mapping, keys) = TagResolver::new(&members).resolve(&getter)?;
/// println!("strings use tag {:?}, {keys}", mapping.tag_of(ConstantKind::String));
/// # Ok::<(), cilprobe::Error>(())
/// ```
pub struct TagResolver<'a> {
    resolver: &'a dyn MemberResolver,
    limits: EmulationLimits,
}

impl<'a> TagResolver<'a> {
    /// Creates a resolver with default emulation limits
    #[must_use]
    pub fn new(resolver: &'a dyn MemberResolver) -> Self {
        TagResolver {
            resolver,
            limits: EmulationLimits::default(),
        }
    }

    /// Replaces the limits applied to every probe
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Canonicalizes, probes and reads the keys of `getter`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedGetter`] if the getter does not have the expected shape, and
    /// [`Error::Emulation`] if a probe run fails.
    pub fn resolve(&self, getter: &Method) -> Result<(TagMapping, ConstantKeys)> {
        let keys = self.read_keys(getter)?;
        let skeleton = self.dispatch_skeleton(getter)?;
        let mapping = self.probe(&skeleton)?;

        info!("Constant getter {getter}: {mapping}; {keys}");
        Ok((mapping, keys))
    }

    /// Reads the two key literals from the untouched getter body.
    ///
    /// # Errors
    /// Returns [`Error::MalformedGetter`] if a key position does not hold an `ldc.i4`.
    pub fn read_keys(&self, getter: &Method) -> Result<ConstantKeys> {
        let body = &getter.instructions;
        let (first, second) = match body.first() {
            Some(instr) if is_module_lookup_call(instr, self.resolver) => (5, 7),
            _ => (1, 3),
        };

        let key_at = |position: usize| {
            body.get(position)
                .and_then(Instruction::ldc_i4_value)
                .ok_or_else(|| {
                    Error::MalformedGetter(format!(
                        "{getter} has no key literal at position {position}"
                    ))
                })
        };

        Ok(ConstantKeys::new(key_at(first)?, key_at(second)?))
    }

    /// The canonicalized, flattened and trimmed dispatch code of `getter`.
    ///
    /// # Errors
    /// Returns [`Error::MalformedGetter`] if canonicalization fails, and
    /// [`Error::Malformed`] if the block view cannot be flattened.
    pub fn dispatch_skeleton(&self, getter: &Method) -> Result<Vec<Instruction>> {
        let mut blocks = remove_dead_blocks(build_blocks(&getter.instructions));
        canonicalize(&mut blocks, self.resolver)?;
        Ok(trim(flatten_blocks(&blocks)?))
    }

    /// Runs the skeleton once per tag and assembles the mapping.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if a run fails and [`Error::MalformedGetter`] if a run
    /// leaves anything but a sentinel on the stack or the kinds are not claimed once each.
    pub fn probe(&self, skeleton: &[Instruction]) -> Result<TagMapping> {
        let mut kinds = [ConstantKind::Default; 4];

        for (tag, slot) in (0i32..).zip(kinds.iter_mut()) {
            let mut routine = Routine::new(skeleton).with_limits(self.limits);
            routine.set_local(0, EmValue::I32(tag));
            routine.set_local(1, EmValue::I32(DEFAULT_SENTINEL));

            let ctx = routine.emulate()?;
            let kind = match ctx.peek() {
                Some(EmValue::I32(value)) => ConstantKind::from_sentinel(*value),
                _ => None,
            }
            .ok_or_else(|| {
                Error::MalformedGetter(format!(
                    "probe for tag {tag} ended with {}",
                    ctx.peek()
                        .map_or_else(|| "an empty stack".to_string(), ToString::to_string)
                ))
            })?;

            debug!("Tag {tag} selects the {kind} path");
            *slot = kind;
        }

        TagMapping::new(kinds)
    }
}
