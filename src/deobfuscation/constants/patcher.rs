//! Rewriting of getter call sites into literal loads.
//!
//! A protected literal looks like this in a consumer method:
//!
//! ```text
//! IL_0010: ldc.i4     0x1C2F3E4D
//! IL_0015: call       string <Module>::Get<string>(int32)
//! ```
//!
//! The literal is decoded with the getter's keys, the tag picks the decode path through the
//! [`TagMapping`], and the pair is collapsed into one instruction that takes the offset of the
//! `ldc.i4`:
//!
//! | Kind | Replacement |
//! |------|-------------|
//! | String | `ldstr` with the decoded text |
//! | Number | `ldc.i4`, `ldc.r8` or `ldc.r4` by the call's type argument |
//! | Default | `initobj T` |
//! | Object | not decoded, the call site is reported |
//!
//! The first failing call site in a method ends the work on that method; everything rewritten
//! before it stays rewritten. Offsets are renumbered once per method.

use std::{fmt, sync::Arc};

use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    assembly::{opcodes, renumber_offsets, Instruction},
    deobfuscation::{
        constants::{ConstantBlob, ConstantKeys, ConstantKind, StringInterner, TagMapping},
        ControlFlowCleaner,
    },
    metadata::{MemberResolver, Method, Token, TypeSignature},
    Error, Result,
};

/// Returns true if `instruction` calls an instantiation of the generic method `getter`
#[must_use]
pub fn is_getter_call(
    instruction: &Instruction,
    getter: Token,
    resolver: &dyn MemberResolver,
) -> bool {
    instruction.is_op(opcodes::CALL)
        && instruction
            .token_operand()
            .and_then(|token| resolver.method_spec(token))
            .is_some_and(|spec| spec.method == getter)
}

/// The inputs of one getter call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Index of the `call` in the method body
    pub index: usize,
    /// Offset of the `ldc.i4` feeding the call
    pub offset: u64,
    /// The literal passed to the getter
    pub raw: i32,
    /// `T` of the called `Get<T>`
    pub generic_arg: TypeSignature,
}

/// A call site that could not be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure {
    /// Token of the consumer method
    pub method: Token,
    /// Full name of the consumer method
    pub method_name: String,
    /// Offset of the failing call in the body as it was handed in
    pub offset: u64,
    /// Why the call site was rejected
    pub message: String,
}

impl fmt::Display for PatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) at IL_{:04x}: {}",
            self.method_name, self.method, self.offset, self.message
        )
    }
}

/// Outcome of rewriting a set of consumer methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchReport {
    /// Consumer methods visited
    pub methods: usize,
    /// Call sites replaced by `ldstr`
    pub strings: usize,
    /// Call sites replaced by a numeric literal
    pub numbers: usize,
    /// Call sites replaced by `initobj`
    pub defaults: usize,
    /// One entry per method whose rewriting stopped early
    pub failures: Vec<PatchFailure>,
}

impl PatchReport {
    /// Total number of rewritten call sites
    #[must_use]
    pub fn rewritten(&self) -> usize {
        self.strings + self.numbers + self.defaults
    }

    /// Returns true if no method reported a failure
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Adds the counts and failures of `other`
    pub fn merge(&mut self, other: PatchReport) {
        self.methods += other.methods;
        self.strings += other.strings;
        self.numbers += other.numbers;
        self.defaults += other.defaults;
        self.failures.extend(other.failures);
    }

    fn merged(mut self, other: PatchReport) -> PatchReport {
        self.merge(other);
        self
    }

    fn record(&mut self, kind: ConstantKind) {
        match kind {
            ConstantKind::String => self.strings += 1,
            ConstantKind::Number => self.numbers += 1,
            ConstantKind::Default => self.defaults += 1,
            ConstantKind::Object => {}
        }
    }

    fn fail(&mut self, method: &Method, offset: u64, error: &Error) {
        let failure = PatchFailure {
            method: method.token,
            method_name: method.name.clone(),
            offset,
            message: error.to_string(),
        };
        warn!("Constant call site left in place: {failure}");
        self.failures.push(failure);
    }
}

/// Rewrites the call sites of one constant getter.
pub struct ConstantPatcher<'a> {
    getter: Token,
    mapping: TagMapping,
    keys: ConstantKeys,
    blob: &'a ConstantBlob,
    resolver: &'a dyn MemberResolver,
    interner: Option<&'a StringInterner>,
    cleaner: Option<&'a dyn ControlFlowCleaner>,
}

impl<'a> ConstantPatcher<'a> {
    /// Creates a patcher for calls to `getter`
    #[must_use]
    pub fn new(
        getter: Token,
        mapping: TagMapping,
        keys: ConstantKeys,
        blob: &'a ConstantBlob,
        resolver: &'a dyn MemberResolver,
    ) -> Self {
        ConstantPatcher {
            getter,
            mapping,
            keys,
            blob,
            resolver,
            interner: None,
            cleaner: None,
        }
    }

    /// Shares decoded strings through `interner`
    #[must_use]
    pub fn with_interner(mut self, interner: &'a StringInterner) -> Self {
        self.interner = Some(interner);
        self
    }

    /// Strips the constants control-flow protection with `cleaner` before scanning
    #[must_use]
    pub fn with_cleaner(mut self, cleaner: &'a dyn ControlFlowCleaner) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    /// Finds the next getter call at or after `from`.
    ///
    /// A `br` directly in front of the call that jumps to the call itself is deleted first;
    /// the returned index accounts for the removal.
    pub fn next_call_site(
        &self,
        instructions: &mut Vec<Instruction>,
        from: usize,
    ) -> Option<usize> {
        let mut index = (from..instructions.len())
            .find(|&idx| is_getter_call(&instructions[idx], self.getter, self.resolver))?;

        if index > 0 {
            let previous = &instructions[index - 1];
            if previous.is_unconditional_branch()
                && previous.branch_target() == Some(instructions[index].offset)
            {
                debug!("Dropping forwarding jump {previous}");
                instructions.remove(index - 1);
                index -= 1;
            }
        }

        Some(index)
    }

    /// Reads the literal and type argument of the getter call at `index`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCallSite`] if the call is not preceded by an `ldc.i4` or its
    /// instantiation has no type argument.
    pub fn call_site(&self, instructions: &[Instruction], index: usize) -> Result<CallSite> {
        let call = instructions.get(index).ok_or_else(|| {
            Error::InvalidCallSite(format!("no instruction at index {index}"))
        })?;

        let literal = index
            .checked_sub(1)
            .and_then(|prev| instructions.get(prev))
            .ok_or_else(|| Error::InvalidCallSite(format!("{call} has no argument")))?;
        let raw = literal.ldc_i4_value().ok_or_else(|| {
            Error::InvalidCallSite(format!("{call} is fed by {literal}, not an integer literal"))
        })?;

        let generic_arg = call
            .token_operand()
            .and_then(|token| self.resolver.method_spec(token))
            .and_then(|spec| spec.generic_args.first().cloned())
            .ok_or_else(|| {
                Error::InvalidCallSite(format!("{call} has no generic type argument"))
            })?;

        Ok(CallSite {
            index,
            offset: literal.offset,
            raw,
            generic_arg,
        })
    }

    /// Decodes the constant of `site` into its replacement instruction.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedConstantKind`] for Object constants and numbers of other
    /// types than `int32`, `float64` and `float32`, and [`Error::OutOfBounds`] if the entry
    /// does not fit the blob.
    pub fn decode(&self, site: &CallSite) -> Result<(ConstantKind, Instruction)> {
        let decoded = self.keys.decode(site.raw);
        let kind = self.mapping.kind(decoded.tag);

        let replacement = match kind {
            ConstantKind::String => {
                let text = self.blob.read_string(decoded.offset)?;
                let text: Arc<str> = match self.interner {
                    Some(interner) => interner.intern(&text),
                    None => Arc::from(text),
                };
                Instruction::ldstr(text)
            }
            ConstantKind::Number => match site.generic_arg {
                TypeSignature::I4 => Instruction::ldc_i4(self.blob.read_i32(decoded.offset)?),
                TypeSignature::R8 => Instruction::ldc_r8(self.blob.read_f64(decoded.offset)?),
                TypeSignature::R4 => Instruction::ldc_r4(self.blob.read_f32(decoded.offset)?),
                ref other => {
                    return Err(Error::UnsupportedConstantKind(format!(
                        "number constant of type {other}"
                    )))
                }
            },
            ConstantKind::Object => {
                return Err(Error::UnsupportedConstantKind(format!(
                    "object constant of type {} at blob offset 0x{:x}",
                    site.generic_arg, decoded.offset
                )))
            }
            ConstantKind::Default => Instruction::initobj(site.generic_arg.clone()),
        };

        Ok((kind, replacement.at(site.offset)))
    }

    /// Collapses the getter call at `index` and its literal into the decoded constant
    fn rewrite(&self, instructions: &mut Vec<Instruction>, index: usize) -> Result<ConstantKind> {
        let site = self.call_site(instructions, index)?;
        let (kind, replacement) = self.decode(&site)?;

        debug!("IL_{:04x}: {kind} constant -> {replacement}", site.offset);
        instructions.splice(index - 1..=index, std::iter::once(replacement));
        Ok(kind)
    }

    /// Rewrites every getter call in `method` and renumbers its offsets.
    ///
    /// Never fails: a rejected call site ends the work on this method and is recorded in the
    /// returned report.
    pub fn patch_method(&self, method: &mut Method) -> PatchReport {
        let mut report = PatchReport {
            methods: 1,
            ..PatchReport::default()
        };

        if let Some(cleaner) = self.cleaner {
            if cleaner.is_present(method) {
                debug!("Removing constants control flow from {method}");
                if let Err(error) = cleaner.remove(method) {
                    report.fail(method, 0, &error);
                    return report;
                }
            }
        }

        let mut cursor = 0;
        while let Some(index) = self.next_call_site(&mut method.instructions, cursor) {
            match self.rewrite(&mut method.instructions, index) {
                // the replacement sits at index - 1
                Ok(kind) => {
                    report.record(kind);
                    cursor = index;
                }
                Err(error) => {
                    let offset = method.instructions[index].offset;
                    report.fail(method, offset, &error);
                    break;
                }
            }
        }

        renumber_offsets(&mut method.instructions);
        report
    }

    /// Rewrites every method in `methods`, concurrently if `parallel` is set
    pub fn patch_all(&self, methods: &mut [Method], parallel: bool) -> PatchReport {
        if parallel {
            methods
                .par_iter_mut()
                .map(|method| self.patch_method(method))
                .reduce(PatchReport::default, PatchReport::merged)
        } else {
            methods
                .iter_mut()
                .map(|method| self.patch_method(method))
                .fold(PatchReport::default(), PatchReport::merged)
        }
    }
}
