//! ConfuserEx constants protection.
//!
//! The protection moves every string and numeric literal of the protected assembly into one
//! encrypted, compressed data blob and replaces each use with `ldc.i4 <id>; call Get<T>`. The
//! injected getter mixes the id with two keys and uses the top two bits to choose a decode
//! path.
//!
//! Recovery runs in two stages:
//!
//! 1. [`TagResolver`] reduces the getter to its dispatch skeleton and probes it with the
//!    interpreter to learn which tag selects which [`ConstantKind`]. It also reads the two keys.
//! 2. [`ConstantPatcher`] walks every consumer method, decodes each call site against the
//!    [`ConstantBlob`] and replaces it with the literal it stood for.
//!
//! [`ConstantsDecryptor`] runs both stages for one or more protection instances.
//!
//! # Failure Policy
//!
//! A getter that does not have the expected shape fails its whole instance. A call site that
//! cannot be decoded fails only the rest of its own method, and is reported in
//! [`PatchReport::failures`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilprobe::deobfuscation::constants::{ConstantBlob, ConstantsConfig, ConstantsDecryptor};
//! use cilprobe::metadata::{MemberTable, Method};
//!
//! # fn load() -> (Method, Vec<Method>, Vec<u8>, MemberTable) { unimplemented!() }
//! let (getter, mut methods, data, members) = load();
//!
//! let config = ConstantsConfig::default().with_parallel(true);
//! let decryptor = ConstantsDecryptor::new(&members, config);
//! let report = decryptor.process(&getter, &mut methods, &ConstantBlob::new(data))?;
//! assert!(report.is_clean());
//! # Ok::<(), cilprobe::Error>(())
//! ```

mod blob;
mod patcher;
mod tags;

pub use blob::{ConstantBlob, StringInterner};
pub use patcher::{is_getter_call, CallSite, ConstantPatcher, PatchFailure, PatchReport};
pub use tags::{
    canonicalize, classify_block, is_array_allocation, is_module_lookup_call, is_token_load,
    is_utf8_accessor_call, trim, ConstantKeys, ConstantKind, DecodedId, TagMapping, TagResolver,
    DEFAULT_SENTINEL, NUMBER_SENTINEL, OBJECT_SENTINEL, STRING_SENTINEL,
};

use log::{info, warn};

use crate::{
    deobfuscation::ControlFlowCleaner,
    emulation::EmulationLimits,
    metadata::{MemberResolver, Method, Token},
    Result,
};

/// Settings for constant recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantsConfig {
    /// Step ceiling applied to every probe run.
    pub limits: EmulationLimits,

    /// Rewrite consumer methods on the rayon thread pool.
    ///
    /// Default: false
    pub parallel: bool,

    /// Share one allocation between identical decoded strings.
    ///
    /// Default: true
    pub intern_strings: bool,
}

impl Default for ConstantsConfig {
    fn default() -> Self {
        Self {
            limits: EmulationLimits::default(),
            parallel: false,
            intern_strings: true,
        }
    }
}

impl ConstantsConfig {
    /// Replaces the probe limits
    #[must_use]
    pub fn with_limits(mut self, limits: EmulationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Enables or disables parallel rewriting
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables string interning
    #[must_use]
    pub fn with_intern_strings(mut self, intern_strings: bool) -> Self {
        self.intern_strings = intern_strings;
        self
    }
}

/// One constants protection: its getter, the methods that call it and its data.
#[derive(Debug, Clone)]
pub struct ProtectionInstance {
    /// The injected `Get<T>(int)`
    pub getter: Method,
    /// Methods calling the getter; rewritten in place
    pub consumers: Vec<Method>,
    /// Decompressed constant data
    pub blob: ConstantBlob,
}

/// Indices of the methods in `methods` that call an instantiation of `getter`
#[must_use]
pub fn find_consumers(
    methods: &[Method],
    getter: Token,
    resolver: &dyn MemberResolver,
) -> Vec<usize> {
    methods
        .iter()
        .enumerate()
        .filter(|(_, method)| {
            method
                .instructions
                .iter()
                .any(|instr| is_getter_call(instr, getter, resolver))
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// End-to-end constant recovery.
pub struct ConstantsDecryptor<'a> {
    resolver: &'a dyn MemberResolver,
    config: ConstantsConfig,
    cleaner: Option<&'a dyn ControlFlowCleaner>,
    interner: StringInterner,
}

impl<'a> ConstantsDecryptor<'a> {
    /// Creates a decryptor that resolves call operands through `resolver`
    #[must_use]
    pub fn new(resolver: &'a dyn MemberResolver, config: ConstantsConfig) -> Self {
        ConstantsDecryptor {
            resolver,
            config,
            cleaner: None,
            interner: StringInterner::new(),
        }
    }

    /// Strips the constants control-flow protection with `cleaner` before scanning consumers
    #[must_use]
    pub fn with_cleaner(mut self, cleaner: &'a dyn ControlFlowCleaner) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &ConstantsConfig {
        &self.config
    }

    /// Strings decoded so far, if interning is enabled
    #[must_use]
    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    /// Recovers the constants of one protection instance.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedGetter`] or [`crate::Error::Emulation`] if the getter
    /// cannot be resolved. Call-site failures are reported in the returned [`PatchReport`].
    pub fn process(
        &self,
        getter: &Method,
        consumers: &mut [Method],
        blob: &ConstantBlob,
    ) -> Result<PatchReport> {
        let (mapping, keys) = TagResolver::new(self.resolver)
            .with_limits(self.config.limits)
            .resolve(getter)?;

        let mut patcher = ConstantPatcher::new(getter.token, mapping, keys, blob, self.resolver);
        if self.config.intern_strings {
            patcher = patcher.with_interner(&self.interner);
        }
        if let Some(cleaner) = self.cleaner {
            patcher = patcher.with_cleaner(cleaner);
        }

        let report = patcher.patch_all(consumers, self.config.parallel);
        info!(
            "{getter}: rewrote {} constants ({} strings, {} numbers, {} defaults) \
             in {} methods, {} failed",
            report.rewritten(),
            report.strings,
            report.numbers,
            report.defaults,
            report.methods,
            report.failures.len()
        );
        Ok(report)
    }

    /// Recovers the constants of several protection instances.
    ///
    /// Each instance succeeds or fails on its own; the result at position `i` belongs to
    /// `instances[i]`.
    pub fn process_all(&self, instances: &mut [ProtectionInstance]) -> Vec<Result<PatchReport>> {
        instances
            .iter_mut()
            .map(|instance| {
                let result =
                    self.process(&instance.getter, &mut instance.consumers, &instance.blob);
                if let Err(error) = &result {
                    warn!("Skipping constants of {}: {error}", instance.getter);
                }
                result
            })
            .collect()
    }
}
