// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # cilprobe
//!
//! Emulation-driven recovery of constants hidden by the ConfuserEx constants protection.
//!
//! The protection replaces every literal in a method body with a call to an injected generic
//! getter, `T Get<T>(int id)`. The getter decodes the id with two embedded keys, selects one of
//! four decode paths (string, number, object, default) from the top two bits, and reads the
//! value from an embedded data blob. Which tag value selects which path is randomized per
//! protected assembly.
//!
//! `cilprobe` recovers that mapping without understanding the decode paths: it canonicalizes the
//! getter so that each decode path returns a known sentinel, then probes all four tags with a
//! small stack-machine interpreter. With the mapping and keys in hand, every call site is decoded
//! against the blob and rewritten into a plain literal load.
//!
//! ## Features
//!
//! - **Minimal CIL interpreter** - Closed opcode subset, fails loudly on anything else
//! - **Tag recovery** - Four independent probes over a canonicalized getter
//! - **Call-site rewriting** - `ldc.i4 <id>; call Get<T>` becomes `ldstr`, `ldc.*` or `initobj`
//! - **Partial failure isolation** - One bad call site never aborts the batch
//! - **Parallel rewriting** - Consumer methods can be rewritten concurrently
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilprobe::prelude::*;
//!
//! # fn load() -> (Method, Vec<Method>, Vec<u8>, MemberTable) { unimplemented!() }
//! let (getter, mut consumers, data, members) = load();
//!
//! let decryptor = ConstantsDecryptor::new(&members, ConstantsConfig::default());
//! let report = decryptor.process(&getter, &mut consumers, &ConstantBlob::new(data))?;
//!
//! println!("Rewrote {} call sites", report.rewritten());
//! for failure in &report.failures {
//!     eprintln!("{failure}");
//! }
//! # Ok::<(), cilprobe::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Tokens, type signatures, method bodies and the member resolution seam
//! - [`assembly`] - Instruction model, opcode table and basic block view
//! - [`emulation`] - Execution context, runtime values and the interpreter
//! - [`deobfuscation`] - Tag resolution and call-site patching
//!
//! ## Logging
//!
//! All diagnostics go through the [`log`] facade. The library never installs a logger; binaries
//! pick one (for example `env_logger`).

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// Metadata tokens, type signatures, method bodies and member resolution.
///
/// Reading and writing the binary metadata format is the host's job. This module only defines
/// the view of it that constant recovery needs: a [`metadata::Token`] for every referenced
/// member, a [`metadata::TypeSignature`] for generic arguments, the mutable instruction stream of a
/// [`metadata::Method`], and the [`metadata::MemberResolver`] trait through which call operands
/// are resolved.
pub mod metadata;

/// CIL instructions, opcodes and basic blocks based on ECMA-335
///
/// # Key Types
///
/// - [`assembly::Instruction`] - A single CIL instruction with offset, size and operand
/// - [`assembly::Operand`] - Instruction operands (immediates, tokens, targets)
/// - [`assembly::BasicBlock`] - A sequence of instructions with single entry
///
/// # Main Functions
///
/// - [`assembly::build_blocks`] - Split an instruction stream into basic blocks
/// - [`assembly::remove_dead_blocks`] - Drop blocks unreachable from the entry
/// - [`assembly::flatten_blocks`] - Re-linearize blocks with fresh offsets
/// - [`assembly::renumber_offsets`] - Recompute offsets after structural edits
pub mod assembly;

/// Minimal CIL stack-machine emulation.
///
/// See [`emulation::Interpreter`] for the supported opcode subset.
pub mod emulation;

/// Recovery of ConfuserEx-protected constants.
///
/// See [`deobfuscation::constants::ConstantsDecryptor`] for the end-to-end entry point.
pub mod deobfuscation;

/// `cilprobe` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilprobe` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;
