//! Recovery of ConfuserEx-protected constants.
//!
//! # Key Components
//!
//! - [`constants::TagResolver`] - Learns the tag mapping and keys of a constant getter
//! - [`constants::ConstantPatcher`] - Rewrites getter call sites into literal loads
//! - [`constants::ConstantsDecryptor`] - Runs both for one or more protection instances
//! - [`ControlFlowCleaner`] - Hook for removing the control-flow layer ConfuserEx adds around
//!   constant call sites
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilprobe::deobfuscation::{constants::*, ControlFlowCleaner};
//! use cilprobe::metadata::{MemberTable, Method};
//!
//! struct Unflattener;
//!
//! impl ControlFlowCleaner for Unflattener {
//!     fn is_present(&self, _method: &Method) -> bool {
//!         false
//!     }
//!
//!     fn remove(&self, _method: &mut Method) -> cilprobe::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn load() -> Vec<ProtectionInstance> { unimplemented!() }
//! let members = MemberTable::new();
//! let mut instances = load();
//!
//! let decryptor = ConstantsDecryptor::new(&members, ConstantsConfig::default())
//!     .with_cleaner(&Unflattener);
//! for result in decryptor.process_all(&mut instances) {
//!     match result {
//!         Ok(report) => println!("{} constants restored", report.rewritten()),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod constants;

use crate::{metadata::Method, Result};

/// Removes a control-flow protection from a consumer method.
///
/// ConfuserEx can route constant call sites through a switch-based dispatcher whose state
/// expressions hide the `ldc.i4; call` pairs. A cleaner that knows the dispatcher restores the
/// straight-line form before call sites are scanned. Implementations must be `Sync`: methods
/// may be cleaned on several threads at once, each thread owning a different method.
pub trait ControlFlowCleaner: Sync {
    /// Returns true if `method` carries the protection
    fn is_present(&self, method: &Method) -> bool;

    /// Removes the protection from `method` in place.
    ///
    /// # Errors
    /// Returns an error if the protection cannot be removed; the method is then left alone.
    fn remove(&self, method: &mut Method) -> Result<()>;
}
