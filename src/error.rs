use thiserror::Error;

use crate::emulation::EmulationError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - An instruction stream or block view that violates an invariant
/// - [`Error::OutOfBounds`] - A read past the end of the constant blob
/// - [`Error::NotSupported`] - An operation the host collaborator cannot perform
///
/// ## Emulation Errors
/// - [`Error::Emulation`] - A single emulation run failed, see [`EmulationError`]
///
/// ## Constant Recovery Errors
/// - [`Error::MalformedGetter`] - The constant getter does not have the expected shape;
///   fatal for the whole obfuscation instance
/// - [`Error::UnsupportedConstantKind`] - A call site requests a constant kind that cannot be
///   decoded; fatal only for that call site
/// - [`Error::InvalidCallSite`] - A getter call that is not fed by an integer literal
///
/// # Examples
///
/// ```rust
/// use cilprobe::{emulation::EmulationError, Error};
///
/// let err: Error = EmulationError::StackUnderflow { offset: 4 }.into();
/// assert!(matches!(err, Error::Emulation(EmulationError::StackUnderflow { .. })));
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream or block view is damaged.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the constant blob.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The requested operation is not supported by this collaborator.
    #[error("This operation is not supported")]
    NotSupported,

    /// An emulation run failed.
    #[error("Emulation failed - {0}")]
    Emulation(#[from] EmulationError),

    /// The constant getter could not be canonicalized or probed.
    ///
    /// Raised when the getter does not contain exactly three decode blocks, when a key
    /// literal is missing from the prologue, or when probing yields a value that is not
    /// one of the known sentinels.
    #[error("Malformed constant getter - {0}")]
    MalformedGetter(String),

    /// The constant kind requested at a call site cannot be decoded.
    #[error("Unsupported constant kind - {0}")]
    UnsupportedConstantKind(String),

    /// A getter call site does not match the expected `ldc.i4; call` shape.
    #[error("Invalid call site - {0}")]
    InvalidCallSite(String),
}
