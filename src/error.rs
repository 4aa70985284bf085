use thiserror::Error;

macro_rules! validation_error {
    // Single string version
    ($offset:expr, $msg:expr) => {
        crate::Error::Validation {
            offset: $offset,
            message: $msg.to_string(),
        }
    };

    // Format string with arguments version
    ($offset:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Validation {
            offset: $offset,
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Decompilation Errors
/// - [`Error::Validation`] - Malformed bytecode detected while simulating a block
/// - [`Error::NotImplemented`] - Instruction the decompiler cannot translate
/// - [`Error::RecursionLimit`] - Subroutine nesting exceeded the configured depth
///
/// These three are *recoverable*: the block decompiler substitutes an empty block for the
/// failing block and carries on with the rest of the program. See [`Error::is_recoverable`].
///
/// ## Programming Errors
/// - [`Error::InvalidArgument`] - An internal helper was called with an unsuitable input
///
/// ## Input Errors
/// - [`Error::Pcode`] - A textual pcode listing could not be parsed
/// - [`Error::UndefinedLabel`] / [`Error::DuplicateLabel`] - Label resolution failed
/// - [`Error::InvalidMnemonic`] - Unknown instruction name
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust,no_run
/// use ncsdecomp::{Error, script::{PcodeReader, RoutineTable}};
///
/// let routines = RoutineTable::new();
/// match PcodeReader::from_file("nw_s0_sleep.ncs.pcode".as_ref(), &routines) {
///     Ok(program) => println!("{} instructions", program.instructions().len()),
///     Err(Error::Pcode { line, message }) => eprintln!("line {line}: {message}"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode violates an assumption of the stack simulation.
    ///
    /// Raised for unresolvable jump labels, non-negative stack offsets where a negative one is
    /// required, vector composition from non-float slots, out-of-bounds stack access and similar
    /// malformations.
    ///
    /// # Fields
    ///
    /// * `offset` - Byte offset of the offending instruction
    /// * `message` - Detailed description of what was malformed
    #[error("Validation failed at {offset:08x}: {message}")]
    Validation {
        /// Byte offset of the offending instruction
        offset: u32,
        /// Description of the failure
        message: String,
    },

    /// The instruction is valid bytecode but cannot be decompiled.
    #[error("Cannot decompile instruction {instruction} at {offset:08x}")]
    NotImplemented {
        /// Byte offset of the instruction
        offset: u32,
        /// Mnemonic of the instruction
        instruction: String,
    },

    /// Subroutine calls nested deeper than the configured maximum.
    ///
    /// The associated value is the limit that was exceeded.
    #[error("Reached the maximum call depth allowed - {0}")]
    RecursionLimit(usize),

    /// A helper was invoked with an argument it does not accept.
    ///
    /// This indicates a bug in the caller, not malformed input, and is never recovered from.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A pcode listing contained a malformed line.
    #[error("Pcode line {line}: {message}")]
    Pcode {
        /// 1-based line number within the listing
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// A jump referenced a label that was never defined.
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),

    /// The same label was defined twice.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    /// Unknown instruction mnemonic.
    #[error("Invalid instruction mnemonic: {0}")]
    InvalidMnemonic(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the block decompiler may replace the failing block with an empty one
    /// and continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::NotImplemented { .. } | Error::RecursionLimit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_variants() {
        assert!(validation_error!(13, "bad").is_recoverable());
        assert!(Error::NotImplemented {
            offset: 13,
            instruction: "STORE_STATEALL".to_string()
        }
        .is_recoverable());
        assert!(Error::RecursionLimit(4).is_recoverable());

        assert!(!Error::InvalidArgument("x".to_string()).is_recoverable());
        assert!(!Error::UndefinedLabel("loc_1".to_string()).is_recoverable());
        assert!(!Error::Pcode {
            line: 1,
            message: "x".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn validation_message_formatting() {
        let err = validation_error!(0x2a, "stack underflow by {} frames", 3);
        assert_eq!(
            err.to_string(),
            "Validation failed at 0000002a: stack underflow by 3 frames"
        );
    }
}
