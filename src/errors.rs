//! Error types and a result alias used throughout the crate.
//!
//! All fallible operations return [`Result`]. The command dispatcher in
//! [`crate::debugger`] is the only recovery point: everything except a lost
//! tracee is reported there and the loop continues.

use nix::errno::Errno;
use thiserror::Error;

use crate::Addr;

/// Type alias for Results returned by minidbg functions.
pub type Result<T> = std::result::Result<T, DebuggerError>;

/// All error conditions of the debugger core.
#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error("Os error: {0}")]
    Os(#[from] nix::Error),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Executable does not exist: {0}")]
    ExecutableDoesNotExist(String),
    #[error("Executable is not a file: {0}")]
    ExecutableIsNotAFile(String),
    #[error("Could not convert to CString: {0}")]
    CStringConv(#[from] std::ffi::NulError),
    #[error("No debuggee configured")]
    NoDebuggee,
    #[error("Tried to enable breakpoint again")]
    BreakpointIsAlreadyEnabled,
    #[error("Tried to disable breakpoint again")]
    BreakpointIsAlreadyDisabled,
    #[error("Could not parse integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("Malformed argument: {0}")]
    MalformedArgument(String),
    #[error("Unknown register: {0}")]
    UnknownRegister(String),
    #[error("Error while reading the executable file: {0}")]
    Object(#[from] object::Error),
    #[error("Error in the DWARF debug information: {0}")]
    Dwarf(#[from] gimli::Error),
    #[error("DW_AT_high_pc is an offset but the DIE has no DW_AT_low_pc")]
    HighAddrExistsButNotLowAddr,
    #[error("No line entry covers address {0}")]
    NoLineEntry(Addr),
    #[error("The debuggee is currently not in a known function")]
    NotInFunction,
    #[error("No function named {0} in the debug information")]
    NoSuchFunction(String),
    #[error("No statement at {0}:{1} in the debug information")]
    NoSuchSourceLine(String, u64),
    #[error("Tried stepping out of the initial stack frame")]
    StepOutMain,
}

impl DebuggerError {
    /// True when the tracee is gone or inaccessible and the session cannot
    /// continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DebuggerError::Os(Errno::ESRCH | Errno::EPERM))
    }
}
