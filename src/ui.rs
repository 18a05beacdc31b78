//! The seam between the debugger core and a user interface.

use crate::errors::Result;
use crate::feedback::Feedback;
use crate::{Addr, Register, Word};

pub mod cli;

/// One request from the user interface to the debugger core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    DebuggerQuit,
    Continue,
    SetBreakpoint(Addr),
    SetBreakpointAtFunction(String),
    SetBreakpointAtLine(String, u64),
    DelBreakpoint(Addr),
    StepIn,
    StepOver,
    StepOut,
    StepSingle,
    DumpRegisters,
    ReadRegister(Register),
    SetRegister(Register, u64),
    ReadMem(Addr),
    WriteMem(Addr, Word),
    GetSymbolsByName(String),
    Backtrace,
}

/// A user interface: shown the previous command's [`Feedback`], returns the
/// next [`Status`] to execute.
pub trait DebuggerUI {
    fn process(&mut self, feedback: &Feedback) -> Result<Status>;
}
