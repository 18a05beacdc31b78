//! # minidbg
//!
//! A source-level debugger for unoptimized x86-64 ELF executables on Linux.
//!
//! The crate is split along the runtime's seams: [`breakpoint`] implements
//! software breakpoints, [`regs`] the register catalog, [`dbginfo`] the
//! DWARF/ELF queries, [`debuggee`] the traced child, and [`debugger`] the
//! command loop that ties them together. User interfaces implement
//! [`ui::DebuggerUI`] and talk to the core through [`ui::Status`] and
//! [`feedback::Feedback`].

use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::errors::Result;

pub mod addr;
pub mod breakpoint;
pub mod consts;
pub mod dbginfo;
pub mod debuggee;
pub mod debugger;
pub mod errors;
pub mod feedback;
pub mod regs;
pub mod source;
pub mod ui;

pub use addr::Addr;
pub use regs::{get_reg, set_reg, Register};

/// The ptrace transfer unit: one word of tracee memory.
pub type Word = i64;

/// Size of a [`Word`] in bytes.
pub const WORD_BYTES: usize = 8;

/// Reads one word of tracee memory at `addr`.
///
/// The tracee must be stopped.
pub fn mem_read_word(pid: Pid, addr: Addr) -> Result<Word> {
    Ok(ptrace::read(pid, addr.raw_pointer())?)
}

/// Writes one word of tracee memory at `addr`.
///
/// The tracee must be stopped.
pub fn mem_write_word(pid: Pid, addr: Addr, value: Word) -> Result<()> {
    Ok(ptrace::write(pid, addr.raw_pointer(), value)?)
}
