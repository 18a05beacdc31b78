//! Software breakpoints.
//!
//! A breakpoint replaces the first byte of an instruction with `int3`
//! (`0xCC`). ptrace only moves whole words, so enabling peeks the word at
//! the target address, stashes the low byte, and pokes the word back with
//! the low byte swapped for the trap opcode. Disabling restores the saved
//! byte the same way. The upper seven bytes of the word are never touched.

use nix::unistd::Pid;
use tracing::trace;

use crate::errors::{DebuggerError, Result};
use crate::{mem_read_word, mem_write_word, Addr, Word};

/// The `int3` opcode as the low byte of a word.
pub const INT3: Word = 0xcc;
/// The `int3` opcode as a raw byte.
pub const INT3_BYTE: u8 = 0xcc;
/// Mask selecting the low byte of a word.
pub const LOW_BYTE_MASK: Word = 0xff;

/// A software breakpoint over one `(pid, address)` pair.
///
/// Constructed disabled; `saved_data` holds the original instruction byte
/// exactly while the breakpoint is enabled.
#[derive(Debug)]
pub struct Breakpoint {
    addr: Addr,
    pid: Pid,
    saved_data: Option<u8>,
}

impl Breakpoint {
    pub fn new(pid: Pid, addr: Addr) -> Self {
        Self {
            pid,
            addr,
            saved_data: None,
        }
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    pub fn is_enabled(&self) -> bool {
        self.saved_data.is_some()
    }

    /// The original instruction byte, while enabled.
    pub fn saved_data(&self) -> Option<u8> {
        self.saved_data
    }

    /// Writes the trap opcode, saving the displaced byte.
    ///
    /// The tracee must be stopped.
    pub fn enable(&mut self) -> Result<()> {
        if self.saved_data.is_some() {
            return Err(DebuggerError::BreakpointIsAlreadyEnabled);
        }

        let data_word: Word = mem_read_word(self.pid, self.addr)?;
        self.saved_data = Some((data_word & LOW_BYTE_MASK) as u8);
        let data_word_trapped: Word = (data_word & !LOW_BYTE_MASK) | INT3;
        mem_write_word(self.pid, self.addr, data_word_trapped)?;
        trace!("enabled breakpoint at {}", self.addr);

        Ok(())
    }

    /// Restores the original instruction byte.
    ///
    /// The tracee must be stopped.
    pub fn disable(&mut self) -> Result<()> {
        let saved = self
            .saved_data
            .ok_or(DebuggerError::BreakpointIsAlreadyDisabled)?;

        let data_word: Word = mem_read_word(self.pid, self.addr)?;
        let data_word_restored: Word = (data_word & !LOW_BYTE_MASK) | Word::from(saved);
        mem_write_word(self.pid, self.addr, data_word_restored)?;
        self.saved_data = None;
        trace!("disabled breakpoint at {}", self.addr);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_trap_word_math() {
        let word: Word = 0x48c7c03c00000055u64 as Word;
        let trapped = (word & !LOW_BYTE_MASK) | INT3;
        assert_eq!(trapped & LOW_BYTE_MASK, INT3);
        assert_eq!(trapped & !LOW_BYTE_MASK, word & !LOW_BYTE_MASK);

        let saved = (word & LOW_BYTE_MASK) as u8;
        let restored = (trapped & !LOW_BYTE_MASK) | Word::from(saved);
        assert_eq!(restored, word);
    }

    #[test]
    fn test_trap_word_math_negative_word() {
        // high bit set: sign extension must not leak into the upper bytes
        let word: Word = -2;
        let trapped = (word & !LOW_BYTE_MASK) | INT3;
        let saved = (word & LOW_BYTE_MASK) as u8;
        assert_eq!(saved, 0xfe);
        let restored = (trapped & !LOW_BYTE_MASK) | Word::from(saved);
        assert_eq!(restored, word);
    }

    #[test]
    fn test_new_breakpoint_is_disabled() {
        let bp = Breakpoint::new(Pid::from_raw(1), Addr::from(0x400000usize));
        assert!(!bp.is_enabled());
        assert_eq!(bp.saved_data(), None);
        assert_eq!(bp.addr(), Addr::from(0x400000usize));
    }
}
