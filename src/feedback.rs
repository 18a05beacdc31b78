//! Results the debugger core hands back to the user interface.

use std::fmt::Display;

use nix::libc::user_regs_struct;

use crate::dbginfo::Symbol;
use crate::debuggee::Frame;
use crate::errors::DebuggerError;
use crate::regs::REGISTERS;
use crate::{Register, Word};

/// Outcome of one dispatched command, rendered by the UI.
#[derive(Debug)]
pub enum Feedback {
    Ok,
    Error(DebuggerError),
    Exit(i32),
    Registers(Box<user_regs_struct>),
    RegisterValue(Register, u64),
    Word(Word),
    Symbols(Vec<Symbol>),
    Backtrace(Vec<Frame>),
    Text(String),
}

impl Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Ok => write!(f, "Ok")?,
            Feedback::Error(e) => write!(f, "Error: {e}")?,
            Feedback::Exit(code) => write!(f, "Debuggee exited with code {code}")?,
            Feedback::Registers(regs) => {
                // catalog order, 16 hex digits, zero padded
                for descriptor in REGISTERS {
                    writeln!(
                        f,
                        "{:<8} {:#018x}",
                        descriptor.name,
                        descriptor.reg.read_from(regs)
                    )?;
                }
            }
            Feedback::RegisterValue(reg, value) => write!(f, "{reg} {value:#018x}")?,
            Feedback::Word(word) => write!(f, "{word:#018x}")?,
            Feedback::Symbols(symbols) => {
                for symbol in symbols {
                    writeln!(f, "{symbol}")?;
                }
            }
            Feedback::Backtrace(frames) => {
                for (idx, frame) in frames.iter().enumerate() {
                    writeln!(
                        f,
                        "frame #{idx}: {} {}",
                        frame.pc,
                        frame.function.as_deref().unwrap_or("???")
                    )?;
                }
            }
            Feedback::Text(text) => write!(f, "{text}")?,
        }

        Ok(())
    }
}

impl From<std::result::Result<Feedback, DebuggerError>> for Feedback {
    fn from(value: std::result::Result<Feedback, DebuggerError>) -> Self {
        match value {
            Ok(feedback) => feedback,
            Err(e) => Feedback::Error(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_word_formats_as_padded_hex() {
        let fb = Feedback::Word(0x0102030405060708);
        assert_eq!(format!("{fb}"), "0x0102030405060708");
    }

    #[test]
    fn test_register_value_format() {
        let fb = Feedback::RegisterValue(Register::rax, 0xdeadbeef);
        assert_eq!(format!("{fb}"), "rax 0x00000000deadbeef");
    }

    #[test]
    fn test_register_dump_is_catalog_ordered() {
        let mut regs: user_regs_struct = unsafe { std::mem::zeroed() };
        regs.rip = 0x401126;
        let dump = format!("{}", Feedback::Registers(Box::new(regs)));
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), REGISTERS.len());
        assert!(lines[0].starts_with("r15"));
        assert!(dump.contains("rip      0x0000000000401126"));
    }

    #[test]
    fn test_error_feedback_from_result() {
        let fb: Feedback = Err::<Feedback, _>(DebuggerError::NoDebuggee).into();
        assert!(matches!(fb, Feedback::Error(DebuggerError::NoDebuggee)));
    }
}
