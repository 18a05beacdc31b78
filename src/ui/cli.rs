//! Interactive command-line front-end.
//!
//! Reads one line per command, tokenizes on whitespace, and prefix-matches
//! the first token against the canonical command names, so `c` means
//! `continue` and `br` means `break`. Subcommand checks are nested inside
//! their command branch; a command never falls through into another
//! handler. Parse failures are reported and the prompt is shown again; only
//! a complete command reaches the debugger core.

use std::str::FromStr;

use dialoguer::theme::Theme;
use dialoguer::BasicHistory;
use tracing::{error, trace, warn};

use super::{DebuggerUI, Status};
use crate::errors::{DebuggerError, Result};
use crate::feedback::Feedback;
use crate::{Addr, Register, Word};

/// Renders the prompt as a bare `minidbg> `, without the decorations the
/// stock dialoguer themes add.
struct PromptTheme;

impl Theme for PromptTheme {
    fn format_input_prompt(
        &self,
        f: &mut dyn std::fmt::Write,
        prompt: &str,
        _default: Option<&str>,
    ) -> std::fmt::Result {
        write!(f, "{prompt} ")
    }

    fn format_input_prompt_selection(
        &self,
        f: &mut dyn std::fmt::Write,
        prompt: &str,
        selection: &str,
    ) -> std::fmt::Result {
        write!(f, "{prompt} {selection}")
    }
}

pub struct CliUi {
    buf: String,
    buf_preparsed: Vec<String>,
    history: BasicHistory,
}

impl CliUi {
    pub fn build() -> Self {
        CliUi {
            buf: String::new(),
            buf_preparsed: Vec::new(),
            history: BasicHistory::new(),
        }
    }

    /// Reads and tokenizes one prompt line. `false` means end of input.
    fn get_input(&mut self) -> bool {
        // the prompt belongs on stdout, not dialoguer's default stderr
        let line = dialoguer::Input::with_theme(&PromptTheme)
            .with_prompt("minidbg>")
            .history_with(&mut self.history)
            .interact_text_on(&dialoguer::console::Term::stdout());
        match line {
            Ok(l) => self.buf = l,
            Err(e) => {
                trace!("input ended: {e}");
                return false;
            }
        }
        self.buf_preparsed = self.buf.split_whitespace().map(str::to_string).collect();
        trace!("preparsed: {:?}", self.buf_preparsed);
        true
    }

    /// The `n`-th token, or `MalformedArgument` when the command is too
    /// short.
    fn arg(&self, n: usize) -> Result<&str> {
        self.buf_preparsed.get(n).map(String::as_str).ok_or_else(|| {
            DebuggerError::MalformedArgument(format!("'{}' needs more arguments", self.buf.trim()))
        })
    }

    /// Parses the tokenized line. `Ok(None)` means an unknown command was
    /// already reported.
    fn parse(&self) -> Result<Option<Status>> {
        let command = self.arg(0)?;

        let status = if is_prefix(command, "continue") {
            Status::Continue
        } else if is_prefix(command, "break") {
            let target = self.arg(1)?;
            if target.starts_with("0x") {
                Status::SetBreakpoint(parse_addr(target)?)
            } else if let Some((file, line)) = target.rsplit_once(':') {
                Status::SetBreakpointAtLine(file.to_string(), line.parse()?)
            } else {
                Status::SetBreakpointAtFunction(target.to_string())
            }
        } else if is_prefix(command, "delete") {
            Status::DelBreakpoint(parse_addr(self.arg(1)?)?)
        } else if is_prefix(command, "step") {
            Status::StepIn
        } else if is_prefix(command, "next") {
            Status::StepOver
        } else if is_prefix(command, "finish") {
            Status::StepOut
        } else if is_prefix(command, "register") {
            match self.arg(1)? {
                "dump" => Status::DumpRegisters,
                "read" => Status::ReadRegister(Register::from_str(self.arg(2)?)?),
                "write" => {
                    let register = Register::from_str(self.arg(2)?)?;
                    let value = parse_hex(self.arg(3)?)?;
                    Status::SetRegister(register, value)
                }
                other => {
                    return Err(DebuggerError::MalformedArgument(format!(
                        "register subcommand must be dump, read or write, not '{other}'"
                    )))
                }
            }
        } else if is_prefix(command, "memory") {
            match self.arg(1)? {
                "read" => Status::ReadMem(parse_addr(self.arg(2)?)?),
                "write" => {
                    let addr = parse_addr(self.arg(2)?)?;
                    let value = parse_hex(self.arg(3)?)? as Word;
                    Status::WriteMem(addr, value)
                }
                other => {
                    return Err(DebuggerError::MalformedArgument(format!(
                        "memory subcommand must be read or write, not '{other}'"
                    )))
                }
            }
        } else if is_prefix(command, "symbol") {
            Status::GetSymbolsByName(self.arg(1)?.to_string())
        } else if is_prefix(command, "backtrace") {
            Status::Backtrace
        } else if is_prefix(command, "stepi") {
            Status::StepSingle
        } else if is_prefix(command, "quit") {
            Status::DebuggerQuit
        } else {
            eprintln!("Unknown command");
            return Ok(None);
        };

        Ok(Some(status))
    }
}

impl DebuggerUI for CliUi {
    fn process(&mut self, feedback: &Feedback) -> Result<Status> {
        match feedback {
            Feedback::Ok => (),
            Feedback::Error(e) => warn!("{e}"),
            // these render with their own trailing newline
            multiline @ (Feedback::Text(_)
            | Feedback::Registers(_)
            | Feedback::Symbols(_)
            | Feedback::Backtrace(_)) => print!("{multiline}"),
            other => println!("{other}"),
        }

        loop {
            if !self.get_input() {
                return Ok(Status::DebuggerQuit);
            }
            if self.buf_preparsed.is_empty() {
                continue;
            }
            match self.parse() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => (),
                Err(e) => error!("{e}"),
            }
        }
    }
}

/// Whether `token` is a (non-empty) prefix of the canonical command `of`.
fn is_prefix(token: &str, of: &str) -> bool {
    !token.is_empty() && of.starts_with(token)
}

/// Parses a `0x`-prefixed hex number; exactly the first two characters are
/// skipped before conversion.
fn parse_hex(raw: &str) -> Result<u64> {
    let digits = raw.strip_prefix("0x").ok_or_else(|| {
        DebuggerError::MalformedArgument(format!("expected a 0x-prefixed hex number, got '{raw}'"))
    })?;
    Ok(u64::from_str_radix(digits, 16)?)
}

fn parse_addr(raw: &str) -> Result<Addr> {
    Ok(Addr::from(parse_hex(raw)? as usize))
}

#[cfg(test)]
mod test {
    use super::*;

    fn ui_with(line: &str) -> CliUi {
        let mut ui = CliUi::build();
        ui.buf = line.to_string();
        ui.buf_preparsed = line.split_whitespace().map(str::to_string).collect();
        ui
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x19").unwrap(), 0x19);
        assert_eq!(parse_hex("0x00019").unwrap(), 0x19);
        assert_eq!(parse_hex("0xdeadbeef").unwrap(), 0xdead_beef);
        assert!(parse_hex("19").is_err());
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn test_prefix_dispatch() {
        assert_eq!(ui_with("c").parse().unwrap(), Some(Status::Continue));
        assert_eq!(ui_with("continue").parse().unwrap(), Some(Status::Continue));
        assert_eq!(ui_with("s").parse().unwrap(), Some(Status::StepIn));
        assert_eq!(ui_with("step").parse().unwrap(), Some(Status::StepIn));
        assert_eq!(ui_with("stepi").parse().unwrap(), Some(Status::StepSingle));
        assert_eq!(ui_with("n").parse().unwrap(), Some(Status::StepOver));
        assert_eq!(ui_with("f").parse().unwrap(), Some(Status::StepOut));
        assert_eq!(ui_with("ba").parse().unwrap(), Some(Status::Backtrace));
        assert_eq!(ui_with("q").parse().unwrap(), Some(Status::DebuggerQuit));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(ui_with("flurble").parse().unwrap(), None);
    }

    #[test]
    fn test_break_forms() {
        assert_eq!(
            ui_with("break 0x401126").parse().unwrap(),
            Some(Status::SetBreakpoint(Addr::from(0x401126usize)))
        );
        assert_eq!(
            ui_with("b hello.c:5").parse().unwrap(),
            Some(Status::SetBreakpointAtLine("hello.c".to_string(), 5))
        );
        assert_eq!(
            ui_with("br main").parse().unwrap(),
            Some(Status::SetBreakpointAtFunction("main".to_string()))
        );
        assert!(ui_with("break").parse().is_err());
        assert!(ui_with("break hello.c:x").parse().is_err());
    }

    #[test]
    fn test_register_subcommands() {
        assert_eq!(
            ui_with("register dump").parse().unwrap(),
            Some(Status::DumpRegisters)
        );
        assert_eq!(
            ui_with("register read rax").parse().unwrap(),
            Some(Status::ReadRegister(Register::rax))
        );
        assert_eq!(
            ui_with("register write rax 0xdeadbeef").parse().unwrap(),
            Some(Status::SetRegister(Register::rax, 0xdead_beef))
        );
        assert!(ui_with("register").parse().is_err());
        assert!(ui_with("register write rax").parse().is_err());
        assert!(ui_with("register read raxx").parse().is_err());
        // subcommands do not leak across commands
        assert!(ui_with("register flurble").parse().is_err());
    }

    #[test]
    fn test_memory_subcommands() {
        assert_eq!(
            ui_with("memory read 0x401000").parse().unwrap(),
            Some(Status::ReadMem(Addr::from(0x401000usize)))
        );
        assert_eq!(
            ui_with("memory write 0x401000 0x0102030405060708")
                .parse()
                .unwrap(),
            Some(Status::WriteMem(
                Addr::from(0x401000usize),
                0x0102030405060708
            ))
        );
        assert!(ui_with("memory peek 0x401000").parse().is_err());
        assert!(ui_with("memory read 401000").parse().is_err());
    }

    #[test]
    fn test_symbol_and_delete() {
        assert_eq!(
            ui_with("symbol main").parse().unwrap(),
            Some(Status::GetSymbolsByName("main".to_string()))
        );
        assert_eq!(
            ui_with("delete 0x401126").parse().unwrap(),
            Some(Status::DelBreakpoint(Addr::from(0x401126usize)))
        );
        assert!(ui_with("symbol").parse().is_err());
    }
}
