//! The traced child process and the state owned on its behalf.

use std::collections::HashMap;

use nix::unistd::Pid;

use crate::breakpoint::Breakpoint;
use crate::dbginfo::DebugInfo;
use crate::errors::Result;
use crate::{get_reg, mem_read_word, Addr, Register, WORD_BYTES};

/// One frame of a frame-pointer backtrace.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pc: Addr,
    pub function: Option<String>,
}

/// The traced child: its pid, the breakpoint table, and the debug
/// information of its executable.
pub struct Debuggee {
    pub(crate) pid: Pid,
    pub(crate) breakpoints: HashMap<Addr, Breakpoint>,
    pub(crate) info: DebugInfo,
}

impl Debuggee {
    pub(crate) fn build(pid: Pid, info: DebugInfo) -> Self {
        Self {
            pid,
            breakpoints: HashMap::new(),
            info,
        }
    }

    /// The caller's return address: the word at `[rbp + 8]`. Valid for
    /// unoptimized code, where `rbp` is the frame pointer.
    pub fn return_addr(&self) -> Result<Addr> {
        let frame_pointer: Addr = get_reg(self.pid, Register::rbp)?.into();
        Ok(mem_read_word(self.pid, frame_pointer + WORD_BYTES)?.into())
    }

    /// Walks the `rbp` chain, resolving each return address to a function
    /// name. Stops after `main`, an unresolvable frame, or 64 frames.
    pub fn backtrace(&self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();

        let pc: Addr = get_reg(self.pid, Register::rip)?.into();
        let mut function = self.info.function_by_addr(pc);
        frames.push(Frame {
            pc,
            function: function.and_then(|f| f.name.clone()),
        });

        let mut frame_pointer: Addr = get_reg(self.pid, Register::rbp)?.into();
        while frames.len() < 64 {
            if function.is_some_and(|f| f.name.as_deref() == Some("main")) {
                break;
            }
            let ret_addr: Addr = mem_read_word(self.pid, frame_pointer + WORD_BYTES)?.into();
            function = self.info.function_by_addr(ret_addr);
            frames.push(Frame {
                pc: ret_addr,
                function: function.and_then(|f| f.name.clone()),
            });
            if function.is_none() {
                break;
            }
            frame_pointer = mem_read_word(self.pid, frame_pointer)?.into();
        }

        Ok(frames)
    }
}
