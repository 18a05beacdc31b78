//! The debugger core: process control, signal dispatch and the stepping
//! commands, driven by a [`DebuggerUI`].

use std::ffi::CString;
use std::path::Path;

use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execv, fork, ForkResult};
use tracing::{debug, error, info, trace, warn};

use crate::breakpoint::Breakpoint;
use crate::consts::{SI_KERNEL, TRAP_BRKPT, TRAP_TRACE};
use crate::dbginfo::{DebugInfo, LineEntry};
use crate::debuggee::Debuggee;
use crate::errors::{DebuggerError, Result};
use crate::feedback::Feedback;
use crate::source::source_context;
use crate::ui::{DebuggerUI, Status};
use crate::{get_reg, mem_read_word, mem_write_word, set_reg, Addr, Register, Word};

/// Lines of surrounding source shown at a stop.
const SOURCE_CONTEXT_LINES: u64 = 2;

/// Why the tracee stopped, classified from the wait status and siginfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopEvent {
    /// A software breakpoint fired; PC points one past the trap byte.
    Breakpoint,
    /// A single step completed.
    StepDone,
    Segfault(i32),
    Other(i32),
}

/// Maps a stop signal to the action the core must take.
fn classify(signo: i32, si_code: i32) -> StopEvent {
    if signo == Signal::SIGTRAP as i32 {
        match si_code {
            SI_KERNEL | TRAP_BRKPT => StopEvent::Breakpoint,
            TRAP_TRACE => StopEvent::StepDone,
            code => {
                warn!("strange SIGTRAP code: {code}");
                StopEvent::StepDone
            }
        }
    } else if signo == Signal::SIGSEGV as i32 {
        StopEvent::Segfault(si_code)
    } else {
        StopEvent::Other(signo)
    }
}

/// The debugger session: one optional tracee plus the UI driving it.
pub struct Debugger<UI: DebuggerUI> {
    pub(crate) debuggee: Option<Debuggee>,
    ui: UI,
}

impl<UI: DebuggerUI> Debugger<UI> {
    pub fn build(ui: UI) -> Self {
        Debugger { debuggee: None, ui }
    }

    fn debuggee(&self) -> Result<&Debuggee> {
        self.debuggee.as_ref().ok_or(DebuggerError::NoDebuggee)
    }

    fn debuggee_mut(&mut self) -> Result<&mut Debuggee> {
        self.debuggee.as_mut().ok_or(DebuggerError::NoDebuggee)
    }

    /// Spawns `path` under tracing and consumes its initial exec stop.
    ///
    /// The child disables ASLR before `execv` so the addresses recorded in
    /// the debug information match the runtime addresses of a non-PIE
    /// executable.
    pub fn launch(&mut self, path: impl AsRef<Path>, args: &[CString]) -> Result<()> {
        let path: &Path = path.as_ref();
        if !path.exists() {
            let err = DebuggerError::ExecutableDoesNotExist(path.to_string_lossy().to_string());
            error!("{err}");
            return Err(err);
        }
        if !path.is_file() {
            let err = DebuggerError::ExecutableIsNotAFile(path.to_string_lossy().to_string());
            error!("{err}");
            return Err(err);
        }

        let raw_data = std::fs::read(path)?;
        let obj = object::File::parse(&*raw_data)?;
        let info = DebugInfo::build(&obj)?;

        match unsafe { fork() }? {
            ForkResult::Parent { child } => {
                self.debuggee = Some(Debuggee::build(child, info));
                match self.wait()? {
                    WaitStatus::Exited(_, code) => {
                        self.debuggee = None;
                        warn!("debuggee exited before the first stop with code {code}");
                        Err(DebuggerError::NoDebuggee)
                    }
                    status => {
                        debug!("initial stop: {status:?}");
                        info!("launched {} as pid {child}", path.display());
                        Ok(())
                    }
                }
            }
            ForkResult::Child => {
                if let Err(e) = personality::set(Persona::ADDR_NO_RANDOMIZE) {
                    eprintln!("could not disable ASLR: {e}");
                }
                ptrace::traceme().inspect_err(|e| eprintln!("error while doing traceme: {e}"))?;
                let cpath = CString::new(path.to_string_lossy().to_string())?;
                let mut argv = vec![cpath.clone()];
                argv.extend_from_slice(args);
                execv(&cpath, &argv)?;
                unreachable!()
            }
        }
    }

    /// The prompt/dispatch loop. Returns when the user quits or the tracee
    /// becomes unreachable.
    pub fn run_debugger(&mut self) -> Result<()> {
        let mut feedback: Feedback = Feedback::Ok;
        loop {
            let status = match self.ui.process(&feedback) {
                Err(e) => {
                    error!("{e}");
                    return Err(e);
                }
                Ok(s) => s,
            };

            let result = match status {
                Status::DebuggerQuit => break,
                Status::Continue => self.cont(),
                Status::SetBreakpoint(addr) => self.set_bp(addr),
                Status::SetBreakpointAtFunction(name) => self.set_bp_at_function(&name),
                Status::SetBreakpointAtLine(file, line) => self.set_bp_at_source_line(&file, line),
                Status::DelBreakpoint(addr) => self.del_bp(addr),
                Status::StepIn => self.step_in(),
                Status::StepOver => self.step_over(),
                Status::StepOut => self.step_out(),
                Status::StepSingle => self.step_single(),
                Status::DumpRegisters => self.dump_regs(),
                Status::ReadRegister(r) => self.read_reg(r),
                Status::SetRegister(r, v) => self.write_reg(r, v),
                Status::ReadMem(addr) => self.read_mem(addr),
                Status::WriteMem(addr, value) => self.write_mem(addr, value),
                Status::GetSymbolsByName(name) => self.get_symbols(&name),
                Status::Backtrace => self.backtrace(),
            };

            feedback = match result {
                Err(e) if e.is_fatal() => {
                    error!("tracee is gone: {e}");
                    return Err(e);
                }
                other => other.into(),
            };

            if let Feedback::Exit(code) = feedback {
                info!("debuggee exited with code {code}");
                self.debuggee = None;
            }
        }

        Ok(())
    }

    /// Blocks until the tracee changes state.
    fn wait(&self) -> Result<WaitStatus> {
        Ok(waitpid(self.debuggee()?.pid, None)?)
    }

    /// Waits for the next stop and dispatches on its cause.
    ///
    /// On a breakpoint trap the PC is rewound onto the trap address, so the
    /// displaced instruction is the next one to execute; without this every
    /// continue past a breakpoint would skip it.
    pub fn wait_signal(&self) -> Result<Feedback> {
        match self.wait()? {
            WaitStatus::Exited(_, exit_code) => {
                return Ok(Feedback::Exit(exit_code));
            }
            WaitStatus::Signaled(_, signal, _) => {
                debug!("debuggee terminated by signal {signal}");
                return Ok(Feedback::Exit(-1));
            }
            status => trace!("stopped: {status:?}"),
        }

        let siginfo = ptrace::getsiginfo(self.debuggee()?.pid)?;
        match classify(siginfo.si_signo, siginfo.si_code) {
            StopEvent::Breakpoint => self.handle_breakpoint_trap()?,
            StopEvent::StepDone => trace!("single step complete"),
            StopEvent::Segfault(si_code) => info!("Segfault: si_code {si_code}"),
            StopEvent::Other(signo) => {
                let name = Signal::try_from(signo)
                    .map(Signal::as_str)
                    .unwrap_or("unknown signal");
                info!("debuggee received {name}");
            }
        }

        Ok(Feedback::Ok)
    }

    fn handle_breakpoint_trap(&self) -> Result<()> {
        let pc = self.get_pc()? - 1;
        self.set_pc(pc)?;
        info!("Hit breakpoint at address {pc}");

        match self.debuggee()?.info.line_entry_by_addr(pc) {
            Ok(entry) => {
                let context = source_context(&entry.file, entry.line, SOURCE_CONTEXT_LINES)?;
                print!("{context}");
            }
            Err(e) => warn!("no source context: {e}"),
        }
        Ok(())
    }

    pub fn get_pc(&self) -> Result<Addr> {
        Ok(get_reg(self.debuggee()?.pid, Register::rip)?.into())
    }

    fn set_pc(&self, pc: Addr) -> Result<()> {
        set_reg(self.debuggee()?.pid, Register::rip, pc.u64())
    }

    fn current_line_entry(&self) -> Result<LineEntry> {
        let pc = self.get_pc()?;
        Ok(self.debuggee()?.info.line_entry_by_addr(pc)?.clone())
    }

    fn atomic_single_step(&self) -> Result<()> {
        ptrace::step(self.debuggee()?.pid, None)?;
        Ok(())
    }

    /// Resumes the tracee until the next signal.
    pub fn cont(&mut self) -> Result<Feedback> {
        let feedback = self.step_over_breakpoint()?;
        if matches!(feedback, Feedback::Exit(_)) {
            return Ok(feedback);
        }
        ptrace::cont(self.debuggee()?.pid, None)?;
        self.wait_signal()
    }

    /// If an enabled breakpoint sits at PC, executes the displaced
    /// instruction transparently: disable, single step, re-enable.
    fn step_over_breakpoint(&mut self) -> Result<Feedback> {
        let here = self.get_pc()?;
        if !self
            .debuggee()?
            .breakpoints
            .get(&here)
            .is_some_and(Breakpoint::is_enabled)
        {
            return Ok(Feedback::Ok);
        }

        trace!("stepping over breakpoint at {here}");
        if let Some(bp) = self.debuggee_mut()?.breakpoints.get_mut(&here) {
            bp.disable()?;
        }
        self.atomic_single_step()?;
        let feedback = self.wait_signal()?;
        if matches!(feedback, Feedback::Exit(_)) {
            return Ok(feedback);
        }
        if let Some(bp) = self.debuggee_mut()?.breakpoints.get_mut(&here) {
            bp.enable()?;
        }

        Ok(Feedback::Ok)
    }

    fn single_step_instruction(&mut self) -> Result<Feedback> {
        self.atomic_single_step()?;
        self.wait_signal()
    }

    fn single_step_with_breakpoint_check(&mut self) -> Result<Feedback> {
        let here = self.get_pc()?;
        if self.debuggee()?.breakpoints.contains_key(&here) {
            self.step_over_breakpoint()
        } else {
            self.single_step_instruction()
        }
    }

    /// `stepi`: one machine instruction, then the source line we landed on.
    pub fn step_single(&mut self) -> Result<Feedback> {
        let feedback = self.single_step_with_breakpoint_check()?;
        if matches!(feedback, Feedback::Exit(_)) {
            return Ok(feedback);
        }

        match self.current_line_entry() {
            Ok(entry) => Ok(Feedback::Text(source_context(
                &entry.file,
                entry.line,
                SOURCE_CONTEXT_LINES,
            )?)),
            Err(e) => {
                warn!("{e}");
                Ok(Feedback::Ok)
            }
        }
    }

    /// `step`: single-step instructions until the source line changes.
    pub fn step_in(&mut self) -> Result<Feedback> {
        let start_line = self.current_line_entry()?.line;

        loop {
            let feedback = self.single_step_with_breakpoint_check()?;
            if matches!(feedback, Feedback::Exit(_)) {
                return Ok(feedback);
            }
            if self.current_line_entry()?.line != start_line {
                break;
            }
        }

        let entry = self.current_line_entry()?;
        Ok(Feedback::Text(source_context(
            &entry.file,
            entry.line,
            SOURCE_CONTEXT_LINES,
        )?))
    }

    /// `next`: runs to the next source line of the current frame.
    ///
    /// Instead of single-stepping through whole calls, this plants
    /// temporary breakpoints on every other line entry of the enclosing
    /// function plus the return address, continues, and removes the
    /// temporaries afterwards.
    pub fn step_over(&mut self) -> Result<Feedback> {
        let pc = self.get_pc()?;
        let (func_low, func_high) = {
            let function = self
                .debuggee()?
                .info
                .function_by_addr(pc)
                .ok_or(DebuggerError::NotInFunction)?;
            match (function.low_pc, function.high_pc) {
                (Some(low), Some(high)) => (low, high),
                _ => return Err(DebuggerError::NotInFunction),
            }
        };
        let start_entry_addr = self.current_line_entry()?.addr;

        let candidates: Vec<Addr> = self
            .debuggee()?
            .info
            .units()
            .iter()
            .flat_map(|unit| &unit.lines)
            .filter(|e| func_low <= e.addr && e.addr < func_high)
            .map(|e| e.addr)
            .filter(|addr| *addr != start_entry_addr)
            .collect();

        let mut temporaries: Vec<Addr> = Vec::new();
        for addr in candidates {
            if self.debuggee()?.breakpoints.contains_key(&addr) {
                continue;
            }
            self.install_bp(addr)?;
            temporaries.push(addr);
        }
        let return_addr = self.debuggee()?.return_addr()?;
        if !self.debuggee()?.breakpoints.contains_key(&return_addr) {
            self.install_bp(return_addr)?;
            temporaries.push(return_addr);
        }

        let feedback = self.cont()?;
        if matches!(feedback, Feedback::Exit(_)) {
            return Ok(feedback);
        }
        for addr in temporaries {
            self.remove_bp(addr)?;
        }

        Ok(feedback)
    }

    /// `finish`: runs until the current function returns.
    pub fn step_out(&mut self) -> Result<Feedback> {
        {
            let pc = self.get_pc()?;
            match self.debuggee()?.info.function_by_addr(pc) {
                Some(f) if f.name.as_deref() == Some("main") => {
                    return Err(DebuggerError::StepOutMain);
                }
                Some(_) => (),
                None => warn!("no debug symbol for the current address"),
            }
        }

        let return_addr = self.debuggee()?.return_addr()?;
        trace!("return address: {return_addr}");
        let should_remove = !self.debuggee()?.breakpoints.contains_key(&return_addr);
        if should_remove {
            self.install_bp(return_addr)?;
        }

        let feedback = self.cont()?;
        if should_remove && !matches!(feedback, Feedback::Exit(_)) {
            self.remove_bp(return_addr)?;
        }

        Ok(feedback)
    }

    /// Installs an enabled breakpoint, leaving any existing entry at the
    /// same address intact.
    fn install_bp(&mut self, addr: Addr) -> Result<()> {
        let dbge = self.debuggee_mut()?;
        if dbge.breakpoints.contains_key(&addr) {
            return Ok(());
        }
        let mut bp = Breakpoint::new(dbge.pid, addr);
        bp.enable()?;
        dbge.breakpoints.insert(addr, bp);
        Ok(())
    }

    fn remove_bp(&mut self, addr: Addr) -> Result<()> {
        let dbge = self.debuggee_mut()?;
        if let Some(mut bp) = dbge.breakpoints.remove(&addr) {
            if bp.is_enabled() {
                bp.disable()?;
            }
        } else {
            warn!("removed a breakpoint at {addr} that did not exist");
        }
        Ok(())
    }

    pub fn set_bp(&mut self, addr: Addr) -> Result<Feedback> {
        self.install_bp(addr)?;
        info!("Set breakpoint at address {addr}");
        Ok(Feedback::Ok)
    }

    pub fn set_bp_at_function(&mut self, name: &str) -> Result<Feedback> {
        let addrs = self.debuggee()?.info.function_entry_addrs(name);
        if addrs.is_empty() {
            return Err(DebuggerError::NoSuchFunction(name.to_string()));
        }
        for addr in addrs {
            self.set_bp(addr)?;
        }
        Ok(Feedback::Ok)
    }

    pub fn set_bp_at_source_line(&mut self, file: &str, line: u64) -> Result<Feedback> {
        let addr = {
            let info = &self.debuggee()?.info;
            info.line_entry_for_line(file, line)
                .or_else(|| info.line_entry_for_line_suffix(file, line))
                .map(|e| e.addr)
        };
        match addr {
            Some(addr) => self.set_bp(addr),
            None => Err(DebuggerError::NoSuchSourceLine(file.to_string(), line)),
        }
    }

    pub fn del_bp(&mut self, addr: Addr) -> Result<Feedback> {
        self.remove_bp(addr)?;
        Ok(Feedback::Ok)
    }

    pub fn dump_regs(&self) -> Result<Feedback> {
        let regs = ptrace::getregs(self.debuggee()?.pid)?;
        Ok(Feedback::Registers(Box::new(regs)))
    }

    pub fn read_reg(&self, r: Register) -> Result<Feedback> {
        Ok(Feedback::RegisterValue(r, get_reg(self.debuggee()?.pid, r)?))
    }

    pub fn write_reg(&self, r: Register, value: u64) -> Result<Feedback> {
        set_reg(self.debuggee()?.pid, r, value)?;
        Ok(Feedback::Ok)
    }

    pub fn read_mem(&self, addr: Addr) -> Result<Feedback> {
        let word = mem_read_word(self.debuggee()?.pid, addr)?;
        Ok(Feedback::Word(word))
    }

    pub fn write_mem(&self, addr: Addr, value: Word) -> Result<Feedback> {
        mem_write_word(self.debuggee()?.pid, addr, value)?;
        Ok(Feedback::Ok)
    }

    pub fn get_symbols(&self, name: &str) -> Result<Feedback> {
        Ok(Feedback::Symbols(self.debuggee()?.info.symbols_by_name(name)))
    }

    pub fn backtrace(&self) -> Result<Feedback> {
        Ok(Feedback::Backtrace(self.debuggee()?.backtrace()?))
    }
}
