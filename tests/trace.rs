//! Integration tests against a real traced child.
//!
//! Each test forks `/bin/true` under `PTRACE_TRACEME`, works on it while it
//! is stopped at its initial exec trap, and kills it before returning. The
//! child is never resumed, so nothing here depends on what the executable
//! would do.

use std::ffi::CString;

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execv, fork, ForkResult, Pid};

use minidbg::breakpoint::{Breakpoint, INT3_BYTE};
use minidbg::errors::DebuggerError;
use minidbg::{get_reg, mem_read_word, mem_write_word, set_reg, Addr, Register, Word};

const TRACEE_PATH: &str = "/bin/true";

fn spawn_traced() -> Pid {
    match unsafe { fork() }.expect("fork failed") {
        ForkResult::Parent { child } => {
            let status = waitpid(child, None).expect("waitpid failed");
            assert!(
                matches!(status, WaitStatus::Stopped(_, Signal::SIGTRAP)),
                "unexpected initial stop: {status:?}"
            );
            child
        }
        ForkResult::Child => {
            ptrace::traceme().expect("traceme failed");
            let path = CString::new(TRACEE_PATH).unwrap();
            let _ = execv(&path, &[path.as_ref()]);
            // only reached when exec failed
            std::process::exit(127);
        }
    }
}

fn kill_traced(pid: Pid) {
    ptrace::kill(pid).expect("could not kill tracee");
    let status = waitpid(pid, None).expect("waitpid after kill failed");
    assert!(matches!(status, WaitStatus::Signaled(_, Signal::SIGKILL, _)));
}

#[test]
fn test_register_roundtrip() {
    let pid = spawn_traced();

    set_reg(pid, Register::rax, 0xdead_beef).unwrap();
    assert_eq!(get_reg(pid, Register::rax).unwrap(), 0xdead_beef);

    // a full 64-bit value survives the round trip
    set_reg(pid, Register::r15, 0x0102_0304_0506_0708).unwrap();
    assert_eq!(get_reg(pid, Register::r15).unwrap(), 0x0102_0304_0506_0708);

    // writing one register leaves the others alone
    assert_eq!(get_reg(pid, Register::rax).unwrap(), 0xdead_beef);

    kill_traced(pid);
}

#[test]
fn test_pc_is_mapped_code() {
    let pid = spawn_traced();

    let pc = get_reg(pid, Register::rip).unwrap();
    assert_ne!(pc, 0);
    // the word at PC must be readable
    mem_read_word(pid, Addr::from(pc)).unwrap();

    kill_traced(pid);
}

#[test]
fn test_memory_roundtrip_on_stack() {
    let pid = spawn_traced();

    let rsp: Addr = get_reg(pid, Register::rsp).unwrap().into();
    let value: Word = 0x0102_0304_0506_0708;
    mem_write_word(pid, rsp, value).unwrap();
    assert_eq!(mem_read_word(pid, rsp).unwrap(), value);

    kill_traced(pid);
}

#[test]
fn test_breakpoint_swaps_and_restores_one_byte() {
    let pid = spawn_traced();

    let pc: Addr = get_reg(pid, Register::rip).unwrap().into();
    let original = mem_read_word(pid, pc).unwrap();

    let mut bp = Breakpoint::new(pid, pc);
    bp.enable().unwrap();
    assert!(bp.is_enabled());
    assert_eq!(bp.saved_data(), Some((original & 0xff) as u8));

    let trapped = mem_read_word(pid, pc).unwrap();
    assert_eq!((trapped & 0xff) as u8, INT3_BYTE);
    // the upper seven bytes are untouched
    assert_eq!(trapped & !0xff, original & !0xff);

    bp.disable().unwrap();
    assert!(!bp.is_enabled());
    assert_eq!(mem_read_word(pid, pc).unwrap(), original);

    kill_traced(pid);
}

#[test]
fn test_breakpoint_double_enable_and_disable_fail() {
    let pid = spawn_traced();

    let pc: Addr = get_reg(pid, Register::rip).unwrap().into();
    let mut bp = Breakpoint::new(pid, pc);

    assert!(matches!(
        bp.disable(),
        Err(DebuggerError::BreakpointIsAlreadyDisabled)
    ));

    bp.enable().unwrap();
    assert!(matches!(
        bp.enable(),
        Err(DebuggerError::BreakpointIsAlreadyEnabled)
    ));

    bp.disable().unwrap();
    kill_traced(pid);
}

#[test]
fn test_enable_disable_cycle_is_idempotent() {
    let pid = spawn_traced();

    let pc: Addr = get_reg(pid, Register::rip).unwrap().into();
    let original = mem_read_word(pid, pc).unwrap();

    let mut bp = Breakpoint::new(pid, pc);
    for _ in 0..3 {
        bp.enable().unwrap();
        bp.disable().unwrap();
    }
    assert_eq!(mem_read_word(pid, pc).unwrap(), original);

    kill_traced(pid);
}

#[test]
fn test_registers_gone_after_exit() {
    let pid = spawn_traced();
    kill_traced(pid);

    let err = get_reg(pid, Register::rax).unwrap_err();
    assert!(err.is_fatal(), "expected a fatal error, got {err}");
}
