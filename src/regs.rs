//! The x86-64 register catalog and ptrace-backed accessors.
//!
//! Registers are addressed through the [`Register`] enum; [`REGISTERS`]
//! carries one descriptor per entry, ordered like the kernel's
//! `user_regs_struct` so a dump always comes out in the same layout. DWARF
//! register numbers follow the System V AMD64 ABI; entries the ABI does not
//! number carry `-1`.

use std::fmt::Display;
use std::str::FromStr;

use nix::libc::user_regs_struct;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::errors::{DebuggerError, Result};

/// A register of the x86-64 `user_regs_struct`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    r15,
    r14,
    r13,
    r12,
    rbp,
    rbx,
    r11,
    r10,
    r9,
    r8,
    rax,
    rcx,
    rdx,
    rsi,
    rdi,
    orig_rax,
    rip,
    cs,
    rflags,
    rsp,
    ss,
    fs_base,
    gs_base,
    ds,
    es,
    fs,
    gs,
}

/// Static metadata for one catalog entry.
pub struct RegDescriptor {
    pub reg: Register,
    pub dwarf_id: i32,
    pub name: &'static str,
}

/// The register catalog, in `user_regs_struct` field order.
pub const REGISTERS: &[RegDescriptor] = &[
    RegDescriptor { reg: Register::r15, dwarf_id: 15, name: "r15" },
    RegDescriptor { reg: Register::r14, dwarf_id: 14, name: "r14" },
    RegDescriptor { reg: Register::r13, dwarf_id: 13, name: "r13" },
    RegDescriptor { reg: Register::r12, dwarf_id: 12, name: "r12" },
    RegDescriptor { reg: Register::rbp, dwarf_id: 6, name: "rbp" },
    RegDescriptor { reg: Register::rbx, dwarf_id: 3, name: "rbx" },
    RegDescriptor { reg: Register::r11, dwarf_id: 11, name: "r11" },
    RegDescriptor { reg: Register::r10, dwarf_id: 10, name: "r10" },
    RegDescriptor { reg: Register::r9, dwarf_id: 9, name: "r9" },
    RegDescriptor { reg: Register::r8, dwarf_id: 8, name: "r8" },
    RegDescriptor { reg: Register::rax, dwarf_id: 0, name: "rax" },
    RegDescriptor { reg: Register::rcx, dwarf_id: 2, name: "rcx" },
    RegDescriptor { reg: Register::rdx, dwarf_id: 1, name: "rdx" },
    RegDescriptor { reg: Register::rsi, dwarf_id: 4, name: "rsi" },
    RegDescriptor { reg: Register::rdi, dwarf_id: 5, name: "rdi" },
    RegDescriptor { reg: Register::orig_rax, dwarf_id: -1, name: "orig_rax" },
    RegDescriptor { reg: Register::rip, dwarf_id: -1, name: "rip" },
    RegDescriptor { reg: Register::cs, dwarf_id: 51, name: "cs" },
    RegDescriptor { reg: Register::rflags, dwarf_id: 49, name: "rflags" },
    RegDescriptor { reg: Register::rsp, dwarf_id: 7, name: "rsp" },
    RegDescriptor { reg: Register::ss, dwarf_id: 52, name: "ss" },
    RegDescriptor { reg: Register::fs_base, dwarf_id: 58, name: "fs_base" },
    RegDescriptor { reg: Register::gs_base, dwarf_id: 59, name: "gs_base" },
    RegDescriptor { reg: Register::ds, dwarf_id: 53, name: "ds" },
    RegDescriptor { reg: Register::es, dwarf_id: 50, name: "es" },
    RegDescriptor { reg: Register::fs, dwarf_id: 54, name: "fs" },
    RegDescriptor { reg: Register::gs, dwarf_id: 55, name: "gs" },
];

impl Register {
    /// Selects this register's field out of a full regs block.
    pub fn read_from(self, regs: &user_regs_struct) -> u64 {
        match self {
            Register::r15 => regs.r15,
            Register::r14 => regs.r14,
            Register::r13 => regs.r13,
            Register::r12 => regs.r12,
            Register::rbp => regs.rbp,
            Register::rbx => regs.rbx,
            Register::r11 => regs.r11,
            Register::r10 => regs.r10,
            Register::r9 => regs.r9,
            Register::r8 => regs.r8,
            Register::rax => regs.rax,
            Register::rcx => regs.rcx,
            Register::rdx => regs.rdx,
            Register::rsi => regs.rsi,
            Register::rdi => regs.rdi,
            Register::orig_rax => regs.orig_rax,
            Register::rip => regs.rip,
            Register::cs => regs.cs,
            Register::rflags => regs.eflags,
            Register::rsp => regs.rsp,
            Register::ss => regs.ss,
            Register::fs_base => regs.fs_base,
            Register::gs_base => regs.gs_base,
            Register::ds => regs.ds,
            Register::es => regs.es,
            Register::fs => regs.fs,
            Register::gs => regs.gs,
        }
    }

    /// Stores `value` into this register's field of a regs block.
    pub fn write_to(self, regs: &mut user_regs_struct, value: u64) {
        match self {
            Register::r15 => regs.r15 = value,
            Register::r14 => regs.r14 = value,
            Register::r13 => regs.r13 = value,
            Register::r12 => regs.r12 = value,
            Register::rbp => regs.rbp = value,
            Register::rbx => regs.rbx = value,
            Register::r11 => regs.r11 = value,
            Register::r10 => regs.r10 = value,
            Register::r9 => regs.r9 = value,
            Register::r8 => regs.r8 = value,
            Register::rax => regs.rax = value,
            Register::rcx => regs.rcx = value,
            Register::rdx => regs.rdx = value,
            Register::rsi => regs.rsi = value,
            Register::rdi => regs.rdi = value,
            Register::orig_rax => regs.orig_rax = value,
            Register::rip => regs.rip = value,
            Register::cs => regs.cs = value,
            Register::rflags => regs.eflags = value,
            Register::rsp => regs.rsp = value,
            Register::ss => regs.ss = value,
            Register::fs_base => regs.fs_base = value,
            Register::gs_base => regs.gs_base = value,
            Register::ds => regs.ds = value,
            Register::es => regs.es = value,
            Register::fs => regs.fs = value,
            Register::gs => regs.gs = value,
        }
    }

    /// The catalog name of this register.
    pub fn name(self) -> &'static str {
        REGISTERS
            .iter()
            .find(|d| d.reg == self)
            .map(|d| d.name)
            .expect("register missing from catalog")
    }
}

impl FromStr for Register {
    type Err = DebuggerError;

    /// Case-sensitive lookup in the catalog.
    fn from_str(s: &str) -> Result<Self> {
        REGISTERS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.reg)
            .ok_or_else(|| DebuggerError::UnknownRegister(s.to_string()))
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reads one register of a stopped tracee.
pub fn get_reg(pid: Pid, r: Register) -> Result<u64> {
    let regs = ptrace::getregs(pid)?;
    Ok(r.read_from(&regs))
}

/// Writes one register of a stopped tracee.
///
/// Full read-modify-write of the regs block; the other fields are carried
/// over unchanged.
pub fn set_reg(pid: Pid, r: Register, value: u64) -> Result<()> {
    let mut regs = ptrace::getregs(pid)?;
    r.write_to(&mut regs, value);
    ptrace::setregs(pid, regs)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::str::FromStr;

    use super::*;

    fn zeroed_regs() -> user_regs_struct {
        // user_regs_struct is a plain C struct of u64 fields
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn test_catalog_names_unique() {
        let names: HashSet<&str> = REGISTERS.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), REGISTERS.len());
    }

    #[test]
    fn test_catalog_contains_required_registers() {
        for required in [
            "rax", "rbx", "rcx", "rdx", "rdi", "rsi", "rbp", "rsp", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15", "rip", "rflags", "cs", "ds", "es", "fs", "gs", "ss",
            "orig_rax", "fs_base", "gs_base",
        ] {
            assert!(
                REGISTERS.iter().any(|d| d.name == required),
                "missing register {required}"
            );
        }
    }

    #[test]
    fn test_name_lookup_roundtrip() {
        for d in REGISTERS {
            assert_eq!(Register::from_str(d.name).unwrap(), d.reg);
            assert_eq!(d.reg.name(), d.name);
        }
    }

    #[test]
    fn test_name_lookup_is_case_sensitive() {
        assert!(Register::from_str("RAX").is_err());
        assert!(Register::from_str("eax").is_err());
    }

    #[test]
    fn test_field_projection_roundtrip() {
        let mut regs = zeroed_regs();
        for (idx, d) in REGISTERS.iter().enumerate() {
            let value = 0xDEAD_0000 + idx as u64;
            d.reg.write_to(&mut regs, value);
            assert_eq!(d.reg.read_from(&regs), value, "register {}", d.name);
        }
        // writes must not clobber neighbouring fields
        assert_eq!(Register::r15.read_from(&regs), 0xDEAD_0000);
    }

    #[test]
    fn test_rflags_maps_to_eflags_field() {
        let mut regs = zeroed_regs();
        Register::rflags.write_to(&mut regs, 0x246);
        assert_eq!(regs.eflags, 0x246);
    }
}
