//! Addresses in the tracee's virtual address space.
//!
//! ptrace wants raw pointers, DWARF hands out `u64`, and the breakpoint
//! table needs a hashable key. [`Addr`] is the single currency all three
//! convert through.

use std::fmt::Display;
use std::ops::{Add, Sub};

use crate::Word;

/// Raw pointer type accepted by the ptrace wrappers.
pub type RawPointer = *mut std::ffi::c_void;

/// An address in the tracee's virtual address space.
#[derive(Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Addr(usize);

impl Addr {
    pub fn usize(self) -> usize {
        self.0
    }

    pub fn u64(self) -> u64 {
        self.0 as u64
    }

    pub fn raw_pointer(self) -> RawPointer {
        self.0 as RawPointer
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl std::fmt::Debug for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Add<usize> for Addr {
    type Output = Self;
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<usize> for Addr {
    type Output = Self;
    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl From<RawPointer> for Addr {
    fn from(value: RawPointer) -> Self {
        Addr(value as usize)
    }
}

impl From<Addr> for RawPointer {
    fn from(value: Addr) -> Self {
        value.0 as RawPointer
    }
}

impl From<usize> for Addr {
    fn from(value: usize) -> Self {
        Addr(value)
    }
}

impl From<u64> for Addr {
    fn from(value: u64) -> Self {
        Addr(value as usize)
    }
}

impl From<Word> for Addr {
    fn from(value: Word) -> Self {
        Addr(value as usize)
    }
}

impl From<Addr> for u64 {
    fn from(value: Addr) -> Self {
        value.0 as u64
    }
}

impl From<Addr> for Word {
    fn from(value: Addr) -> Self {
        value.0 as Word
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_addr_arithmetic() {
        let a = Addr::from(0x1000usize);
        assert_eq!((a + 8).usize(), 0x1008);
        assert_eq!((a - 1).usize(), 0xfff);
    }

    #[test]
    fn test_addr_format() {
        let a = Addr::from(0x1234usize);
        assert_eq!(a.u64(), 0x1234u64);
        assert_eq!(format!("{a}"), "0x0000000000001234");
    }

    #[test]
    fn test_addr_ordering() {
        assert!(Addr::from(0x400000usize) < Addr::from(0x400001usize));
    }
}
