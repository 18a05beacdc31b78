//! SIGTRAP `si_code` values, not exposed by nix or the libc bindings.
//!
//! Source: <https://elixir.bootlin.com/linux/v6.13.1/source/include/uapi/asm-generic/siginfo.h#L227>

/// Sent by the kernel, e.g. for the trap raised by an `int3` the kernel
/// itself placed.
pub const SI_KERNEL: i32 = 0x80;

/// Process breakpoint.
pub const TRAP_BRKPT: i32 = 0x1;

/// Process trace trap (single-step completion).
pub const TRAP_TRACE: i32 = 0x2;
