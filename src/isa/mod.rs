//! Target-specific data: register banks, calling conventions, and the
//! addressing mode. Unlike `cranelift-codegen`'s `isa` module this crate
//! targets exactly one architecture family (x86/x86-64), so there is no
//! `TargetIsa` trait object to select between backends — `Mode` merely
//! toggles between the 32-bit and 64-bit encodings of that one family.

pub mod call_conv;
pub mod registers;

pub use call_conv::CallConv;
pub use registers::{Reg, RegClass};

/// Addressing width asmjit is encoding for. Spec §1: "x86/x86-64 ... on
/// little-endian hosts" — no other targets are in scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    /// 32-bit protected mode: no REX prefixes, no r8-r15/xmm8-xmm15,
    /// 4-byte GPRs.
    X86,
    /// 64-bit long mode: REX prefixes available, 16 GPRs, RIP-relative
    /// addressing available.
    X64,
}

impl Mode {
    /// True if REX prefixes and the extended register file exist.
    pub fn is_64bit(self) -> bool {
        matches!(self, Mode::X64)
    }
}
