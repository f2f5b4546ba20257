//! Calling conventions.
//!
//! Modeled on `cranelift-codegen`'s `isa::call_conv::CallConv`, but the
//! variants name concrete x86 ABIs (spec §4.4.2: "From the calling
//! convention the node derives: which registers hold arguments 0..N,
//! which registers are callee-saved, the required inbound stack
//! alignment, and the shadow-space or red-zone size") instead of
//! Cranelift's IR-level `fast`/`cold` conventions — there is no backend
//! selection step here, so every variant below is directly encodable.

use crate::isa::registers::{Reg, RegClass};
use crate::isa::registers::{EAX, ECX, EDX, RAX, RCX, RDI, RDX, RSI, R8, R9};
use core::fmt;

/// A calling convention: the ABI contract spec §4.4.2 and the GLOSSARY
/// describe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// SysV x86-64 (Linux, macOS, BSD): integer args in rdi, rsi, rdx,
    /// rcx, r8, r9; 128-byte red zone; no shadow space; 16-byte stack
    /// alignment at the call instruction.
    SystemV64,
    /// Microsoft x64: integer args in rcx, rdx, r8, r9; 32-byte shadow
    /// space the callee may use as scratch without allocating it; no red
    /// zone; 16-byte stack alignment.
    Win64,
    /// 32-bit cdecl: all arguments on the stack, caller cleans up.
    Cdecl,
    /// 32-bit stdcall: all arguments on the stack, callee cleans up.
    Stdcall,
    /// 32-bit fastcall (spec §8 scenario 3's "eight-argument fastcall"
    /// exercises a convention with the first two integer args in
    /// ecx/edx and the rest on the stack).
    Fastcall,
}

impl CallConv {
    /// Integer/pointer argument registers, in order, for this
    /// convention. Arguments beyond this list go on the stack.
    pub fn int_arg_regs(self) -> &'static [Reg] {
        match self {
            CallConv::SystemV64 => &[RDI, RSI, RDX, RCX, R8, R9],
            CallConv::Win64 => &[RCX, RDX, R8, R9],
            CallConv::Fastcall => &[ECX, EDX],
            CallConv::Cdecl | CallConv::Stdcall => &[],
        }
    }

    /// The register the return value is placed in, for an integer or
    /// pointer return type.
    pub fn int_return_reg(self) -> Reg {
        match self {
            CallConv::SystemV64 | CallConv::Win64 => RAX,
            CallConv::Cdecl | CallConv::Stdcall | CallConv::Fastcall => EAX,
        }
    }

    /// Registers the callee must preserve across a call (spec §4.4.4:
    /// "set of callee-saved registers actually clobbered").
    pub fn callee_saved(self) -> &'static [Reg] {
        use crate::isa::registers::{EBP, EBX, EDI, ESI, RBP, RBX, R12, R13, R14, R15};
        match self {
            CallConv::SystemV64 => &[RBX, RBP, R12, R13, R14, R15],
            CallConv::Win64 => {
                use crate::isa::registers::{RDI as W_RDI, RSI as W_RSI};
                &[RBX, RBP, W_RDI, W_RSI, R12, R13, R14, R15]
            }
            CallConv::Cdecl | CallConv::Stdcall | CallConv::Fastcall => &[EBX, EBP, ESI, EDI],
        }
    }

    /// Bytes of scratch space the callee may assume are reserved above
    /// the return address without allocating them itself (Win64 shadow
    /// space). Zero for every other convention.
    pub fn shadow_space_bytes(self) -> u32 {
        match self {
            CallConv::Win64 => 32,
            _ => 0,
        }
    }

    /// Bytes below the stack pointer the callee may use as scratch
    /// without adjusting rsp (the SysV64 red zone). Zero for every other
    /// convention, and zero for any convention once the function makes a
    /// call of its own (the red zone is only safe in leaf functions).
    pub fn red_zone_bytes(self) -> u32 {
        match self {
            CallConv::SystemV64 => 128,
            _ => 0,
        }
    }

    /// Required stack alignment, in bytes, at the point a `call`
    /// instruction executes.
    pub fn call_stack_alignment(self) -> u32 {
        match self {
            CallConv::SystemV64 | CallConv::Win64 => 16,
            CallConv::Cdecl | CallConv::Stdcall | CallConv::Fastcall => 4,
        }
    }

    /// True if the callee is responsible for popping its own stack
    /// arguments (stdcall/fastcall); false if the caller does (cdecl,
    /// and every 64-bit convention where stack args are rare).
    pub fn callee_pops_args(self) -> bool {
        matches!(self, CallConv::Stdcall | CallConv::Fastcall)
    }

    /// Whether this is a 64-bit convention (governs `Mode` compatibility
    /// checks in the Compiler's `FunctionDecl`).
    pub fn is_64bit(self) -> bool {
        matches!(self, CallConv::SystemV64 | CallConv::Win64)
    }

    /// General-purpose register class used for this convention's integer
    /// argument/return registers (`Gpq` for the 64-bit ABIs, `Gpd` for
    /// the 32-bit ones).
    pub fn gpr_class(self) -> RegClass {
        if self.is_64bit() {
            RegClass::Gpq
        } else {
            RegClass::Gpd
        }
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CallConv::SystemV64 => "system_v64",
            CallConv::Win64 => "win64",
            CallConv::Cdecl => "cdecl",
            CallConv::Stdcall => "stdcall",
            CallConv::Fastcall => "fastcall",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systemv_has_six_int_arg_regs() {
        assert_eq!(CallConv::SystemV64.int_arg_regs().len(), 6);
        assert_eq!(CallConv::SystemV64.red_zone_bytes(), 128);
        assert_eq!(CallConv::SystemV64.shadow_space_bytes(), 0);
    }

    #[test]
    fn win64_has_shadow_space_not_red_zone() {
        assert_eq!(CallConv::Win64.shadow_space_bytes(), 32);
        assert_eq!(CallConv::Win64.red_zone_bytes(), 0);
    }

    #[test]
    fn stdcall_and_fastcall_callee_pops() {
        assert!(CallConv::Stdcall.callee_pops_args());
        assert!(CallConv::Fastcall.callee_pops_args());
        assert!(!CallConv::Cdecl.callee_pops_args());
    }
}
