//! Architectural registers.
//!
//! Modeled on `cranelift-codegen`'s `isa::registers` (register units,
//! register banks) but specialized: rather than a generic multi-ISA
//! register-class table generated from a meta DSL, a dedicated x86/x86-64
//! encoder can just enumerate the handful of real register files spec §3
//! names. `RegClass` is the "type tag" from the spec's Operand model;
//! `Reg` pairs a class with the 0..15 index that, together, uniquely
//! identify an architectural register (spec §3 invariant).

use core::fmt;

/// The type tag of a [`Reg`] — spec §3: "a type tag chosen from
/// {byte-low, byte-high, word, dword, qword, x87-stack, mmx-64,
/// xmm-128, segment, control, debug}". The tag determines operand size
/// and which opcode/prefix family an instruction form uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    /// AL/CL/DL/BL and, with REX, SPL/BPL/SIL/DIL, R8B..R15B. 1 byte.
    GpbLo,
    /// AH/CH/DH/BH. 1 byte. Disjoint from the REX byte registers: an
    /// instruction that mixes a high-byte register with any operand that
    /// forces a REX prefix is an encoding error (spec §3).
    GpbHi,
    /// AX..R15W. 2 bytes.
    Gpw,
    /// EAX..R15D. 4 bytes.
    Gpd,
    /// RAX..R15. 8 bytes, 64-bit mode only.
    Gpq,
    /// ST(0)..ST(7). x87 FPU stack.
    Fp,
    /// MM0..MM7. 64-bit MMX.
    Mm,
    /// XMM0..XMM15. 128-bit SSE.
    Xmm,
    /// ES/CS/SS/DS/FS/GS.
    Segment,
    /// CR0, CR2..CR4, CR8.
    Control,
    /// DR0..DR7.
    Debug,
}

impl RegClass {
    /// Size in bytes of a value held in this class's default operand
    /// size (spec §3: "the type tag determines operand size").
    pub fn size_bytes(self) -> u8 {
        match self {
            RegClass::GpbLo | RegClass::GpbHi => 1,
            RegClass::Gpw => 2,
            RegClass::Gpd => 4,
            RegClass::Gpq | RegClass::Mm | RegClass::Fp => 8,
            RegClass::Xmm => 16,
            RegClass::Segment | RegClass::Control | RegClass::Debug => 8,
        }
    }

    /// True for the four classes that participate in general-purpose
    /// integer arithmetic and addressing (can appear as a memory base or
    /// index).
    pub fn is_gpr(self) -> bool {
        matches!(
            self,
            RegClass::GpbLo | RegClass::GpbHi | RegClass::Gpw | RegClass::Gpd | RegClass::Gpq
        )
    }

    /// True for the byte classes, which is where the AH/CH/DH/BH vs.
    /// SPL/BPL/SIL/DIL ambiguity (spec §3) lives.
    pub fn is_byte(self) -> bool {
        matches!(self, RegClass::GpbLo | RegClass::GpbHi)
    }

    /// Requires a 64-bit operand-size REX.W the way `RegClass::Gpq` does.
    pub fn needs_rex_w(self) -> bool {
        matches!(self, RegClass::Gpq)
    }
}

/// A single architectural register: a class (determines size and
/// encoding family) plus an index in `0..16` (spec §3 invariant: "A
/// Register's index combined with its type uniquely identifies an
/// architectural register").
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reg {
    class: RegClass,
    index: u8,
}

impl Reg {
    /// Builds a register reference. `index` must be `< 16`; callers
    /// within this crate only ever construct `Reg` from the named
    /// constants below or from a decoded ModR/M field, both of which are
    /// already in range.
    pub const fn new(class: RegClass, index: u8) -> Self {
        Reg { class, index }
    }

    /// The register's class (operand size and encoding family).
    pub fn class(self) -> RegClass {
        self.class
    }

    /// The 0..15 index within the class.
    pub fn index(self) -> u8 {
        self.index
    }

    /// True if this register can only be encoded with a REX prefix
    /// present (index 8..15, or a byte-low register with index 4..7
    /// which forces REX to select SPL/BPL/SIL/DIL over AH/CH/DH/BH).
    pub fn requires_rex(self) -> bool {
        self.index >= 8 || (self.class == RegClass::GpbLo && self.index >= 4)
    }

    /// True if this is one of the legacy high-byte registers that cannot
    /// coexist with a REX prefix in the same instruction (spec §3).
    pub fn is_high_byte(self) -> bool {
        self.class == RegClass::GpbHi
    }

    /// The 3-bit field used in ModR/M.reg, ModR/M.rm, or SIB.base/index
    /// (the low 3 bits of the index; bit 3 becomes a REX extension bit).
    pub fn rm_bits(self) -> u8 {
        self.index & 0x7
    }

    /// The REX extension bit for this register (bit 3 of the index).
    pub fn rex_bit(self) -> bool {
        self.index & 0x8 != 0
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const GPB_LO: [&str; 16] = [
            "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b",
            "r12b", "r13b", "r14b", "r15b",
        ];
        const GPB_HI: [&str; 4] = ["ah", "ch", "dh", "bh"];
        const GPW: [&str; 16] = [
            "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w",
            "r13w", "r14w", "r15w",
        ];
        const GPD: [&str; 16] = [
            "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
            "r12d", "r13d", "r14d", "r15d",
        ];
        const GPQ: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        let i = self.index as usize;
        match self.class {
            RegClass::GpbLo => write!(f, "{}", GPB_LO[i]),
            RegClass::GpbHi => write!(f, "{}", GPB_HI[i]),
            RegClass::Gpw => write!(f, "{}", GPW[i]),
            RegClass::Gpd => write!(f, "{}", GPD[i]),
            RegClass::Gpq => write!(f, "{}", GPQ[i]),
            RegClass::Fp => write!(f, "st{}", i),
            RegClass::Mm => write!(f, "mm{}", i),
            RegClass::Xmm => write!(f, "xmm{}", i),
            RegClass::Segment => write!(f, "seg{}", i),
            RegClass::Control => write!(f, "cr{}", i),
            RegClass::Debug => write!(f, "dr{}", i),
        }
    }
}

macro_rules! gpr_constants {
    ($class:ident, $($name:ident = $idx:expr),* $(,)?) => {
        $(
            #[allow(missing_docs)]
            pub const $name: Reg = Reg::new(RegClass::$class, $idx);
        )*
    };
}

gpr_constants!(Gpq, RAX = 0, RCX = 1, RDX = 2, RBX = 3, RSP = 4, RBP = 5, RSI = 6, RDI = 7,
    R8 = 8, R9 = 9, R10 = 10, R11 = 11, R12 = 12, R13 = 13, R14 = 14, R15 = 15);
gpr_constants!(Gpd, EAX = 0, ECX = 1, EDX = 2, EBX = 3, ESP = 4, EBP = 5, ESI = 6, EDI = 7);
gpr_constants!(Gpw, AX = 0, CX = 1, DX = 2, BX = 3, SP = 4, BP = 5, SI = 6, DI = 7);
gpr_constants!(GpbLo, AL = 0, CL = 1, DL = 2, BL = 3, SPL = 4, BPL = 5, SIL = 6, DIL = 7);
gpr_constants!(GpbHi, AH = 0, CH = 1, DH = 2, BH = 3);
gpr_constants!(Xmm, XMM0 = 0, XMM1 = 1, XMM2 = 2, XMM3 = 3, XMM4 = 4, XMM5 = 5, XMM6 = 6, XMM7 = 7,
    XMM8 = 8, XMM9 = 9, XMM10 = 10, XMM11 = 11, XMM12 = 12, XMM13 = 13, XMM14 = 14, XMM15 = 15);
gpr_constants!(Mm, MM0 = 0, MM1 = 1, MM2 = 2, MM3 = 3, MM4 = 4, MM5 = 5, MM6 = 6, MM7 = 7);
gpr_constants!(Fp, ST0 = 0, ST1 = 1, ST2 = 2, ST3 = 3, ST4 = 4, ST5 = 5, ST6 = 6, ST7 = 7);
gpr_constants!(Segment, ES = 0, CS = 1, SS = 2, DS = 3, FS = 4, GS = 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_byte_is_disjoint_from_rex() {
        assert!(AH.is_high_byte());
        assert!(!AH.requires_rex());
        assert!(SPL.requires_rex());
        assert!(!SPL.is_high_byte());
    }

    #[test]
    fn index_and_class_identify_the_register() {
        assert_ne!(Reg::new(RegClass::Gpd, 0), Reg::new(RegClass::Gpq, 0));
        assert_eq!(RAX.rm_bits(), 0);
        assert_eq!(R8.rm_bits(), 0);
        assert!(R8.rex_bit());
        assert!(!RAX.rex_bit());
    }

    #[test]
    fn display_matches_intel_mnemonics() {
        assert_eq!(format!("{}", RAX), "rax");
        assert_eq!(format!("{}", R15), "r15");
        assert_eq!(format!("{}", XMM0), "xmm0");
    }
}
