//! The operand model (spec §3, §4.1).
//!
//! `Operand` is a tagged union of register, memory, immediate, and label
//! operands. Values are cheap to copy and own no heap memory; a memory
//! operand referencing a label is resolved by the assembler, not here
//! (§4.1: "The constructor for a memory operand from a label produces a
//! form that the encoder later resolves either to RIP-relative ... or to
//! a 32-bit absolute with a relocation record").

use crate::isa::registers::{Reg, RegClass};
use crate::label::Label;
use crate::reloc::RelocMode;
use core::fmt;

/// Explicit operand size, used to disambiguate an instruction form when
/// neither operand's register class pins it down (spec §3: "Size tag
/// selects the mnemonic variant when ambiguous (e.g. `byte ptr`, `dword
/// ptr`, `qword ptr`)").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Size {
    /// Size is implied by the other operand; only valid when the other
    /// operand is a register or an immediate whose width is unambiguous.
    Unspecified,
    Byte,
    Word,
    Dword,
    Qword,
    /// 80-bit x87 extended precision (`tbyte ptr`).
    Tbyte,
    /// 128-bit SSE (`xmmword ptr`).
    Xmmword,
}

impl Size {
    /// Width in bytes, where defined.
    pub fn bytes(self) -> Option<u8> {
        match self {
            Size::Unspecified => None,
            Size::Byte => Some(1),
            Size::Word => Some(2),
            Size::Dword => Some(4),
            Size::Qword => Some(8),
            Size::Tbyte => Some(10),
            Size::Xmmword => Some(16),
        }
    }

    /// The size tag implied by a register class, used to validate that a
    /// memory operand's explicit tag agrees with a paired register
    /// operand (spec §3 invariant).
    pub fn of_reg_class(class: RegClass) -> Self {
        match class {
            RegClass::GpbLo | RegClass::GpbHi => Size::Byte,
            RegClass::Gpw => Size::Word,
            RegClass::Gpd => Size::Dword,
            RegClass::Gpq => Size::Qword,
            RegClass::Fp => Size::Tbyte,
            RegClass::Mm => Size::Qword,
            RegClass::Xmm => Size::Xmmword,
            RegClass::Segment | RegClass::Control | RegClass::Debug => Size::Qword,
        }
    }
}

/// A scale factor for a SIB-addressed index register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scale {
    X1,
    X2,
    X4,
    X8,
}

impl Scale {
    /// The 2-bit SIB.scale field.
    pub fn sib_bits(self) -> u8 {
        match self {
            Scale::X1 => 0b00,
            Scale::X2 => 0b01,
            Scale::X4 => 0b10,
            Scale::X8 => 0b11,
        }
    }

    /// The multiplier itself.
    pub fn factor(self) -> i32 {
        match self {
            Scale::X1 => 1,
            Scale::X2 => 2,
            Scale::X4 => 4,
            Scale::X8 => 8,
        }
    }
}

/// Either a concrete base/index register, or (in 64-bit mode) a
/// RIP-relative reference to a not-yet-bound label.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemBase {
    None,
    Reg(Reg),
    /// RIP-relative addressing; valid only in 64-bit mode (spec §3: "an
    /// absent base with present displacement encodes RIP-relative if
    /// requested").
    RipRelative(Label),
}

/// A memory operand: `(segment?, base?, index?, scale, displacement,
/// size)` (spec §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mem {
    pub segment: Option<Reg>,
    pub base: MemBase,
    pub index: Option<Reg>,
    pub scale: Scale,
    pub disp: i32,
    pub size: Size,
}

impl Mem {
    /// `[base + disp]`, the common case.
    pub fn base_disp(base: Reg, disp: i32, size: Size) -> Self {
        Mem {
            segment: None,
            base: MemBase::Reg(base),
            index: None,
            scale: Scale::X1,
            disp,
            size,
        }
    }

    /// `[base + index*scale + disp]`.
    pub fn base_index_scale_disp(base: Reg, index: Reg, scale: Scale, disp: i32, size: Size) -> Self {
        Mem {
            segment: None,
            base: MemBase::Reg(base),
            index: Some(index),
            scale,
            disp,
            size,
        }
    }

    /// `[label + RIP]`, resolved relative to the end of the encoded
    /// instruction (64-bit mode only).
    pub fn rip_relative(label: Label, size: Size) -> Self {
        Mem {
            segment: None,
            base: MemBase::RipRelative(label),
            index: None,
            scale: Scale::X1,
            disp: 0,
            size,
        }
    }

    /// A bare absolute address: no base, no index, 32-bit displacement.
    pub fn absolute(addr: i32, size: Size) -> Self {
        Mem {
            segment: None,
            base: MemBase::None,
            index: None,
            scale: Scale::X1,
            disp: addr,
            size,
        }
    }

    /// Attaches an explicit segment override.
    pub fn with_segment(mut self, seg: Reg) -> Self {
        self.segment = Some(seg);
        self
    }

    /// True if this has neither a base register nor an index register
    /// nor a RIP-relative label (a bare absolute address).
    pub fn is_absolute(&self) -> bool {
        matches!(self.base, MemBase::None) && self.index.is_none()
    }
}

macro_rules! size_qualified_ptr {
    ($name:ident, $size:expr) => {
        /// A size-qualified `
        #[doc = stringify!($name)]
        /// ` pointer constructor (spec §4.1).
        pub fn $name(base: Reg, disp: i32) -> Mem {
            Mem::base_disp(base, disp, $size)
        }
    };
}

size_qualified_ptr!(byte_ptr, Size::Byte);
size_qualified_ptr!(word_ptr, Size::Word);
size_qualified_ptr!(dword_ptr, Size::Dword);
size_qualified_ptr!(qword_ptr, Size::Qword);
size_qualified_ptr!(tbyte_ptr, Size::Tbyte);
size_qualified_ptr!(xmmword_ptr, Size::Xmmword);

/// An immediate operand: a machine-word-wide signed value, an
/// unsigned-interpretation flag, and an optional relocation marker for
/// immediates that will be overwritten after emission (spec §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Imm {
    pub value: i64,
    pub unsigned: bool,
    /// Set when this immediate's encoded bytes must be patched later
    /// (e.g. the address of a label or external symbol). When set, the
    /// shift-by-1 and other single-byte shortcut encodings are
    /// suppressed (spec §9: "immediates that will later be overwritten
    /// must always take the generic encoding to preserve the patch
    /// site").
    pub reloc: Option<RelocMode>,
}

impl Imm {
    /// A plain signed immediate.
    pub fn new(value: i64) -> Self {
        Imm {
            value,
            unsigned: false,
            reloc: None,
        }
    }

    /// An immediate interpreted as unsigned when formatted/validated.
    pub fn unsigned(value: u64) -> Self {
        Imm {
            value: value as i64,
            unsigned: true,
            reloc: None,
        }
    }

    /// An immediate slot that will later be patched by a relocation
    /// (e.g. `mov reg, label_address`).
    pub fn relocated(mode: RelocMode) -> Self {
        Imm {
            value: 0,
            unsigned: false,
            reloc: Some(mode),
        }
    }

    /// True if `value` fits in a signed 8-bit slot.
    pub fn fits_i8(&self) -> bool {
        self.reloc.is_none() && self.value >= i8::MIN as i64 && self.value <= i8::MAX as i64
    }

    /// True if `value` fits in a signed 32-bit slot.
    pub fn fits_i32(&self) -> bool {
        self.reloc.is_none() && self.value >= i32::MIN as i64 && self.value <= i32::MAX as i64
    }
}

macro_rules! imm_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Imm {
            fn from(v: $t) -> Self {
                Imm::new(v as i64)
            }
        })*
    };
}
imm_from_int!(i8, i16, i32, i64, u8, u16, u32);

/// A single operand to an assembler mnemonic method: a register, a
/// memory reference, an immediate, or a not-yet-resolved label (used by
/// control-flow mnemonics like `jmp`/`call`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Mem(Mem),
    Imm(Imm),
    Label(Label),
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}
impl From<Mem> for Operand {
    fn from(m: Mem) -> Self {
        Operand::Mem(m)
    }
}
impl From<Imm> for Operand {
    fn from(i: Imm) -> Self {
        Operand::Imm(i)
    }
}
impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Operand::Label(l)
    }
}
impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Imm(Imm::new(v))
    }
}
impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Imm(Imm::new(v as i64))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Mem(_) => write!(f, "[mem]"),
            Operand::Imm(i) => write!(f, "{}", i.value),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::registers::{EAX, EBX, ECX};

    #[test]
    fn size_qualified_constructors_tag_the_operand() {
        let m = dword_ptr(EAX, 8);
        assert_eq!(m.size, Size::Dword);
        assert_eq!(m.disp, 8);
    }

    #[test]
    fn base_index_scale_disp_roundtrip() {
        let m = Mem::base_index_scale_disp(EBX, ECX, Scale::X4, -4, Size::Dword);
        assert_eq!(m.scale.sib_bits(), 0b10);
        assert_eq!(m.disp, -4);
        assert!(!m.is_absolute());
    }

    #[test]
    fn absolute_immediate_range_checks() {
        assert!(Imm::new(100).fits_i8());
        assert!(!Imm::new(1000).fits_i8());
        assert!(Imm::new(1000).fits_i32());
    }

    #[test]
    fn relocated_immediate_suppresses_shortcuts() {
        let imm = Imm::relocated(RelocMode::AbsoluteExternal(0));
        assert!(!imm.fits_i8());
        assert!(!imm.fits_i32());
    }
}
