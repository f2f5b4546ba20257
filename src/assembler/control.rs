//! Control-flow mnemonics (spec §4.3.1, §4.3.3): conditional and
//! unconditional jumps, calls, returns, and the `cmovcc`/`setcc`
//! families that read `EFLAGS` without branching.
//!
//! Backward references (the target is already bound) pick the short
//! 8-bit-displacement form when the computed delta fits, else the near
//! 32-bit form, exactly as spec §4.3.3 describes. Forward references
//! always take the near form and register themselves on the target
//! label's displacement chain via [`LabelPool::link_forward`]; `jmp`
//! alone sets the chain's type bit so an optional relaxation pass could
//! shrink it later (spec §3, §4.3.3) — this crate applies that shrink
//! only to the `RelativeExternal` relocation case (see `assembler::mod`),
//! not to in-buffer forward jumps, which the spec marks optional.

use super::{checked, gp::size_bits, RegField, Rm};
use crate::assembler::Assembler;
use crate::error::{AsmError, AsmResult};
use crate::isa::registers::{Reg, RegClass};
use crate::label::Label;
use crate::operand::Mem;
use core::fmt;

/// One of the sixteen x86 condition codes. The numeric value is shared
/// across four opcode families: `0x70+cc` (short Jcc), `0x0F 0x80+cc`
/// (near Jcc), `0x0F 0x40+cc` (CMOVcc), `0x0F 0x90+cc` (SETcc).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CondCode {
    O = 0,
    No = 1,
    B = 2,
    Nb = 3,
    E = 4,
    Ne = 5,
    Be = 6,
    Nbe = 7,
    S = 8,
    Ns = 9,
    P = 10,
    Np = 11,
    L = 12,
    Nl = 13,
    Le = 14,
    Nle = 15,
}

impl CondCode {
    /// Alias: zero flag set (`E`).
    pub const Z: CondCode = CondCode::E;
    /// Alias: zero flag clear (`NE`).
    pub const NZ: CondCode = CondCode::Ne;
    /// Alias: signed greater-or-equal (`NL`).
    pub const GE: CondCode = CondCode::Nl;
    /// Alias: signed greater-than (`NLE`).
    pub const G: CondCode = CondCode::Nle;
    /// Alias: unsigned above-or-equal (`NB`).
    pub const AE: CondCode = CondCode::Nb;
    /// Alias: unsigned above (`NBE`).
    pub const A: CondCode = CondCode::Nbe;

    pub(crate) fn bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [&str; 16] = [
            "o", "no", "b", "nb", "e", "ne", "be", "nbe", "s", "ns", "p", "np", "l", "nl", "le", "nle",
        ];
        f.write_str(NAMES[self.bits() as usize])
    }
}

fn call_target_class_ok(r: Reg) -> bool {
    matches!(r.class(), RegClass::Gpq | RegClass::Gpd)
}

impl Assembler {
    /// `jmp label` — unconditional jump.
    pub fn jmp_label(&mut self, label: Label) -> &mut Self {
        checked!(self, self.try_jmp_label(label))
    }

    fn try_jmp_label(&mut self, label: Label) -> AsmResult<()> {
        if let Some(target) = self.labels.offset_of(label) {
            let rel = target as i64 - (self.buf.len() as i64 + 2);
            if let Ok(d8) = i8::try_from(rel) {
                self.buf.put1(0xeb);
                self.buf.put1(d8 as u8);
            } else {
                let rel32 = target as i64 - (self.buf.len() as i64 + 5);
                self.buf.put1(0xe9);
                self.buf.put4(rel32 as u32);
            }
            Ok(())
        } else {
            self.buf.put1(0xe9);
            let slot = self.buf.len();
            self.buf.put4(0);
            self.labels.link_forward(&mut self.buf, label, slot, true)?;
            Ok(())
        }
    }

    /// `jcc label` — conditional jump.
    pub fn jcc_label(&mut self, cc: CondCode, label: Label) -> &mut Self {
        checked!(self, self.try_jcc_label(cc, label))
    }

    fn try_jcc_label(&mut self, cc: CondCode, label: Label) -> AsmResult<()> {
        if let Some(target) = self.labels.offset_of(label) {
            let rel = target as i64 - (self.buf.len() as i64 + 2);
            if let Ok(d8) = i8::try_from(rel) {
                self.buf.put1(0x70 + cc.bits());
                self.buf.put1(d8 as u8);
            } else {
                let rel32 = target as i64 - (self.buf.len() as i64 + 6);
                self.buf.put1(0x0f);
                self.buf.put1(0x80 + cc.bits());
                self.buf.put4(rel32 as u32);
            }
            Ok(())
        } else {
            self.buf.put1(0x0f);
            self.buf.put1(0x80 + cc.bits());
            let slot = self.buf.len();
            self.buf.put4(0);
            self.labels.link_forward(&mut self.buf, label, slot, false)?;
            Ok(())
        }
    }

    /// `call label` — direct relative call to a label in this buffer
    /// (e.g. a self-recursive function, spec §8 scenario 2).
    pub fn call_label(&mut self, label: Label) -> &mut Self {
        checked!(self, {
            if let Some(target) = self.labels.offset_of(label) {
                let rel = target as i64 - (self.buf.len() as i64 + 5);
                self.buf.put1(0xe8);
                self.buf.put4(rel as u32);
                Ok(())
            } else {
                self.buf.put1(0xe8);
                let slot = self.buf.len();
                self.buf.put4(0);
                self.labels.link_forward(&mut self.buf, label, slot, false)?;
                Ok(())
            }
        })
    }

    /// `call target` — indirect call through a register (`FF /2`).
    pub fn call_reg(&mut self, target: Reg) -> &mut Self {
        checked!(self, {
            if !call_target_class_ok(target) {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "call",
                    detail: "an indirect call target must be a dword or qword register",
                });
            }
            self.emit_rm(false, None, false, &[0xff], RegField::Digit(2), Rm::Reg(target))
        })
    }

    /// `call [target]` — indirect call through memory (`FF /2`).
    pub fn call_mem(&mut self, target: Mem) -> &mut Self {
        checked!(self, self.emit_rm(false, None, false, &[0xff], RegField::Digit(2), Rm::Mem(&target)))
    }

    /// `call target` to a host pointer outside this buffer: loads the
    /// absolute address into `scratch` (a relocated `mov`, patched at
    /// [`Assembler::make`]) and calls through it, rather than emitting a
    /// relative `E8` the relaxation machinery isn't meant to touch (spec
    /// §4.3.3's short/near shrink is scoped to unconditional jumps).
    pub fn call_external(&mut self, scratch: Reg, target: *const u8) -> &mut Self {
        use crate::operand::Imm;
        use crate::reloc::RelocMode;
        self.mov_ri(scratch, Imm::relocated(RelocMode::AbsoluteExternal(target as usize)));
        self.call_reg(scratch)
    }

    /// `ret` — near return, no stack cleanup.
    pub fn ret(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xc3]);
            Ok(())
        })
    }

    /// `ret imm16` — near return, callee pops `imm16` bytes of arguments
    /// (stdcall/fastcall, spec §4.4.2).
    pub fn ret_imm16(&mut self, imm16: u16) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xc2]);
            self.buf.put2(imm16);
            Ok(())
        })
    }

    /// `cmovcc dst, src` — conditional move, register source (`0F
    /// 40+cc`). Used by spec §8 scenario 6's branch-free `cmovne`.
    pub fn cmovcc_rr(&mut self, cc: CondCode, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            if dst.class().is_byte() {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "cmovcc",
                    detail: "cmovcc requires a word, dword, or qword destination",
                });
            }
            let (opsize16, rex_w) = size_bits(dst);
            self.emit_rm(opsize16, None, rex_w, &[0x0f, 0x40 + cc.bits()], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `cmovcc dst, [src]` — conditional move, memory source.
    pub fn cmovcc_rm(&mut self, cc: CondCode, dst: Reg, src: Mem) -> &mut Self {
        checked!(self, {
            self.validate_size_agreement("cmovcc", dst.class().size_bytes(), &src)?;
            let (opsize16, rex_w) = size_bits(dst);
            self.emit_rm(opsize16, None, rex_w, &[0x0f, 0x40 + cc.bits()], RegField::Reg(dst), Rm::Mem(&src))
        })
    }

    /// `setcc dst` — sets `dst` (a byte register) to 0 or 1 (`0F 90+cc`).
    pub fn setcc_r(&mut self, cc: CondCode, dst: Reg) -> &mut Self {
        checked!(self, {
            if !dst.class().is_byte() {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "setcc",
                    detail: "setcc requires a byte-sized destination",
                });
            }
            self.emit_rm(false, None, false, &[0x0f, 0x90 + cc.bits()], RegField::Digit(0), Rm::Reg(dst))
        })
    }

    /// `setcc [dst]` — memory destination form.
    pub fn setcc_m(&mut self, cc: CondCode, dst: Mem) -> &mut Self {
        checked!(self, self.emit_rm(false, None, false, &[0x0f, 0x90 + cc.bits()], RegField::Digit(0), Rm::Mem(&dst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::isa::registers::{EAX, EBX, ECX};
    use crate::isa::Mode;

    #[test]
    fn backward_jmp_picks_short_form() {
        let mut asm = Assembler::new(Mode::X64);
        let l = asm.new_label();
        asm.bind(l);
        asm.nop();
        asm.jmp_label(l);
        assert!(asm.error().is_none());
        assert_eq!(asm.buf.data()[1..], [0xeb, 0xfd]);
    }

    #[test]
    fn forward_jmp_uses_near_form_and_patches_on_bind() {
        let mut asm = Assembler::new(Mode::X64);
        let l = asm.new_label();
        asm.jmp_label(l);
        asm.nop();
        asm.bind(l);
        assert!(asm.error().is_none());
        assert_eq!(asm.buf.data()[0], 0xe9);
        let rel = asm.buf.read4(1) as i32;
        assert_eq!(rel, 1);
    }

    #[test]
    fn jcc_short_form_matches_condition_bits() {
        let mut asm = Assembler::new(Mode::X64);
        let l = asm.new_label();
        asm.bind(l);
        asm.jcc_label(CondCode::Ne, l);
        assert_eq!(asm.buf.data(), &[0x70 + CondCode::Ne.bits(), 0xfe]);
    }

    #[test]
    fn cmovne_encodes_0f_45() {
        let mut asm = Assembler::new(Mode::X64);
        asm.cmovcc_rr(CondCode::Ne, EAX, EBX);
        assert_eq!(asm.buf.data(), &[0x0f, 0x45, 0xc3]);
    }

    #[test]
    fn call_reg_rejects_byte_register() {
        let mut asm = Assembler::new(Mode::X64);
        let al = Reg::new(RegClass::GpbLo, 0);
        asm.call_reg(al);
        assert!(asm.error().is_some());
    }

    #[test]
    fn setcc_requires_byte_destination() {
        let mut asm = Assembler::new(Mode::X64);
        asm.setcc_r(CondCode::E, ECX);
        assert!(asm.error().is_some());
    }
}
