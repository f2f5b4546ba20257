//! x87 FPU stack and MMX mnemonics (spec §1).
//!
//! The x87 forms use the FPU's own two-operand-but-one-is-implicit-ST0
//! addressing: `ST(i)` operands are encoded directly in the low 3 bits
//! of a `0xD8`-`0xDF` opcode's ModR/M byte rather than through the
//! general register-class machinery in `encode.rs`. MMX forms reuse the
//! standard ModR/M path against the `Mm` register class, the same way
//! SSE forms do against `Xmm`.

use super::{checked, RegField, Rm};
use crate::assembler::Assembler;
use crate::error::AsmError;
use crate::isa::registers::{Reg, RegClass};
use crate::operand::Mem;

fn require_fp(mnemonic: &'static str, r: Reg) -> Result<(), AsmError> {
    if r.class() != RegClass::Fp {
        return Err(AsmError::InvalidOperands {
            mnemonic,
            detail: "operand must be an x87 ST(i) register",
        });
    }
    Ok(())
}

fn require_mm(mnemonic: &'static str, r: Reg) -> Result<(), AsmError> {
    if r.class() != RegClass::Mm {
        return Err(AsmError::InvalidOperands {
            mnemonic,
            detail: "operand must be an MMX register",
        });
    }
    Ok(())
}

impl Assembler {
    /// `fld st(i)` — pushes a copy of `ST(i)` onto the FPU stack
    /// (`D9 C0+i`).
    pub fn fld_st(&mut self, i: Reg) -> &mut Self {
        checked!(self, {
            require_fp("fld", i)?;
            self.emit_opcode(&[0xd9, 0xc0 + i.rm_bits()]);
            Ok(())
        })
    }

    /// `fld m32` — loads a 32-bit float from memory (`D9 /0`).
    pub fn fld_m32(&mut self, src: Mem) -> &mut Self {
        checked!(self, self.emit_rm(false, None, false, &[0xd9], RegField::Digit(0), Rm::Mem(&src)))
    }

    /// `fld m64` — loads a 64-bit double from memory (`DD /0`).
    pub fn fld_m64(&mut self, src: Mem) -> &mut Self {
        checked!(self, self.emit_rm(false, None, false, &[0xdd], RegField::Digit(0), Rm::Mem(&src)))
    }

    /// `fstp st(i)` — pops `ST(0)` into `ST(i)` (`DD D8+i`).
    pub fn fstp_st(&mut self, i: Reg) -> &mut Self {
        checked!(self, {
            require_fp("fstp", i)?;
            self.emit_opcode(&[0xdd, 0xd8 + i.rm_bits()]);
            Ok(())
        })
    }

    /// `fstp m32` — pops `ST(0)` into memory as a 32-bit float
    /// (`D9 /3`).
    pub fn fstp_m32(&mut self, dst: Mem) -> &mut Self {
        checked!(self, self.emit_rm(false, None, false, &[0xd9], RegField::Digit(3), Rm::Mem(&dst)))
    }

    /// `fstp m64` — pops `ST(0)` into memory as a 64-bit double
    /// (`DD /3`).
    pub fn fstp_m64(&mut self, dst: Mem) -> &mut Self {
        checked!(self, self.emit_rm(false, None, false, &[0xdd], RegField::Digit(3), Rm::Mem(&dst)))
    }

    /// `faddp st(i), st(0)` — adds `ST(0)` into `ST(i)` and pops
    /// (`DE C0+i`).
    pub fn faddp(&mut self, i: Reg) -> &mut Self {
        checked!(self, {
            require_fp("faddp", i)?;
            self.emit_opcode(&[0xde, 0xc0 + i.rm_bits()]);
            Ok(())
        })
    }

    /// `fmulp st(i), st(0)` — multiplies `ST(0)` into `ST(i)` and pops
    /// (`DE C8+i`).
    pub fn fmulp(&mut self, i: Reg) -> &mut Self {
        checked!(self, {
            require_fp("fmulp", i)?;
            self.emit_opcode(&[0xde, 0xc8 + i.rm_bits()]);
            Ok(())
        })
    }

    /// `fsubp st(i), st(0)` — subtracts and pops (`DE E8+i`).
    pub fn fsubp(&mut self, i: Reg) -> &mut Self {
        checked!(self, {
            require_fp("fsubp", i)?;
            self.emit_opcode(&[0xde, 0xe8 + i.rm_bits()]);
            Ok(())
        })
    }

    /// `fchs` — negates `ST(0)` in place (`D9 E0`).
    pub fn fchs(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xd9, 0xe0]);
            Ok(())
        })
    }

    /// `fld1` — pushes `1.0` (`D9 E8`).
    pub fn fld1(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xd9, 0xe8]);
            Ok(())
        })
    }

    /// `fldz` — pushes `0.0` (`D9 EE`).
    pub fn fldz(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xd9, 0xee]);
            Ok(())
        })
    }

    /// `fxch st(i)` — exchanges `ST(0)` with `ST(i)` (`D9 C8+i`).
    pub fn fxch(&mut self, i: Reg) -> &mut Self {
        checked!(self, {
            require_fp("fxch", i)?;
            self.emit_opcode(&[0xd9, 0xc8 + i.rm_bits()]);
            Ok(())
        })
    }

    /// `fninit` — re-initializes the FPU without checking for pending
    /// unmasked exceptions first (`DB E3`).
    pub fn fninit(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xdb, 0xe3]);
            Ok(())
        })
    }

    /// `movq dst, src` — MMX register/register move (`0F 6F`).
    pub fn movq_mm_mm(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            require_mm("movq", dst)?;
            require_mm("movq", src)?;
            self.emit_rm(false, None, false, &[0x0f, 0x6f], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `movd dst, src` — MMX register from a 32-bit GPR (`0F 6E`).
    pub fn movd_mm_r32(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            require_mm("movd", dst)?;
            if src.class() != RegClass::Gpd {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "movd",
                    detail: "source must be a dword general-purpose register",
                });
            }
            self.emit_rm(false, None, false, &[0x0f, 0x6e], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `pand dst, src` — MMX bitwise and (`0F DB`).
    pub fn pand_mm(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            require_mm("pand", dst)?;
            require_mm("pand", src)?;
            self.emit_rm(false, None, false, &[0x0f, 0xdb], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `por dst, src` — MMX bitwise or (`0F EB`).
    pub fn por_mm(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            require_mm("por", dst)?;
            require_mm("por", src)?;
            self.emit_rm(false, None, false, &[0x0f, 0xeb], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `pxor dst, src` — MMX bitwise xor (`0F EF`).
    pub fn pxor_mm(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            require_mm("pxor", dst)?;
            require_mm("pxor", src)?;
            self.emit_rm(false, None, false, &[0x0f, 0xef], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `emms` — clears the MMX tag word, returning the x87 stack to
    /// usable state (`0F 77`). Spec §4.4.2's "emms-on-return" hint emits
    /// this before a function epilogue when the body used MMX.
    pub fn emms(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0x0f, 0x77]);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::isa::registers::{MM0, MM1, ST0, ST1};
    use crate::isa::Mode;

    #[test]
    fn fld1_is_two_bytes() {
        let mut asm = Assembler::new(Mode::X64);
        asm.fld1();
        assert_eq!(asm.buf.data(), &[0xd9, 0xe8]);
    }

    #[test]
    fn faddp_encodes_sti_index() {
        let mut asm = Assembler::new(Mode::X64);
        asm.faddp(ST1);
        assert_eq!(asm.buf.data(), &[0xde, 0xc1]);
    }

    #[test]
    fn fstp_st_encodes_d8_plus_i() {
        let mut asm = Assembler::new(Mode::X64);
        asm.fstp_st(ST0);
        assert!(asm.error().is_none());
        assert_eq!(asm.buf.data(), &[0xdd, 0xd8]);
    }

    #[test]
    fn fxch_rejects_non_fp_register() {
        let mut asm = Assembler::new(Mode::X64);
        let eax = Reg::new(RegClass::Gpd, 0);
        asm.fxch(eax);
        assert!(asm.error().is_some());
    }

    #[test]
    fn pxor_mm_requires_mmx_class() {
        let mut asm = Assembler::new(Mode::X64);
        asm.pxor_mm(MM0, MM1);
        assert_eq!(asm.buf.data(), &[0x0f, 0xef, 0xc1]);
    }

    #[test]
    fn emms_is_two_bytes() {
        let mut asm = Assembler::new(Mode::X64);
        asm.emms();
        assert_eq!(asm.buf.data(), &[0x0f, 0x77]);
    }
}
