//! General-purpose integer mnemonics (spec §4.3.1, §4.3.2).
//!
//! Each public method validates operand agreement, picks the right
//! opcode/prefix family, and either emits directly or delegates to the
//! shared `emit_rm` encoder in `encode.rs`. Shortcut encodings spec
//! §4.3.2 calls out explicitly (accumulator forms, the `inc`/`dec`
//! single-byte forms, `xchg`/`nop`, the shift-by-1 opcode) are
//! implemented exactly where the generic form would otherwise apply.

use super::{checked, RegField, Rm};
use crate::assembler::Assembler;
use crate::error::{AsmError, AsmResult};
use crate::isa::registers::{Reg, RegClass};
use crate::operand::{Imm, Mem};

#[derive(Clone, Copy)]
struct ArithOp {
    name: &'static str,
    digit: u8,
    base: u8,
}

const ADD: ArithOp = ArithOp { name: "add", digit: 0, base: 0x00 };
const OR: ArithOp = ArithOp { name: "or", digit: 1, base: 0x08 };
const ADC: ArithOp = ArithOp { name: "adc", digit: 2, base: 0x10 };
const SBB: ArithOp = ArithOp { name: "sbb", digit: 3, base: 0x18 };
const AND: ArithOp = ArithOp { name: "and", digit: 4, base: 0x20 };
const SUB: ArithOp = ArithOp { name: "sub", digit: 5, base: 0x28 };
const XOR: ArithOp = ArithOp { name: "xor", digit: 6, base: 0x30 };
const CMP: ArithOp = ArithOp { name: "cmp", digit: 7, base: 0x38 };

fn is_accumulator(r: Reg) -> bool {
    r.index() == 0 && r.class().is_gpr() && r.class() != RegClass::GpbHi
}

/// `(opsize16, rex_w)` for a general-purpose register's natural operand
/// size (spec §4.3.2 step 1 / step 3). Shared with `control` and `sse`,
/// which face the same opsize-prefix/REX.W decision for their own
/// register classes.
pub(crate) fn size_bits(r: Reg) -> (bool, bool) {
    match r.class() {
        RegClass::Gpw => (true, false),
        RegClass::Gpq => (false, true),
        _ => (false, false),
    }
}

impl Assembler {
    fn put_imm_sized(&mut self, imm: Imm, bytes: u8) -> AsmResult<()> {
        if let Some(mode) = imm.reloc {
            let offset = self.buf.len();
            match bytes {
                4 => self.buf.put4(0),
                8 => self.buf.put8(0),
                _ => {
                    return Err(AsmError::InvalidOperands {
                        mnemonic: "<imm>",
                        detail: "a relocated immediate must occupy 4 or 8 bytes",
                    })
                }
            }
            self.record_reloc(offset, bytes, mode);
            return Ok(());
        }
        match bytes {
            1 => {
                let v = imm.value;
                if !(-128..=255).contains(&v) {
                    return Err(AsmError::InvalidImmediate { value: v, bits: 8 });
                }
                self.buf.put1(v as u8);
            }
            2 => {
                let v = imm.value;
                if !(-32768..=65535).contains(&v) {
                    return Err(AsmError::InvalidImmediate { value: v, bits: 16 });
                }
                self.buf.put2(v as u16);
            }
            4 => {
                let v = imm.value;
                if v < i32::MIN as i64 || v > u32::MAX as i64 {
                    return Err(AsmError::InvalidImmediate { value: v, bits: 32 });
                }
                self.buf.put4(v as u32);
            }
            8 => self.buf.put8(imm.value as u64),
            _ => unreachable!("immediate slots are 1, 2, 4, or 8 bytes"),
        }
        Ok(())
    }

    fn try_arith_rr(&mut self, op: ArithOp, dst: Reg, src: Reg) -> AsmResult<()> {
        if dst.class() != src.class() {
            return Err(AsmError::InvalidOperands {
                mnemonic: op.name,
                detail: "register operands must share the same class",
            });
        }
        let byte = dst.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(dst);
        let opcode = if byte { op.base } else { op.base + 1 };
        self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(src), Rm::Reg(dst))
    }

    fn try_arith_rm(&mut self, op: ArithOp, dst: Reg, src: &Mem) -> AsmResult<()> {
        self.validate_size_agreement(op.name, dst.class().size_bytes(), src)?;
        let byte = dst.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(dst);
        let opcode = if byte { op.base + 2 } else { op.base + 3 };
        self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(dst), Rm::Mem(src))
    }

    fn try_arith_mr(&mut self, op: ArithOp, dst: &Mem, src: Reg) -> AsmResult<()> {
        self.validate_size_agreement(op.name, src.class().size_bytes(), dst)?;
        let byte = src.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(src);
        let opcode = if byte { op.base } else { op.base + 1 };
        self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(src), Rm::Mem(dst))
    }

    fn try_arith_ri(&mut self, op: ArithOp, dst: Reg, imm: Imm) -> AsmResult<()> {
        let byte = dst.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(dst);
        if imm.reloc.is_none() && is_accumulator(dst) {
            let opcode = if byte { op.base + 4 } else { op.base + 5 };
            self.emit_opsize_prefix(opsize16);
            if rex_w {
                self.buf.put1(0x48);
            }
            self.emit_opcode(&[opcode]);
            return self.put_imm_sized(imm, if byte { 1 } else if opsize16 { 2 } else { 4 });
        }
        if byte {
            self.emit_rm(opsize16, None, rex_w, &[0x80], RegField::Digit(op.digit), Rm::Reg(dst))?;
            self.put_imm_sized(imm, 1)
        } else if imm.fits_i8() {
            self.emit_rm(opsize16, None, rex_w, &[0x83], RegField::Digit(op.digit), Rm::Reg(dst))?;
            self.put_imm_sized(imm, 1)
        } else {
            self.emit_rm(opsize16, None, rex_w, &[0x81], RegField::Digit(op.digit), Rm::Reg(dst))?;
            self.put_imm_sized(imm, if opsize16 { 2 } else { 4 })
        }
    }

    fn try_arith_mi(&mut self, op: ArithOp, dst: &Mem, imm: Imm) -> AsmResult<()> {
        let size = dst.size.bytes().ok_or(AsmError::InvalidOperands {
            mnemonic: op.name,
            detail: "a memory destination with an immediate source needs an explicit size tag",
        })?;
        let byte = size == 1;
        let opsize16 = size == 2;
        let rex_w = size == 8;
        if byte {
            self.emit_rm(false, None, false, &[0x80], RegField::Digit(op.digit), Rm::Mem(dst))?;
            self.put_imm_sized(imm, 1)
        } else if imm.fits_i8() {
            self.emit_rm(opsize16, None, rex_w, &[0x83], RegField::Digit(op.digit), Rm::Mem(dst))?;
            self.put_imm_sized(imm, 1)
        } else {
            self.emit_rm(opsize16, None, rex_w, &[0x81], RegField::Digit(op.digit), Rm::Mem(dst))?;
            self.put_imm_sized(imm, if opsize16 { 2 } else { 4 })
        }
    }
}

macro_rules! arith_forms {
    ($op:expr, $rr:ident, $rm:ident, $mr:ident, $ri:ident, $mi:ident) => {
        #[doc = "Register/register form."]
        pub fn $rr(&mut self, dst: Reg, src: Reg) -> &mut Self {
            checked!(self, self.try_arith_rr($op, dst, src))
        }
        #[doc = "Register destination, memory source."]
        pub fn $rm(&mut self, dst: Reg, src: Mem) -> &mut Self {
            checked!(self, self.try_arith_rm($op, dst, &src))
        }
        #[doc = "Memory destination, register source."]
        pub fn $mr(&mut self, dst: Mem, src: Reg) -> &mut Self {
            checked!(self, self.try_arith_mr($op, &dst, src))
        }
        #[doc = "Register destination, immediate source."]
        pub fn $ri(&mut self, dst: Reg, imm: impl Into<Imm>) -> &mut Self {
            checked!(self, self.try_arith_ri($op, dst, imm.into()))
        }
        #[doc = "Memory destination, immediate source."]
        pub fn $mi(&mut self, dst: Mem, imm: impl Into<Imm>) -> &mut Self {
            checked!(self, self.try_arith_mi($op, &dst, imm.into()))
        }
    };
}

impl Assembler {
    arith_forms!(ADD, add_rr, add_rm, add_mr, add_ri, add_mi);
    arith_forms!(OR, or_rr, or_rm, or_mr, or_ri, or_mi);
    arith_forms!(ADC, adc_rr, adc_rm, adc_mr, adc_ri, adc_mi);
    arith_forms!(SBB, sbb_rr, sbb_rm, sbb_mr, sbb_ri, sbb_mi);
    arith_forms!(AND, and_rr, and_rm, and_mr, and_ri, and_mi);
    arith_forms!(SUB, sub_rr, sub_rm, sub_mr, sub_ri, sub_mi);
    arith_forms!(XOR, xor_rr, xor_rm, xor_mr, xor_ri, xor_mi);
    arith_forms!(CMP, cmp_rr, cmp_rm, cmp_mr, cmp_ri, cmp_mi);
}

impl Assembler {
    /// `mov dst, src` (register to register).
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, self.try_mov_rr(dst, src))
    }

    fn try_mov_rr(&mut self, dst: Reg, src: Reg) -> AsmResult<()> {
        if dst.class() != src.class() {
            return Err(AsmError::InvalidOperands {
                mnemonic: "mov",
                detail: "register operands must share the same class",
            });
        }
        let byte = dst.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(dst);
        let opcode = if byte { 0x88 } else { 0x89 };
        self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(src), Rm::Reg(dst))
    }

    /// `mov dst, [src]`.
    pub fn mov_rm(&mut self, dst: Reg, src: Mem) -> &mut Self {
        checked!(self, {
            self.validate_size_agreement("mov", dst.class().size_bytes(), &src)?;
            let byte = dst.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(dst);
            let opcode = if byte { 0x8a } else { 0x8b };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(dst), Rm::Mem(&src))
        })
    }

    /// `mov [dst], src`.
    pub fn mov_mr(&mut self, dst: Mem, src: Reg) -> &mut Self {
        checked!(self, {
            self.validate_size_agreement("mov", src.class().size_bytes(), &dst)?;
            let byte = src.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(src);
            let opcode = if byte { 0x88 } else { 0x89 };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(src), Rm::Mem(&dst))
        })
    }

    /// `mov dst, imm` — uses the `B8+r`/`B0+r` register-in-opcode forms,
    /// which for `AL`/`AX`/`EAX`/`RAX` double as the spec's accumulator
    /// shortcut without any special-casing needed here.
    pub fn mov_ri(&mut self, dst: Reg, imm: impl Into<Imm>) -> &mut Self {
        checked!(self, {
            let imm = imm.into();
            let byte = dst.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(dst);
            self.emit_opsize_prefix(opsize16);
            let rex = if rex_w || dst.rex_bit() {
                Some(0x40 | ((rex_w as u8) << 3) | (dst.rex_bit() as u8))
            } else {
                None
            };
            if let Some(r) = rex {
                self.buf.put1(r);
            }
            let base = if byte { 0xb0 } else { 0xb8 };
            self.emit_opcode(&[base + dst.rm_bits()]);
            if rex_w {
                // mov r64, imm64 takes a full 8-byte immediate.
                self.put_imm_sized(imm, 8)
            } else {
                self.put_imm_sized(imm, if byte { 1 } else if opsize16 { 2 } else { 4 })
            }
        })
    }

    /// `mov [dst], imm` — opcode `C6`/`C7` `/0`.
    pub fn mov_mi(&mut self, dst: Mem, imm: impl Into<Imm>) -> &mut Self {
        checked!(self, {
            let imm = imm.into();
            let size = dst.size.bytes().ok_or(AsmError::InvalidOperands {
                mnemonic: "mov",
                detail: "a memory destination with an immediate source needs an explicit size tag",
            })?;
            let byte = size == 1;
            let opsize16 = size == 2;
            let rex_w = size == 8;
            let opcode = if byte { 0xc6 } else { 0xc7 };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(0), Rm::Mem(&dst))?;
            self.put_imm_sized(imm, if byte { 1 } else if opsize16 { 2 } else { 4 })
        })
    }

    /// `movzx dst, src` — zero-extends a narrower `src` into a wider
    /// `dst` (opcode `0F B6`/`0F B7`).
    pub fn movzx_rr(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, self.try_extend_rr(dst, src, 0xb6, 0xb7))
    }

    /// `movsx dst, src` — sign-extends a narrower `src` into a wider
    /// `dst` (opcode `0F BE`/`0F BF`).
    pub fn movsx_rr(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, self.try_extend_rr(dst, src, 0xbe, 0xbf))
    }

    fn try_extend_rr(&mut self, dst: Reg, src: Reg, op8: u8, op16: u8) -> AsmResult<()> {
        if dst.class().size_bytes() <= src.class().size_bytes() {
            return Err(AsmError::InvalidOperands {
                mnemonic: "movzx/movsx",
                detail: "destination must be wider than the source",
            });
        }
        let (opsize16, rex_w) = size_bits(dst);
        let opcode = if src.class().size_bytes() == 1 { op8 } else { op16 };
        self.emit_rm(opsize16, None, rex_w, &[0x0f, opcode], RegField::Reg(dst), Rm::Reg(src))
    }

    /// `lea dst, [src]`.
    pub fn lea(&mut self, dst: Reg, src: Mem) -> &mut Self {
        checked!(self, {
            if dst.class().is_byte() {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "lea",
                    detail: "lea requires a word, dword, or qword destination",
                });
            }
            let (opsize16, rex_w) = size_bits(dst);
            self.emit_rm(opsize16, None, rex_w, &[0x8d], RegField::Reg(dst), Rm::Mem(&src))
        })
    }

    /// `test lhs, rhs` (register/register).
    pub fn test_rr(&mut self, lhs: Reg, rhs: Reg) -> &mut Self {
        checked!(self, {
            if lhs.class() != rhs.class() {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "test",
                    detail: "register operands must share the same class",
                });
            }
            let byte = lhs.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(lhs);
            let opcode = if byte { 0x84 } else { 0x85 };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(rhs), Rm::Reg(lhs))
        })
    }

    /// `test reg, [mem]`.
    pub fn test_rm(&mut self, reg: Reg, mem: Mem) -> &mut Self {
        checked!(self, {
            self.validate_size_agreement("test", reg.class().size_bytes(), &mem)?;
            let byte = reg.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(reg);
            let opcode = if byte { 0x84 } else { 0x85 };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(reg), Rm::Mem(&mem))
        })
    }

    /// `test reg, imm` — uses the `A8`/`A9` accumulator shortcut when
    /// `reg` is `AL`/`AX`/`EAX`/`RAX`.
    pub fn test_ri(&mut self, reg: Reg, imm: impl Into<Imm>) -> &mut Self {
        checked!(self, {
            let imm = imm.into();
            let byte = reg.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(reg);
            if imm.reloc.is_none() && is_accumulator(reg) {
                self.emit_opsize_prefix(opsize16);
                if rex_w {
                    self.buf.put1(0x48);
                }
                self.emit_opcode(&[if byte { 0xa8 } else { 0xa9 }]);
                return self.put_imm_sized(imm, if byte { 1 } else if opsize16 { 2 } else { 4 });
            }
            let opcode = if byte { 0xf6 } else { 0xf7 };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(0), Rm::Reg(reg))?;
            self.put_imm_sized(imm, if byte { 1 } else if opsize16 { 2 } else { 4 })
        })
    }

    /// `inc dst` — in 32-bit mode this is the single-byte `0x40+r` form
    /// (spec §4.3.2); in 64-bit mode that encoding space is REX, so it
    /// falls through to the generic `FE`/`FF /0` ModR/M form.
    pub fn inc(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_inc_dec(dst, 0, 0x40))
    }

    /// `dec dst` — same shortcut rule as `inc`, `0x48+r` in 32-bit mode.
    pub fn dec(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_inc_dec(dst, 1, 0x48))
    }

    fn try_inc_dec(&mut self, dst: Reg, digit: u8, shortcut_base: u8) -> AsmResult<()> {
        let byte = dst.class().size_bytes() == 1;
        if !self.mode.is_64bit() && !byte && matches!(dst.class(), RegClass::Gpw | RegClass::Gpd) {
            let (opsize16, _) = size_bits(dst);
            self.emit_opsize_prefix(opsize16);
            self.emit_opcode(&[shortcut_base + dst.rm_bits()]);
            return Ok(());
        }
        let (opsize16, rex_w) = size_bits(dst);
        let opcode = if byte { 0xfe } else { 0xff };
        self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(digit), Rm::Reg(dst))
    }

    /// `neg dst` (`F6`/`F7 /3`).
    pub fn neg(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_unary_f7(dst, 3))
    }

    /// `not dst` (`F6`/`F7 /2`).
    pub fn not_(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_unary_f7(dst, 2))
    }

    /// `mul dst` — unsigned `RDX:RAX <- RAX * dst` (`F6`/`F7 /4`).
    pub fn mul(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_unary_f7(dst, 4))
    }

    /// `div dst` — unsigned (`F6`/`F7 /6`).
    pub fn div(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_unary_f7(dst, 6))
    }

    /// `idiv dst` — signed (`F6`/`F7 /7`).
    pub fn idiv(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_unary_f7(dst, 7))
    }

    fn try_unary_f7(&mut self, dst: Reg, digit: u8) -> AsmResult<()> {
        let byte = dst.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(dst);
        let opcode = if byte { 0xf6 } else { 0xf7 };
        self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(digit), Rm::Reg(dst))
    }

    /// `imul dst` — one-operand signed multiply, `RDX:RAX <- RAX * dst`
    /// (`F6`/`F7 /5`).
    pub fn imul1(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_unary_f7(dst, 5))
    }

    /// `imul dst, src` — two-operand signed multiply (`0F AF /r`).
    pub fn imul_rr(&mut self, dst: Reg, src: Reg) -> &mut Self {
        checked!(self, {
            if dst.class().is_byte() {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "imul",
                    detail: "two-operand imul requires a word, dword, or qword destination",
                });
            }
            let (opsize16, rex_w) = size_bits(dst);
            self.emit_rm(opsize16, None, rex_w, &[0x0f, 0xaf], RegField::Reg(dst), Rm::Reg(src))
        })
    }

    /// `imul dst, src, imm` — three-operand signed multiply (`69`/`6B`).
    pub fn imul_rri(&mut self, dst: Reg, src: Reg, imm: impl Into<Imm>) -> &mut Self {
        checked!(self, {
            let imm = imm.into();
            let (opsize16, rex_w) = size_bits(dst);
            if imm.fits_i8() {
                self.emit_rm(opsize16, None, rex_w, &[0x6b], RegField::Reg(dst), Rm::Reg(src))?;
                self.put_imm_sized(imm, 1)
            } else {
                self.emit_rm(opsize16, None, rex_w, &[0x69], RegField::Reg(dst), Rm::Reg(src))?;
                self.put_imm_sized(imm, if opsize16 { 2 } else { 4 })
            }
        })
    }

    /// `push src` — the default operand size in 32-bit mode is a dword
    /// (`Gpd`), not a word, so `Gpd` is accepted there; in 64-bit mode
    /// `push`'s default (and only) size is a qword, `Gpd` has no push
    /// form at all.
    pub fn push(&mut self, src: Reg) -> &mut Self {
        checked!(self, {
            let ok = match src.class() {
                RegClass::Gpq => true,
                RegClass::Gpw => true,
                RegClass::Gpd => !self.mode.is_64bit(),
                _ => false,
            };
            if !ok {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "push",
                    detail: "push takes a word register, a dword register (32-bit mode), \
                             or (in 64-bit mode) a qword register",
                });
            }
            let opsize16 = src.class() == RegClass::Gpw;
            self.emit_opsize_prefix(opsize16);
            if src.rex_bit() {
                self.buf.put1(0x41); // REX.B only; push has no REX.W meaning
            }
            self.emit_opcode(&[0x50 + src.rm_bits()]);
            Ok(())
        })
    }

    /// `pop dst` — see [`Assembler::push`] for why `Gpd` is accepted
    /// only outside 64-bit mode.
    pub fn pop(&mut self, dst: Reg) -> &mut Self {
        checked!(self, {
            let ok = match dst.class() {
                RegClass::Gpq => true,
                RegClass::Gpw => true,
                RegClass::Gpd => !self.mode.is_64bit(),
                _ => false,
            };
            if !ok {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "pop",
                    detail: "pop takes a word register, a dword register (32-bit mode), \
                             or (in 64-bit mode) a qword register",
                });
            }
            let opsize16 = dst.class() == RegClass::Gpw;
            self.emit_opsize_prefix(opsize16);
            if dst.rex_bit() {
                self.buf.put1(0x41);
            }
            self.emit_opcode(&[0x58 + dst.rm_bits()]);
            Ok(())
        })
    }

    /// `xchg a, b` — `xchg rax, rax` collapses to the single-byte `NOP`
    /// (spec §4.3.2: "0x90 with index 0 is NOP").
    pub fn xchg(&mut self, a: Reg, b: Reg) -> &mut Self {
        checked!(self, {
            if a.class() != b.class() {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "xchg",
                    detail: "register operands must share the same class",
                });
            }
            if is_accumulator(a) && is_accumulator(b) {
                self.nop();
                return Ok(());
            }
            if is_accumulator(a) || is_accumulator(b) {
                let (acc, other) = if is_accumulator(a) { (a, b) } else { (b, a) };
                let byte = acc.class().size_bytes() == 1;
                if !byte {
                    let (opsize16, rex_w) = size_bits(acc);
                    self.emit_opsize_prefix(opsize16);
                    if rex_w || other.rex_bit() {
                        self.buf.put1(0x40 | ((rex_w as u8) << 3) | (other.rex_bit() as u8));
                    }
                    self.emit_opcode(&[0x90 + other.rm_bits()]);
                    return Ok(());
                }
            }
            let byte = a.class().size_bytes() == 1;
            let (opsize16, rex_w) = size_bits(a);
            let opcode = if byte { 0x86 } else { 0x87 };
            self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Reg(b), Rm::Reg(a))
        })
    }

    /// `nop` — single-byte `0x90`.
    pub fn nop(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0x90]);
            Ok(())
        })
    }

    /// `int3` — `0xCC`.
    pub fn int3(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xcc]);
            Ok(())
        })
    }

    /// `cwd`/`cdq`/`cqo` — sign-extends the accumulator into `(e/r)dx`
    /// ahead of a signed divide.
    pub fn cdq(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0x99]);
            Ok(())
        })
    }

    /// `leave` — `mov rsp, rbp; pop rbp` collapsed into one opcode.
    pub fn leave(&mut self) -> &mut Self {
        checked!(self, {
            self.emit_opcode(&[0xc9]);
            Ok(())
        })
    }
}

#[derive(Clone, Copy)]
enum ShiftKind {
    Imm1,
    ImmN(u8),
    Cl,
}

impl Assembler {
    fn try_shift(&mut self, dst: Reg, digit: u8, kind: ShiftKind) -> AsmResult<()> {
        let byte = dst.class().size_bytes() == 1;
        let (opsize16, rex_w) = size_bits(dst);
        match kind {
            ShiftKind::Imm1 => {
                let opcode = if byte { 0xd0 } else { 0xd1 };
                self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(digit), Rm::Reg(dst))
            }
            ShiftKind::Cl => {
                let opcode = if byte { 0xd2 } else { 0xd3 };
                self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(digit), Rm::Reg(dst))
            }
            ShiftKind::ImmN(n) => {
                let opcode = if byte { 0xc0 } else { 0xc1 };
                self.emit_rm(opsize16, None, rex_w, &[opcode], RegField::Digit(digit), Rm::Reg(dst))?;
                self.buf.put1(n);
                Ok(())
            }
        }
    }

    /// `shl dst, imm` (`/4`). `imm == 1` uses the implicit-1 shortcut
    /// opcode the spec calls out (spec §4.3.2); other values use the
    /// explicit-imm8 form.
    pub fn shl_ri(&mut self, dst: Reg, imm: u8) -> &mut Self {
        checked!(self, self.try_shift(dst, 4, if imm == 1 { ShiftKind::Imm1 } else { ShiftKind::ImmN(imm) }))
    }

    /// `shr dst, imm` (`/5`).
    pub fn shr_ri(&mut self, dst: Reg, imm: u8) -> &mut Self {
        checked!(self, self.try_shift(dst, 5, if imm == 1 { ShiftKind::Imm1 } else { ShiftKind::ImmN(imm) }))
    }

    /// `sar dst, imm` (`/7`).
    pub fn sar_ri(&mut self, dst: Reg, imm: u8) -> &mut Self {
        checked!(self, self.try_shift(dst, 7, if imm == 1 { ShiftKind::Imm1 } else { ShiftKind::ImmN(imm) }))
    }

    /// `shl dst, cl` (`/4`).
    pub fn shl_rc(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_shift(dst, 4, ShiftKind::Cl))
    }

    /// `shr dst, cl` (`/5`).
    pub fn shr_rc(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_shift(dst, 5, ShiftKind::Cl))
    }

    /// `sar dst, cl` (`/7`).
    pub fn sar_rc(&mut self, dst: Reg) -> &mut Self {
        checked!(self, self.try_shift(dst, 7, ShiftKind::Cl))
    }

    /// `rol dst, imm` (`/0`).
    pub fn rol_ri(&mut self, dst: Reg, imm: u8) -> &mut Self {
        checked!(self, self.try_shift(dst, 0, if imm == 1 { ShiftKind::Imm1 } else { ShiftKind::ImmN(imm) }))
    }

    /// `ror dst, imm` (`/1`).
    pub fn ror_ri(&mut self, dst: Reg, imm: u8) -> &mut Self {
        checked!(self, self.try_shift(dst, 1, if imm == 1 { ShiftKind::Imm1 } else { ShiftKind::ImmN(imm) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::isa::registers::*;
    use crate::isa::Mode;
    use crate::operand::dword_ptr;

    fn bytes(build: impl FnOnce(&mut Assembler)) -> Vec<u8> {
        let mut asm = Assembler::new(Mode::X64);
        build(&mut asm);
        assert!(asm.error().is_none(), "{:?}", asm.error());
        asm.buf.data().to_vec()
    }

    #[test]
    fn add_eax_imm8_uses_accumulator_shortcut() {
        let b = bytes(|a| {
            a.add_ri(EAX, 5i32);
        });
        assert_eq!(b, vec![0x05, 0x05, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn add_ebx_imm8_uses_group1_imm8_sign_extended() {
        let b = bytes(|a| {
            a.add_ri(EBX, 5i32);
        });
        assert_eq!(b, vec![0x83, 0xc3, 0x05]);
    }

    #[test]
    fn inc_ecx_uses_single_byte_form_in_32bit_mode() {
        let mut asm = Assembler::new(Mode::X86);
        asm.inc(ECX);
        assert_eq!(asm.buf.data(), &[0x41]);
    }

    #[test]
    fn inc_rcx_falls_through_to_modrm_form_in_64bit_mode() {
        let mut asm = Assembler::new(Mode::X64);
        asm.inc(RCX);
        assert_eq!(asm.buf.data(), &[0x48, 0xff, 0xc1]);
    }

    #[test]
    fn xchg_rax_rax_collapses_to_nop() {
        let b = bytes(|a| {
            a.xchg(RAX, RAX);
        });
        assert_eq!(b, vec![0x90]);
    }

    #[test]
    fn shift_by_one_uses_implicit_opcode() {
        let b = bytes(|a| {
            a.shl_ri(EAX, 1);
        });
        assert_eq!(b, vec![0xd1, 0xe0]);
    }

    #[test]
    fn shift_by_other_immediate_uses_imm8_opcode() {
        let b = bytes(|a| {
            a.shl_ri(EAX, 3);
        });
        assert_eq!(b, vec![0xc1, 0xe0, 0x03]);
    }

    #[test]
    fn mov_reg_mem_rejects_size_mismatch() {
        let mut asm = Assembler::new(Mode::X64);
        // RAX is qword-sized but the memory operand is explicitly tagged
        // dword, so the sizes disagree.
        asm.mov_rm(RAX, dword_ptr(RBX, 0));
        assert!(asm.error().is_some());
    }

    #[test]
    fn high_byte_register_with_rex_forcing_operand_is_rejected() {
        let mut asm = Assembler::new(Mode::X64);
        let r8b = Reg::new(RegClass::GpbLo, 8);
        asm.mov_rr(AH, r8b);
        assert!(asm.error().is_some());
    }
}
