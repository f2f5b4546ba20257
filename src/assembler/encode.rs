//! The core encoding algorithm (spec §4.3.2): prefixes, REX, ModR/M, SIB,
//! displacement. Mnemonic methods in the sibling `gp`/`control`/`sse`/
//! `x87mmx` modules call into this file; it has no notion of any
//! particular mnemonic, only of operand shapes.

use crate::assembler::Assembler;
use crate::error::AsmError;
use crate::isa::registers::{Reg, RegClass};
use crate::operand::{Mem, MemBase};

/// What goes in ModR/M.reg: either a concrete register (whose REX.R bit
/// and 3 low bits come along for the ride) or a literal "opcode
/// extension" digit for instructions that only need one operand slot
/// (e.g. `/0` through `/7` forms like `shl r/m, 1`).
#[derive(Clone, Copy)]
pub(crate) enum RegField {
    Reg(Reg),
    Digit(u8),
}

impl RegField {
    fn rm_bits(self) -> u8 {
        match self {
            RegField::Reg(r) => r.rm_bits(),
            RegField::Digit(d) => d & 0x7,
        }
    }

    fn rex_bit(self) -> bool {
        match self {
            RegField::Reg(r) => r.rex_bit(),
            RegField::Digit(_) => false,
        }
    }

    fn as_reg(self) -> Option<Reg> {
        match self {
            RegField::Reg(r) => Some(r),
            RegField::Digit(_) => None,
        }
    }
}

/// The r/m operand: a register (ModR/M.mod == 11) or a memory reference.
#[derive(Clone, Copy)]
pub(crate) enum Rm<'a> {
    Reg(Reg),
    Mem(&'a Mem),
}

/// How many bytes of immediate/displacement still follow the ModR/M+SIB
/// encoding this call emits — needed only to compute a RIP-relative
/// displacement, which must be measured from the end of the whole
/// instruction, not just the end of the 4-byte disp slot.
pub(crate) type TrailingBytes = u8;

fn requires_rex_force(r: Reg) -> bool {
    // A GpbLo register with index 4..7 is SPL/BPL/SIL/DIL, only
    // reachable with a REX prefix present even though none of REX's
    // extension bits are set (spec §4.3.2 step 3).
    r.class() == RegClass::GpbLo && r.index() >= 4 && r.index() < 8
}

fn is_high_byte(r: Reg) -> bool {
    r.class() == RegClass::GpbHi
}

/// Computes the REX byte, if any is needed, for the given reg/base/index
/// triple and forced 64-bit operand size. Returns `None` when in 32-bit
/// mode or when nothing about these operands requires a REX prefix.
fn compute_rex(
    is_64bit: bool,
    rex_w: bool,
    reg: Option<Reg>,
    base: Option<Reg>,
    index: Option<Reg>,
) -> Option<u8> {
    if !is_64bit {
        return None;
    }
    let r = reg.map_or(false, Reg::rex_bit);
    let x = index.map_or(false, Reg::rex_bit);
    let b = base.map_or(false, Reg::rex_bit);
    let force = reg.map_or(false, requires_rex_force) || base.map_or(false, requires_rex_force);
    if rex_w || r || x || b || force {
        Some(0x40 | ((rex_w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | (b as u8))
    } else {
        None
    }
}

fn mem_has_rex_indexing(m: &Mem, is_64bit: bool) -> (Option<Reg>, Option<Reg>) {
    let base = match m.base {
        MemBase::Reg(r) => Some(r),
        MemBase::RipRelative(_) | MemBase::None => None,
    };
    let _ = is_64bit;
    (base, m.index)
}

/// `mod` + displacement kind chosen for a base register whose low 3 bits
/// are `rm_low3` (spec §4.3.2 step 5): RBP/R13 (low3 == 0b101) can never
/// use the zero-displacement `mod=00` form, because that encoding is
/// reserved for "no base" addressing.
fn choose_mod_and_disp(rm_low3: u8, disp: i32) -> (u8, DispKind) {
    if rm_low3 == 0b101 {
        if disp == 0 {
            (0b01, DispKind::Disp8(0))
        } else if let Ok(d8) = i8::try_from(disp) {
            (0b01, DispKind::Disp8(d8))
        } else {
            (0b10, DispKind::Disp32(disp))
        }
    } else if disp == 0 {
        (0b00, DispKind::None)
    } else if let Ok(d8) = i8::try_from(disp) {
        (0b01, DispKind::Disp8(d8))
    } else {
        (0b10, DispKind::Disp32(disp))
    }
}

enum DispKind {
    None,
    Disp8(i8),
    Disp32(i32),
}

impl Assembler {
    /// Emits the 0x66 operand-size prefix iff `opsize16`.
    pub(crate) fn emit_opsize_prefix(&mut self, opsize16: bool) {
        if opsize16 {
            self.buf.put1(0x66);
        }
    }

    /// Emits the encoding algorithm of spec §4.3.2 for an instruction
    /// whose opcode bytes are `opcode`, whose ModR/M.reg field is
    /// `reg_field`, and whose r/m operand is `rm`. Returns the offset of
    /// the start of any displacement that was written with a zeroed
    /// placeholder (used by callers that need to patch a RIP-relative
    /// displacement in after encoding the rest of the instruction).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn emit_rm(
        &mut self,
        opsize16: bool,
        mandatory_prefix: Option<u8>,
        rex_w: bool,
        opcode: &[u8],
        reg_field: RegField,
        rm: Rm,
    ) -> Result<(), AsmError> {
        self.emit_opsize_prefix(opsize16);
        if let Some(p) = mandatory_prefix {
            self.buf.put1(p);
        }

        let (base, index) = match rm {
            Rm::Reg(r) => (Some(r), None),
            Rm::Mem(m) => mem_has_rex_indexing(m, self.mode.is_64bit()),
        };

        let reg_reg = reg_field.as_reg();
        let high_byte_present = reg_reg.map_or(false, is_high_byte)
            || matches!(rm, Rm::Reg(r) if is_high_byte(r));

        let rex = compute_rex(self.mode.is_64bit(), rex_w, reg_reg, base, index);
        if high_byte_present && rex.is_some() {
            return Err(AsmError::InvalidOperands {
                mnemonic: "<encode>",
                detail: "a high-byte register (AH/CH/DH/BH) cannot be combined with any operand \
                         or operand size that forces a REX prefix",
            });
        }
        if let Some(rex_byte) = rex {
            self.buf.put1(rex_byte);
        }

        for &b in opcode {
            self.buf.put1(b);
        }

        match rm {
            Rm::Reg(r) => {
                let modrm = 0b1100_0000 | (reg_field.rm_bits() << 3) | r.rm_bits();
                self.buf.put1(modrm);
            }
            Rm::Mem(m) => self.emit_mem_operand(reg_field, m)?,
        }
        Ok(())
    }

    fn emit_mem_operand(&mut self, reg_field: RegField, m: &Mem) -> Result<(), AsmError> {
        if let Some(seg) = m.segment {
            self.buf.put1(segment_override_prefix(seg));
        }

        match m.base {
            MemBase::RipRelative(label) => {
                let modrm = 0b0000_0000 | (reg_field.rm_bits() << 3) | 0b101;
                self.buf.put1(modrm);
                let slot = self.buf.len();
                self.buf.put4(0);
                if let Some(target) = self.labels.offset_of(label) {
                    let end = self.buf.len();
                    let rel = target as i64 - end as i64;
                    self.buf.patch4(slot, rel as u32);
                } else {
                    // Forward RIP-relative references reuse the label's
                    // displacement chain; this is only exact when no
                    // trailing immediate follows (see SPEC_FULL.md §C).
                    self.labels.link_forward(&mut self.buf, label, slot, false)?;
                }
                Ok(())
            }
            MemBase::None if m.index.is_none() => {
                if self.mode.is_64bit() {
                    // Absolute disp32 in 64-bit mode needs the SIB
                    // "no base, no index" escape (mod=00, rm=100, SIB
                    // base=101 index=100) rather than mod=00 rm=101,
                    // which means RIP-relative in long mode.
                    let modrm = 0b0000_0000 | (reg_field.rm_bits() << 3) | 0b100;
                    self.buf.put1(modrm);
                    self.buf.put1(0b0010_0101); // scale=00 index=100 base=101
                } else {
                    let modrm = 0b0000_0000 | (reg_field.rm_bits() << 3) | 0b101;
                    self.buf.put1(modrm);
                }
                self.buf.put4(m.disp as u32);
                Ok(())
            }
            MemBase::None => {
                // Index only, no base: mod=00, rm=100, SIB with base=101.
                let index = m.index.unwrap();
                let modrm = 0b0000_0000 | (reg_field.rm_bits() << 3) | 0b100;
                self.buf.put1(modrm);
                let sib = (m.scale.sib_bits() << 6) | (index.rm_bits() << 3) | 0b101;
                self.buf.put1(sib);
                self.buf.put4(m.disp as u32);
                Ok(())
            }
            MemBase::Reg(base) => {
                let needs_sib = m.index.is_some() || base.rm_bits() == 0b100;
                if needs_sib {
                    let (md, disp) = choose_mod_and_disp(base.rm_bits(), m.disp);
                    let modrm = (md << 6) | (reg_field.rm_bits() << 3) | 0b100;
                    self.buf.put1(modrm);
                    let (scale_bits, index_bits) = match m.index {
                        Some(idx) => (m.scale.sib_bits(), idx.rm_bits()),
                        None => (0b00, 0b100),
                    };
                    let sib = (scale_bits << 6) | (index_bits << 3) | base.rm_bits();
                    self.buf.put1(sib);
                    emit_disp(&mut self.buf, disp);
                } else {
                    let (md, disp) = choose_mod_and_disp(base.rm_bits(), m.disp);
                    let modrm = (md << 6) | (reg_field.rm_bits() << 3) | base.rm_bits();
                    self.buf.put1(modrm);
                    emit_disp(&mut self.buf, disp);
                }
                Ok(())
            }
        }
    }

    /// Emits a register-direct ModR/M byte with no REX, prefix, or SIB
    /// handling — used by the handful of shortcut encodings (spec
    /// §4.3.2) whose opcode already encodes the register.
    pub(crate) fn emit_opcode(&mut self, opcode: &[u8]) {
        for &b in opcode {
            self.buf.put1(b);
        }
    }

    pub(crate) fn validate_size_agreement(
        &self,
        mnemonic: &'static str,
        reg_size_bytes: u8,
        mem: &Mem,
    ) -> Result<(), AsmError> {
        if let Some(mem_bytes) = mem.size.bytes() {
            if mem_bytes != reg_size_bytes {
                return Err(AsmError::InvalidOperands {
                    mnemonic,
                    detail: "memory operand size tag disagrees with the register operand's size",
                });
            }
        }
        Ok(())
    }
}

fn emit_disp(buf: &mut crate::buffer::CodeBuffer, disp: DispKind) {
    match disp {
        DispKind::None => {}
        DispKind::Disp8(d) => buf.put1(d as u8),
        DispKind::Disp32(d) => buf.put4(d as u32),
    }
}

fn segment_override_prefix(seg: Reg) -> u8 {
    match seg.index() {
        0 => 0x26, // ES
        1 => 0x2e, // CS
        2 => 0x36, // SS
        3 => 0x3e, // DS
        4 => 0x64, // FS
        5 => 0x65, // GS
        _ => 0x64,
    }
}
