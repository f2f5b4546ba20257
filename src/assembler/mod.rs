//! The assembler (spec §4.3): a typed emitter for x86/x86-64 that
//! produces a bit-exact byte stream, resolves forward label references,
//! and records patch sites for post-emit relocation.

mod control;
mod encode;
mod gp;
mod sse;
mod x87mmx;

pub(crate) use encode::{RegField, Rm};
pub use control::CondCode;

use crate::buffer::CodeBuffer;
use crate::error::{AsmError, AsmResult};
use crate::flags::Flags;
use crate::isa::Mode;
use crate::label::{Label, LabelPool};
use crate::logger::{Logger, NullLogger};
use crate::reloc::{Reloc, RelocMode};
use crate::vmem::{self, AllocType, VirtualMemory};
use std::sync::Arc;

/// A typed x86/x86-64 instruction emitter.
///
/// Single-threaded and non-reentrant (spec §5): an `Assembler` belongs
/// to one thread at a time and has no internal synchronization of its
/// own. Every mnemonic method latches its error into `self.error`
/// instead of returning a `Result`, matching spec §4.3.5 / §7: once the
/// first failure sticks, subsequent calls are valid but emit nothing,
/// and the caller finds out at [`Assembler::make`].
pub struct Assembler {
    pub(crate) buf: CodeBuffer,
    pub(crate) labels: LabelPool,
    relocs: Vec<Reloc>,
    error: Option<AsmError>,
    pub(crate) mode: Mode,
    flags: Flags,
    logger: Box<dyn Logger>,
    mem: Arc<VirtualMemory>,
}

impl Assembler {
    /// Creates an assembler targeting `mode` with default flags, no
    /// attached logger, and the process-wide default memory manager.
    pub fn new(mode: Mode) -> Self {
        Self::with_flags(Flags::new(mode))
    }

    /// Creates an assembler from an explicit [`Flags`] configuration.
    pub fn with_flags(flags: Flags) -> Self {
        Assembler {
            buf: CodeBuffer::new(),
            labels: LabelPool::new(),
            relocs: Vec::new(),
            error: None,
            mode: flags.mode(),
            flags,
            logger: Box::new(NullLogger),
            mem: vmem::global(),
        }
    }

    /// Points `make()` at a private memory manager instead of the
    /// process-wide default (spec §4.5: "additional instances are
    /// supported to sandbox allocations").
    pub fn with_memory(mut self, mem: Arc<VirtualMemory>) -> Self {
        self.mem = mem;
        self
    }

    /// Attaches a [`Logger`]; `None` detaches it (spec §6: "Attaching a
    /// logger is optional; when absent, no text formatting work is
    /// performed").
    pub fn set_logger(&mut self, logger: Option<Box<dyn Logger>>) {
        self.logger = logger.unwrap_or_else(|| Box::new(NullLogger));
    }

    /// The active configuration.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// The latched error, if any (spec §4.3.5: "The user is expected to
    /// consult the error code after `make()`" — also readable earlier).
    pub fn error(&self) -> Option<&AsmError> {
        self.error.as_ref()
    }

    pub(crate) fn latch(&mut self, err: AsmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Current emitted length, in bytes.
    pub fn offset(&self) -> u32 {
        self.buf.len()
    }

    /// Creates a new, initially-unused label.
    pub fn new_label(&mut self) -> Label {
        self.labels.create()
    }

    /// Binds `label` to the current offset, patching every forward
    /// reference recorded against it (spec §3, §4.3.3).
    pub fn bind(&mut self, label: Label) {
        if self.error.is_some() {
            return;
        }
        let at = self.buf.len();
        match self.labels.bind(&mut self.buf, label, at) {
            Ok(()) => self.logger.log_label(label),
            Err(e) => self.latch(e),
        }
    }

    /// Emits `0x90` NOPs (or, above 9 bytes of padding, the standard
    /// multi-byte NOP forms — spec's supplemented `align` behavior, see
    /// SPEC_FULL.md §B) until `self.offset()` is a multiple of `n`.
    /// `n` must be one of `{1, 2, 4, 8, 16, 32}`.
    pub fn align(&mut self, n: u32) {
        if self.error.is_some() {
            return;
        }
        if !matches!(n, 1 | 2 | 4 | 8 | 16 | 32) {
            self.latch(AsmError::InvalidOperands {
                mnemonic: "align",
                detail: "alignment must be one of 1, 2, 4, 8, 16, 32",
            });
            return;
        }
        let mut pad = (n - (self.buf.len() % n)) % n;
        if pad == 0 {
            return;
        }
        self.logger.log_align(n);
        while pad > 0 {
            let chunk = pad.min(9) as usize;
            self.buf.put_bytes(long_nop(chunk));
            pad -= chunk as u32;
        }
    }

    /// Appends raw bytes verbatim (spec §4.3.1 `embed`).
    pub fn embed(&mut self, bytes: &[u8]) {
        if self.error.is_some() {
            return;
        }
        self.buf.put_bytes(bytes);
    }

    /// Finalizes the assembled code into fresh executable memory,
    /// applying every recorded relocation against the final address
    /// (spec §4.3.4). On success the `Assembler` is left clean and ready
    /// for reuse; on failure the latched error (or a fresh
    /// allocation/label error) is returned and nothing is reset, so the
    /// caller can inspect `self.error()`.
    pub fn make(&mut self) -> AsmResult<ExecutableBuffer> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.labels.all_bound()?;
        let size = self.buf.len() as usize;
        if size == 0 {
            return Err(AsmError::Allocation {
                reason: "nothing was emitted",
            });
        }
        let dest = self.mem.alloc(size, AllocType::Freeable)?;
        // SAFETY: `dest` was just allocated with room for exactly
        // `size` bytes and is writable until we hand it to the caller.
        unsafe {
            core::ptr::copy_nonoverlapping(self.buf.data().as_ptr(), dest, size);
        }
        apply_relocations(dest, &self.relocs, &self.labels)?;

        self.buf.clear();
        self.relocs.clear();
        self.labels = LabelPool::new();

        Ok(ExecutableBuffer {
            ptr: dest,
            len: size,
            mem: self.mem.clone(),
        })
    }

    pub(crate) fn record_reloc(&mut self, offset: u32, size: u8, mode: RelocMode) {
        self.relocs.push(Reloc::new(offset, size, mode));
    }

    pub(crate) fn log_instruction(&mut self, mnemonic: &str, operands: &[crate::operand::Operand]) {
        self.logger.log_instruction(mnemonic, operands);
    }
}

/// Runs `$body` (an `AsmResult<()>` expression using `$self`) only if no
/// error has latched yet, folding any new error into the latch instead
/// of propagating it — the pattern every mnemonic method in `gp`,
/// `control`, `sse`, and `x87mmx` uses to implement spec §4.3.5's "first
/// failure sticks, later calls emit nothing" rule without repeating the
/// same four lines in every method body.
macro_rules! checked {
    ($self:ident, $body:expr) => {{
        if $self.error.is_none() {
            if let Err(e) = $body {
                $self.latch(e);
            }
        }
        $self
    }};
}
pub(crate) use checked;

/// The standard Intel multi-byte NOP encodings for padding lengths
/// 1..9, used by [`Assembler::align`] (SPEC_FULL.md §B).
fn long_nop(len: usize) -> &'static [u8] {
    const NOPS: [&[u8]; 10] = [
        &[],
        &[0x90],
        &[0x66, 0x90],
        &[0x0f, 0x1f, 0x00],
        &[0x0f, 0x1f, 0x40, 0x00],
        &[0x0f, 0x1f, 0x44, 0x00, 0x00],
        &[0x66, 0x0f, 0x1f, 0x44, 0x00, 0x00],
        &[0x0f, 0x1f, 0x80, 0x00, 0x00, 0x00, 0x00],
        &[0x0f, 0x1f, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        &[0x66, 0x0f, 0x1f, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
    ];
    NOPS[len]
}

fn apply_relocations(dest: *mut u8, relocs: &[Reloc], labels: &LabelPool) -> AsmResult<()> {
    for reloc in relocs {
        match reloc.mode {
            RelocMode::AbsoluteLabel(label) => {
                let target = labels.offset_of(label).ok_or(AsmError::LabelMisuse {
                    detail: "relocation against an unbound label",
                })?;
                let abs = dest as u64 + target as u64;
                write_at(dest, reloc.offset, reloc.size, abs);
            }
            RelocMode::RelativeLabel(label) => {
                let target = labels.offset_of(label).ok_or(AsmError::LabelMisuse {
                    detail: "relocation against an unbound label",
                })?;
                let end = reloc.offset as i64 + reloc.size as i64;
                let rel = target as i64 - end;
                write_at(dest, reloc.offset, reloc.size, rel as u64);
            }
            RelocMode::AbsoluteExternal(target) => {
                write_at(dest, reloc.offset, reloc.size, target as u64);
            }
            RelocMode::RelativeExternal { target, max_len } => {
                relax_and_patch_external_jump(dest, reloc.offset, reloc.size, max_len, target);
            }
        }
    }
    Ok(())
}

/// Shrinks a near (`E9 rel32`) jump-to-external relocation to the short
/// (`EB rel8`) form when the final delta fits, padding the leftover
/// bytes with `0xCC` so disassemblers and exception unwinders see valid
/// instructions up to the next real one (spec §4.3.3).
fn relax_and_patch_external_jump(dest: *mut u8, disp_offset: u32, disp_size: u8, max_len: u8, target: usize) {
    let opcode_offset = disp_offset - (max_len as u32 - disp_size as u32);
    let near_end = disp_offset as i64 + disp_size as i64;
    let near_rel = target as i64 - (dest as i64 + near_end);

    let short_end = opcode_offset as i64 + 2;
    let short_rel = target as i64 - (dest as i64 + short_end);

    if short_rel >= i8::MIN as i64 && short_rel <= i8::MAX as i64 {
        log::trace!("relaxing near jump at offset {} to short form", opcode_offset);
        // SAFETY: `opcode_offset..opcode_offset+max_len` was reserved by
        // the caller that recorded this relocation.
        unsafe {
            *dest.add(opcode_offset as usize) = 0xeb;
            *dest.add(opcode_offset as usize + 1) = short_rel as i8 as u8;
            for i in 2..max_len as usize {
                *dest.add(opcode_offset as usize + i) = 0xcc;
            }
        }
    } else {
        write_at(dest, disp_offset, disp_size, near_rel as u64);
    }
}

fn write_at(dest: *mut u8, offset: u32, size: u8, value: u64) {
    // SAFETY: callers only ever pass offsets/sizes that were reserved as
    // placeholder bytes in the buffer this memory was copied from.
    unsafe {
        let p = dest.add(offset as usize);
        match size {
            1 => *p = value as u8,
            4 => core::ptr::copy_nonoverlapping(&(value as u32).to_le_bytes()[0], p, 4),
            8 => core::ptr::copy_nonoverlapping(&value.to_le_bytes()[0], p, 8),
            _ => unreachable!("relocation slots are 1, 4, or 8 bytes"),
        }
    }
}

/// Executable code produced by [`Assembler::make`]. Owns a reference to
/// the [`VirtualMemory`] manager that allocated it and returns the
/// backing pages via `free` on drop.
pub struct ExecutableBuffer {
    ptr: *mut u8,
    len: usize,
    mem: Arc<VirtualMemory>,
}

// SAFETY: the backing memory is immutable machine code once `make()`
// returns; sharing the pointer across threads is exactly the use case
// spec §5 describes ("Multiple threads may concurrently compile and
// install code").
unsafe impl Send for ExecutableBuffer {}
unsafe impl Sync for ExecutableBuffer {}

impl ExecutableBuffer {
    /// Raw pointer to the first byte of the generated code.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the buffer is empty (never produced by `make`, which
    /// rejects a zero-length body, but kept for API symmetry).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reinterprets the entry point as a callable function. The caller
    /// must ensure `F` matches the signature actually emitted — there is
    /// no way for asmjit to check this.
    ///
    /// # Safety
    /// `F` must be an `extern "C" fn` (or `unsafe extern "C" fn`) pointer
    /// type whose signature matches the machine code at `self.as_ptr()`.
    pub unsafe fn as_fn<F: Copy>(&self) -> F {
        let ptr = self.ptr;
        core::mem::transmute_copy::<*const u8, F>(&ptr)
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        self.mem.free(self.ptr, self.len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::registers::{EAX, RAX};

    #[test]
    fn fresh_assembler_has_no_error() {
        let asm = Assembler::new(Mode::X64);
        assert!(asm.error().is_none());
    }

    #[test]
    fn align_pads_to_boundary() {
        let mut asm = Assembler::new(Mode::X64);
        asm.embed(&[0x90, 0x90, 0x90]);
        asm.align(16);
        assert_eq!(asm.offset() % 16, 0);
    }

    #[test]
    fn latched_error_blocks_further_emission() {
        let mut asm = Assembler::new(Mode::X86);
        asm.latch(AsmError::InvalidOperands {
            mnemonic: "test",
            detail: "forced for test",
        });
        let before = asm.offset();
        asm.embed(&[0x90]);
        assert_eq!(asm.offset(), before);
        assert!(asm.error().is_some());
    }

    #[test]
    fn make_rejects_unbound_linked_label() {
        let mut asm = Assembler::new(Mode::X64);
        let l = asm.new_label();
        asm.jmp_label(l);
        assert!(asm.make().is_err());
    }

    #[test]
    fn mode_selects_gpr_width_in_register_moves() {
        let mut asm32 = Assembler::new(Mode::X86);
        asm32.mov_rr(EAX, EAX);
        assert!(asm32.error().is_none());

        let mut asm64 = Assembler::new(Mode::X64);
        asm64.mov_rr(RAX, RAX);
        assert!(asm64.error().is_none());
    }
}
