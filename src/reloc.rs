//! Relocation records (spec §3, "Relocation record").
//!
//! A relocation is a promise to patch bytes already written into the
//! [`CodeBuffer`](crate::buffer::CodeBuffer) once the code's final load
//! address is known — at `make()`/`finalize()` time, after the
//! executable memory manager has handed back a destination page.

use crate::buffer::CodeOffset;
use crate::label::Label;

/// What kind of value a [`Reloc`] patches in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RelocMode {
    /// The absolute address of a label, written as a 4- or 8-byte pointer.
    AbsoluteLabel(Label),
    /// The address of `label`, relative to the byte just past the patch
    /// slot (i.e. RIP-relative or E8/E9-style relative displacement).
    RelativeLabel(Label),
    /// The absolute address of a symbol external to this buffer (e.g. a
    /// host function the generated code calls into).
    AbsoluteExternal(usize),
    /// The address of an external symbol, relative to the byte just past
    /// the patch slot. `max_len` is the instruction's encoded length in
    /// its generic (non-relaxed) form, used so the relocator can shrink a
    /// near (`E9`) jump to a short (`EB`) one and pad the remainder with
    /// `0xCC` (spec §4.3.3).
    RelativeExternal { target: usize, max_len: u8 },
}

/// A single post-emit patch: where, how wide, and what to write there.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Reloc {
    /// Offset of the first byte of the patch slot within the code buffer.
    pub offset: CodeOffset,
    /// Width of the slot in bytes (1, 4, or 8).
    pub size: u8,
    /// What value to compute and how to interpret `offset`.
    pub mode: RelocMode,
}

impl Reloc {
    /// Builds a relocation record.
    pub fn new(offset: CodeOffset, size: u8, mode: RelocMode) -> Self {
        Reloc { offset, size, mode }
    }
}
