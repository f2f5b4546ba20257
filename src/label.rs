//! Labels and the self-linked displacement chain (spec §3, §4.3.3).
//!
//! A [`Label`] is an opaque entity reference, the same pattern
//! `cranelift-codegen`'s `ir::entities` uses for `Value`/`Inst`/`Ebb`
//! (`cranelift_entity::entity_impl!`). What it *points at* is tracked
//! separately in a [`LabelPool`], because unlike Cranelift's IR a label
//! here is created against an `Assembler`/`Compiler` instance rather than
//! interned globally.
//!
//! The pool keeps exactly the single signed "pos" integer per label that
//! spec §3 describes, and the forward-reference chain lives inside the
//! [`CodeBuffer`](crate::buffer::CodeBuffer) itself rather than in a side
//! table — the "self-linked displacement chain" design note in spec §9.
//! An external `HashMap<Label, Vec<CodeOffset>>` would be behaviorally
//! identical; this crate keeps the in-buffer version because it's the
//! one the original source actually ships and it avoids an extra
//! allocation per label.

use crate::buffer::{CodeBuffer, CodeOffset};
use crate::error::AsmError;
use cranelift_entity::{entity_impl, PrimaryMap};

/// An opaque, at-most-once-bound reference to a code offset.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Label(u32);
entity_impl!(Label, "label");

/// `pos` encoding for a single label, per spec §3:
/// * `0`  — unused,
/// * `<0` — bound, binding offset is `-pos - 1`,
/// * `>0` — linked, `pos - 1` is the chain head offset in the buffer.
type Pos = i64;

/// Owns the `pos` state for every label created against one
/// `Assembler`/`Compiler`.
#[derive(Default)]
pub struct LabelPool {
    pos: PrimaryMap<Label, Pos>,
}

impl LabelPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self {
            pos: PrimaryMap::new(),
        }
    }

    /// Creates a new, unused label.
    pub fn create(&mut self) -> Label {
        self.pos.push(0)
    }

    /// True once `bind` has been called for this label.
    pub fn is_bound(&self, label: Label) -> bool {
        self.pos[label] < 0
    }

    /// True if at least one forward reference has been linked and the
    /// label has not yet been bound.
    pub fn is_linked(&self, label: Label) -> bool {
        self.pos[label] > 0
    }

    /// The bound offset, if any.
    pub fn offset_of(&self, label: Label) -> Option<CodeOffset> {
        let pos = self.pos[label];
        if pos < 0 {
            Some((-pos - 1) as CodeOffset)
        } else {
            None
        }
    }

    /// Registers a forward reference: `slot_offset` is the offset of a
    /// 4-byte placeholder the caller has already appended to `buf`
    /// (typically zeroed). `uncond_jump` distinguishes an unconditional
    /// jump's chain link (eligible for the short-form relaxation the
    /// type bit exists to mark) from every other relative reference.
    ///
    /// Returns the link's encoded placeholder value so tests can assert
    /// on the chain shape; callers normally ignore it.
    pub fn link_forward(
        &mut self,
        buf: &mut CodeBuffer,
        label: Label,
        slot_offset: CodeOffset,
        uncond_jump: bool,
    ) -> Result<u32, AsmError> {
        let cur = self.pos[label];
        if cur < 0 {
            return Err(AsmError::LabelMisuse {
                detail: "forward reference to an already-bound label",
            });
        }
        let type_bit = uncond_jump as u32;
        let encoded = ((cur as u32) << 1) | type_bit;
        buf.patch4(slot_offset, encoded);
        self.pos[label] = slot_offset as Pos + 1;
        Ok(encoded)
    }

    /// Binds `label` to `target`, walking its forward-reference chain
    /// and patching each slot to `target - (slot_offset + 4)` (spec §3
    /// "Binding invariance"). Fails if the label was already bound.
    pub fn bind(&mut self, buf: &mut CodeBuffer, label: Label, target: CodeOffset) -> Result<(), AsmError> {
        let mut cur = self.pos[label];
        if cur < 0 {
            return Err(AsmError::LabelMisuse {
                detail: "label already bound",
            });
        }
        while cur > 0 {
            let slot = (cur - 1) as CodeOffset;
            let encoded = buf.read4(slot);
            let next = (encoded >> 1) as Pos;
            let rel = target as i64 - (slot as i64 + 4);
            buf.patch4(slot, rel as u32);
            cur = next;
        }
        self.pos[label] = -(target as Pos) - 1;
        Ok(())
    }

    /// True if every created label has been bound — checked at
    /// `make()`/`finalize()` time (spec §7 "Label misuse": "leaving a
    /// linked label unbound at `make()`").
    pub fn all_bound(&self) -> Result<(), AsmError> {
        for (_, &pos) in self.pos.iter() {
            if pos > 0 {
                return Err(AsmError::LabelMisuse {
                    detail: "linked label left unbound",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_label_has_zero_pos() {
        let mut pool = LabelPool::new();
        let l = pool.create();
        assert!(!pool.is_bound(l));
        assert!(!pool.is_linked(l));
    }

    #[test]
    fn binding_invariance_single_forward_ref() {
        let mut pool = LabelPool::new();
        let mut buf = CodeBuffer::new();
        let l = pool.create();
        buf.put4(0); // placeholder at offset 0
        pool.link_forward(&mut buf, l, 0, false).unwrap();
        assert!(pool.is_linked(l));
        pool.bind(&mut buf, l, 10).unwrap();
        assert_eq!(buf.read4(0), (10i64 - 4) as u32);
        assert!(pool.is_bound(l));
        assert_eq!(pool.offset_of(l), Some(10));
    }

    #[test]
    fn binding_invariance_multiple_forward_refs() {
        let mut pool = LabelPool::new();
        let mut buf = CodeBuffer::new();
        let l = pool.create();

        buf.put4(0);
        pool.link_forward(&mut buf, l, 0, false).unwrap();
        buf.put_fill(0, 4);
        buf.put4(0);
        pool.link_forward(&mut buf, l, 8, true).unwrap();

        pool.bind(&mut buf, l, 100).unwrap();
        assert_eq!(buf.read4(0), (100i64 - 4) as u32);
        assert_eq!(buf.read4(8), (100i64 - 12) as u32);
    }

    #[test]
    fn double_bind_is_an_error() {
        let mut pool = LabelPool::new();
        let mut buf = CodeBuffer::new();
        let l = pool.create();
        pool.bind(&mut buf, l, 0).unwrap();
        assert!(pool.bind(&mut buf, l, 1).is_err());
    }

    #[test]
    fn unbound_linked_label_is_rejected() {
        let mut pool = LabelPool::new();
        let mut buf = CodeBuffer::new();
        let l = pool.create();
        buf.put4(0);
        pool.link_forward(&mut buf, l, 0, false).unwrap();
        assert!(pool.all_bound().is_err());
    }
}
