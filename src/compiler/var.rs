//! Compiler variables (spec §3 "Variable (Compiler only)", §4.4.1).
//!
//! Modeled as a `cranelift_entity` map the same way [`crate::label::Label`]
//! models labels: `VarId` is an opaque handle, `Variable` the record the
//! [`crate::compiler::Compiler`] keeps per handle.

use crate::isa::registers::{Reg, RegClass};
use cranelift_entity::entity_impl;

/// An opaque reference to a Compiler variable, valid only against the
/// `Compiler` that created it (spec §3: "owned by the Function node that
/// created them").
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VarId(u32);
entity_impl!(VarId, "var");

/// The value type a [`VarId`] holds, which in turn selects its register
/// class and size for allocation purposes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VarType {
    /// 32-bit integer or pointer value in 32-bit mode.
    I32,
    /// 64-bit integer or pointer value; only legal when the owning
    /// Compiler targets `Mode::X64` (spec §9 open question, resolved in
    /// DESIGN.md: rejected rather than allocated to a register pair).
    I64,
    /// Double-precision float held in an XMM register.
    F64,
    /// Single-precision float held in an XMM register.
    F32,
}

impl VarType {
    pub(crate) fn reg_class(self, gpr_class: RegClass) -> RegClass {
        match self {
            VarType::I32 | VarType::I64 => gpr_class,
            VarType::F32 | VarType::F64 => RegClass::Xmm,
        }
    }

    pub(crate) fn size_bytes(self) -> u8 {
        match self {
            VarType::I32 | VarType::F32 => 4,
            VarType::I64 | VarType::F64 => 8,
        }
    }
}

/// Where a variable currently lives, tracked live by the allocator (spec
/// §3 "current-location: {unassigned | physical-reg i | stack-slot s}").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VarLoc {
    Unassigned,
    Reg(Reg),
    Stack(i32),
}

/// One Compiler variable record (spec §3).
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VarId,
    pub ty: VarType,
    /// Default 10; lower sorts first for spill-victim preference (spec
    /// §4.4.1: "lower = more likely to be spilled").
    pub priority: u32,
    /// Set by `Compiler::alloc(var, reg)`; the allocator must honor this
    /// exactly or latch `VariableMisuse` (spec §9 "Register allocator
    /// locking").
    pub pinned: Option<Reg>,
    pub loc: VarLoc,
    /// The stack slot this variable was seeded from at function entry
    /// (`Allocator::seed_stack`, an incoming stack-passed argument),
    /// kept for the variable's whole lifetime even after it has been
    /// loaded into a register: a later eviction reuses this slot instead
    /// of carving a fresh, uninitialized one (see
    /// `Allocator::ensure_reg`'s victim handling in `regalloc.rs`).
    pub home_slot: Option<i32>,
    /// Set once a `Store`/in-place arithmetic op writes this variable;
    /// an unmodified spilled variable can be dropped instead of written
    /// back (it can always be reloaded from its original source... in
    /// this crate's simplified model every spill slot is fresh, so the
    /// flag only gates whether a spill-out move is actually emitted).
    pub modified: bool,
}

impl Variable {
    pub(crate) fn new(id: VarId, ty: VarType) -> Self {
        Variable {
            id,
            ty,
            priority: 10,
            pinned: None,
            loc: VarLoc::Unassigned,
            home_slot: None,
            modified: false,
        }
    }
}
