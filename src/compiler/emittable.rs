//! The deferred Emittable list (spec §3 "Emittable (Compiler only)",
//! §4.4.1).
//!
//! The source models this as a doubly-linked list with a movable cursor
//! so that attributes can be attached to an already-appended node and so
//! that emittables can later be spliced in (e.g. a spill inserted ahead
//! of the instruction that needed it). This crate only ever appends at
//! the end — nothing here needs retroactive splicing before lowering,
//! since spills/reloads are generated directly into the lowering pass's
//! own output stream rather than back into the IR list — so a plain
//! `Vec<Emittable>` stands in for the list without losing any behavior
//! the spec requires of it.

use crate::assembler::CondCode;
use crate::compiler::var::VarId;
use crate::isa::call_conv::CallConv;
use cranelift_entity::entity_impl;
use smallvec::SmallVec;

/// An opaque label in the Compiler's own IR, bound to a real
/// [`crate::label::Label`] only once lowering creates an `Assembler`
/// (spec §4.4.1: emittables reference Target nodes, not raw offsets).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct IrLabel(u32);
entity_impl!(IrLabel, "irlabel");

/// One operand to an IR instruction: a variable, an immediate, a
/// `[var + disp]` memory reference whose base is itself a variable, or
/// an IR label (for `Jmp`/`Jcc` targets, folded into [`IrOp`] directly
/// instead since every control-flow op needs its label at the node
/// level, not buried in an operand list).
#[derive(Debug, Copy, Clone)]
pub enum IrOperand {
    Var(VarId),
    Imm(i64),
    Mem { base: VarId, disp: i32 },
}

impl IrOperand {
    pub(crate) fn var(&self) -> Option<VarId> {
        match self {
            IrOperand::Var(v) => Some(*v),
            IrOperand::Mem { base, .. } => Some(*base),
            IrOperand::Imm(_) => None,
        }
    }
}

impl From<VarId> for IrOperand {
    fn from(v: VarId) -> Self {
        IrOperand::Var(v)
    }
}
impl From<i64> for IrOperand {
    fn from(v: i64) -> Self {
        IrOperand::Imm(v)
    }
}
impl From<i32> for IrOperand {
    fn from(v: i32) -> Self {
        IrOperand::Imm(v as i64)
    }
}

/// The operation an `Instruction` emittable performs. Scoped to the
/// handful of forms the six end-to-end scenarios of spec §8 exercise
/// (integer move/arithmetic/compare, conditional move, memory
/// load/store, address-of) rather than a full mirror of the Assembler's
/// mnemonic surface — the Compiler's job is register allocation and
/// framing, not re-exposing every encoding form at the IR level.
#[derive(Debug, Copy, Clone)]
pub enum IrOp {
    /// `dst = src`.
    Mov { dst: VarId, src: IrOperand },
    /// `dst = [base + disp]`.
    Load { dst: VarId, base: VarId, disp: i32 },
    /// `[base + disp] = src`.
    Store { base: VarId, disp: i32, src: IrOperand },
    /// `dst += src` (also `Sub`/`Imul`/`And`/`Or`/`Xor` via `op`).
    Binary { op: BinOp, dst: VarId, src: IrOperand },
    /// Sets flags from `dst OP src` without writing a result.
    Cmp { lhs: VarId, rhs: IrOperand },
    /// `dst = lhs - rbp_frame_base` style address-of: computes the
    /// address of `base` (which must currently be spilled to the stack)
    /// plus `disp` into `dst`. Used by the XMM-alignment-probe scenario
    /// to read back a spill slot's own address.
    LeaStackSlot { dst: VarId, base: VarId, disp: i32 },
    /// `dst = &label` — the address a bound `IrLabel` ends up at, computed
    /// RIP-relative once lowering knows the assembler label it maps to.
    /// Used to materialize a jump table's base address.
    LeaLabel { dst: VarId, label: IrLabel },
    Jmp(IrLabel),
    Jcc(CondCode, IrLabel),
    Cmovcc { cc: CondCode, dst: VarId, src: IrOperand },
    Ret(Option<VarId>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Imul,
    And,
    Or,
    Xor,
}

/// Hints a `FunctionDecl` node carries (spec §4.4.2).
#[derive(Debug, Copy, Clone, Default)]
pub struct FunctionHints {
    /// Omit prologue/epilogue; caller owns the stack frame.
    pub naked: bool,
    /// Prefer `push`/`pop` over `mov`/`add rsp` for callee-saved
    /// registers in the 32-bit prologue/epilogue.
    pub push_pop_prologue: Option<bool>,
    /// Emit `emms` before every `ret` (spec §4.4.2 "emms-on-return").
    pub emms_on_return: bool,
}

/// The node that opens a function body (spec §4.4.2).
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub conv: CallConv,
    pub params: Vec<VarId>,
    pub ret: Option<VarId>,
    pub hints: FunctionHints,
}

/// One call site (spec §4.4.5).
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// A label bound elsewhere in this same Compiler's IR (e.g. a
    /// self-recursive function, spec §8 scenario 2).
    SelfLabel(IrLabel),
    /// A host function pointer outside the generated code.
    External(usize),
}

#[derive(Debug, Clone)]
pub struct CallNode {
    pub target: CallTarget,
    pub conv: CallConv,
    pub args: Vec<VarId>,
    pub ret: Option<VarId>,
}

/// An array of code pointers, one per target label, patched by
/// relocation once every target binds (spec §4.4.6).
#[derive(Debug, Clone)]
pub struct JumpTableNode {
    pub targets: Vec<IrLabel>,
}

/// One node of the deferred IR list (spec §3).
#[derive(Debug, Clone)]
pub enum Emittable {
    Instruction {
        op: IrOp,
        /// Variables this instruction reads, for liveness (spec §4.4.3
        /// step 1's "input to liveness analysis").
        uses: SmallVec<[VarId; 4]>,
        /// Variables this instruction writes.
        defs: SmallVec<[VarId; 2]>,
    },
    Comment(String),
    FunctionDecl(FunctionDecl),
    FunctionEnd,
    Call(CallNode),
    JumpTable(JumpTableNode),
    Align(u32),
    EmbeddedData(Vec<u8>),
    /// A bound label (spec §3's "Target").
    Target(IrLabel),
    /// Forces `var` out to its spill slot right now even if a register is
    /// free (`Compiler::spill`, used by the alignment-probe scenario to
    /// read back a slot's own address).
    ForceSpill(VarId),
    /// Marks `var` dead as of this point in program order
    /// (`Compiler::unuse`, spec §4.4.1): the numbering pass stops
    /// extending its live range past here, so the allocator frees its
    /// register at this node instead of waiting for its last real use.
    Unuse(VarId),
}

impl Emittable {
    pub(crate) fn instruction(op: IrOp) -> Self {
        let mut uses = SmallVec::new();
        let mut defs = SmallVec::new();
        match op {
            IrOp::Mov { dst, src } => {
                defs.push(dst);
                if let Some(v) = src.var() {
                    uses.push(v);
                }
            }
            IrOp::Load { dst, base, .. } => {
                defs.push(dst);
                uses.push(base);
            }
            IrOp::Store { base, src, .. } => {
                uses.push(base);
                if let Some(v) = src.var() {
                    uses.push(v);
                }
            }
            IrOp::Binary { dst, src, .. } => {
                uses.push(dst);
                defs.push(dst);
                if let Some(v) = src.var() {
                    uses.push(v);
                }
            }
            IrOp::Cmp { lhs, rhs } => {
                uses.push(lhs);
                if let Some(v) = rhs.var() {
                    uses.push(v);
                }
            }
            IrOp::LeaStackSlot { dst, base, .. } => {
                defs.push(dst);
                uses.push(base);
            }
            IrOp::LeaLabel { dst, .. } => {
                defs.push(dst);
            }
            IrOp::Jmp(_) => {}
            IrOp::Jcc(_, _) => {}
            IrOp::Cmovcc { dst, src, .. } => {
                uses.push(dst);
                defs.push(dst);
                if let Some(v) = src.var() {
                    uses.push(v);
                }
            }
            IrOp::Ret(v) => {
                if let Some(v) = v {
                    uses.push(v);
                }
            }
        }
        Emittable::Instruction { op, uses, defs }
    }

    /// Every variable this node reads or writes, for the numbering pass.
    pub(crate) fn referenced_vars(&self) -> SmallVec<[VarId; 6]> {
        let mut out = SmallVec::new();
        match self {
            Emittable::Instruction { uses, defs, .. } => {
                out.extend(uses.iter().copied());
                out.extend(defs.iter().copied());
            }
            Emittable::FunctionDecl(decl) => {
                out.extend(decl.params.iter().copied());
                out.extend(decl.ret);
            }
            Emittable::Call(call) => {
                out.extend(call.args.iter().copied());
                out.extend(call.ret);
            }
            Emittable::ForceSpill(var) => out.push(*var),
            Emittable::Unuse(var) => out.push(*var),
            _ => {}
        }
        out
    }
}
