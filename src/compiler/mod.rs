//! The register-allocating Compiler IR.
//!
//! Where [`crate::assembler::Assembler`] is a one-to-one emitter, a
//! [`Compiler`] lets the caller work against an unbounded set of
//! [`Variable`]s instead of physical registers. The caller builds up a
//! deferred list of [`emittable::Emittable`] nodes (one `FunctionDecl`,
//! a body of instructions/calls/labels, one implicit epilogue); calling
//! [`Compiler::finalize`] runs a linear-scan-style allocation pass over
//! that list in program order, lowers each node against a fresh
//! `Assembler`, and produces the same [`crate::assembler::ExecutableBuffer`]
//! the lower-level API does.
//!
//! The allocator here is deliberately simpler than a full
//! `cranelift-codegen` backend: it has no control-flow graph, only the
//! emittable list's own linear order, and it tracks liveness
//! conservatively across branches rather than with dominance-aware
//! interval splitting (see [`liveness`]'s module doc for exactly what
//! that conservatism costs). That is enough to handle the straight-line
//! and call-heavy code this crate's Assembler layer is meant to
//! generate; a caller that needs real loop-aware register pressure
//! modeling should build its own CFG on top of a sequence of `Compiler`
//! instances, one per basic block.

mod emittable;
mod liveness;
mod regalloc;
mod var;

pub use emittable::{FunctionHints, IrLabel};
pub use var::{VarId, VarType, Variable};

use crate::assembler::{Assembler, CondCode};
use crate::error::{AsmError, AsmResult};
use crate::flags::Flags;
use crate::isa::call_conv::CallConv;
use crate::isa::registers::*;
use crate::isa::{Mode, Reg, RegClass};
use crate::label::Label;
use crate::logger::{Logger, NullLogger};
use crate::operand::{Imm, Mem, Operand, Size};
use crate::reloc::RelocMode;
use crate::vmem::VirtualMemory;
use cranelift_entity::EntityRef;

use emittable::{BinOp, CallNode, CallTarget, Emittable, FunctionDecl, IrOp, IrOperand, JumpTableNode};
use liveness::Liveness;
use regalloc::{Allocator, RegisterPool};
use var::VarLoc;

use std::collections::HashMap;
use std::sync::Arc;

pub(crate) use crate::assembler::checked;

/// A register-allocating IR builder for exactly one function body.
///
/// A `Compiler` is used once: [`Compiler::declare_function`] opens the
/// body, a sequence of factory methods (`mov`, `add`, `load`, `call_*`,
/// `jmp`, ...) appends to the deferred emittable list, and
/// [`Compiler::finalize`] consumes the `Compiler` state and produces
/// executable code. Every factory method follows the same "first error
/// sticks" discipline the `Assembler` uses: a method that fails latches
/// the error and returns `&mut Self` unchanged, so a chain of calls
/// never needs to check each one individually.
pub struct Compiler {
    mode: Mode,
    flags: Flags,
    conv: Option<CallConv>,
    vars: Vec<Variable>,
    emittables: Vec<Emittable>,
    ir_labels: u32,
    entry_label: Option<IrLabel>,
    error: Option<AsmError>,
    logger: Box<dyn Logger>,
    mem: Option<Arc<VirtualMemory>>,
}

impl Compiler {
    /// Creates a compiler targeting `mode` with default flags.
    pub fn new(mode: Mode) -> Self {
        Self::with_flags(Flags::new(mode))
    }

    /// Creates a compiler from an explicit [`Flags`] configuration; the
    /// mode the eventual `Assembler` targets comes from `flags.mode()`.
    pub fn with_flags(flags: Flags) -> Self {
        Compiler {
            mode: flags.mode(),
            flags,
            conv: None,
            vars: Vec::new(),
            emittables: Vec::new(),
            ir_labels: 0,
            entry_label: None,
            error: None,
            logger: Box::new(NullLogger),
            mem: None,
        }
    }

    /// Points the eventual `Assembler::make()` at a private memory
    /// manager instead of the process-wide default.
    pub fn with_memory(mut self, mem: Arc<VirtualMemory>) -> Self {
        self.mem = Some(mem);
        self
    }

    /// Attaches a [`Logger`]; `None` detaches it. Only `Comment`
    /// emittables and the final lowered instruction stream route
    /// through it — see [`Compiler::comment`].
    pub fn set_logger(&mut self, logger: Option<Box<dyn Logger>>) {
        self.logger = logger.unwrap_or_else(|| Box::new(NullLogger));
    }

    /// The active configuration.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// The latched error, if any.
    pub fn error(&self) -> Option<&AsmError> {
        self.error.as_ref()
    }

    fn latch(&mut self, err: AsmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn gpr_class(&self) -> RegClass {
        match self.conv {
            Some(conv) => conv.gpr_class(),
            None if self.mode.is_64bit() => RegClass::Gpq,
            None => RegClass::Gpd,
        }
    }

    fn check_var(&self, id: VarId) -> AsmResult<()> {
        if self.vars.iter().any(|v| v.id == id) {
            Ok(())
        } else {
            Err(AsmError::VariableMisuse {
                detail: "variable does not belong to this compiler",
            })
        }
    }

    fn var_mut(&mut self, id: VarId) -> &mut Variable {
        self.vars.iter_mut().find(|v| v.id == id).expect("checked by caller")
    }

    // -- variables -----------------------------------------------------

    /// Declares a new variable of type `ty`, initially unassigned to any
    /// register or stack slot. Declaring an `I64` variable against a
    /// `Compiler` whose mode is `Mode::X86` latches an error: this crate
    /// does not split a 64-bit value across a register pair in 32-bit
    /// mode.
    pub fn new_var(&mut self, ty: VarType) -> VarId {
        if ty == VarType::I64 && !self.mode.is_64bit() {
            self.latch(AsmError::VariableMisuse {
                detail: "a 64-bit variable requires a 64-bit compiler mode",
            });
        }
        let id = VarId::new(self.vars.len());
        self.vars.push(Variable::new(id, ty));
        id
    }

    /// Pins `var` to `reg` for the rest of the function: the allocator
    /// must place it there and may never choose `reg` as a spill victim
    /// on `var`'s behalf.
    pub fn alloc(&mut self, var: VarId, reg: Reg) -> &mut Self {
        checked!(self, {
            self.check_var(var)?;
            let class = self.gpr_class();
            let v = self.var_mut(var);
            if v.ty.reg_class(class) != reg.class() {
                return Err(AsmError::VariableMisuse {
                    detail: "pinned register's class does not match the variable's type",
                });
            }
            v.pinned = Some(reg);
            Ok(())
        })
    }

    /// Forces `var` out to its spill slot right now, even if a register
    /// is free — used to materialize the address of a local whose value
    /// doesn't matter beyond its storage location (see
    /// [`Compiler::address_of`]).
    pub fn spill(&mut self, var: VarId) -> &mut Self {
        checked!(self, {
            self.check_var(var)?;
            self.emittables.push(Emittable::ForceSpill(var));
            Ok(())
        })
    }

    /// Marks `var` dead: it is never referenced again, even if later
    /// code happens to still hold its id. Lets the allocator free its
    /// register here rather than at its last real use (spec §4.4.1).
    pub fn unuse(&mut self, var: VarId) -> &mut Self {
        checked!(self, {
            self.check_var(var)?;
            self.emittables.push(Emittable::Unuse(var));
            Ok(())
        })
    }

    /// Sets `var`'s spill priority; lower sorts first for eviction.
    /// Defaults to 10.
    pub fn set_priority(&mut self, var: VarId, priority: u32) -> &mut Self {
        checked!(self, {
            self.check_var(var)?;
            self.var_mut(var).priority = priority;
            Ok(())
        })
    }

    // -- function framing ------------------------------------------------

    /// Opens the function body: declares the calling convention,
    /// allocates one fresh [`VarId`] per entry in `params` (in ABI
    /// order), and one more for the return value if `ret` is `Some`.
    /// Must be called exactly once, before any other factory method.
    pub fn declare_function(&mut self, conv: CallConv, params: &[VarType], ret: Option<VarType>) -> (Vec<VarId>, Option<VarId>) {
        if self.conv.is_some() {
            self.latch(AsmError::VariableMisuse {
                detail: "declare_function called more than once on the same compiler",
            });
            return (Vec::new(), None);
        }
        if conv.is_64bit() != self.mode.is_64bit() {
            self.latch(AsmError::VariableMisuse {
                detail: "calling convention's bitness does not match the compiler's mode",
            });
        }
        self.conv = Some(conv);
        let param_ids: Vec<VarId> = params.iter().map(|&ty| self.new_var(ty)).collect();
        let ret_id = ret.map(|ty| self.new_var(ty));
        self.emittables.push(Emittable::FunctionDecl(FunctionDecl {
            conv,
            params: param_ids.clone(),
            ret: ret_id,
            hints: FunctionHints::default(),
        }));
        (param_ids, ret_id)
    }

    /// Overrides the function's [`FunctionHints`]; must be called after
    /// `declare_function`.
    pub fn set_hints(&mut self, hints: FunctionHints) -> &mut Self {
        checked!(self, {
            match self.emittables.first_mut() {
                Some(Emittable::FunctionDecl(decl)) => {
                    decl.hints = hints;
                    Ok(())
                }
                _ => Err(AsmError::VariableMisuse {
                    detail: "set_hints called before declare_function",
                }),
            }
        })
    }

    /// Closes the function body. Optional: `finalize` appends its own
    /// epilogue regardless, this just marks the boundary for tooling
    /// that walks the emittable list.
    pub fn end_function(&mut self) -> &mut Self {
        self.emittables.push(Emittable::FunctionEnd);
        self
    }

    // -- instructions ----------------------------------------------------

    /// `dst = src`.
    pub fn mov(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.instruction(dst, src, |dst, src| IrOp::Mov { dst, src })
    }

    /// `dst += src`.
    pub fn add(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.binary(BinOp::Add, dst, src)
    }

    /// `dst -= src`.
    pub fn sub(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.binary(BinOp::Sub, dst, src)
    }

    /// `dst *= src` (signed). `src` may not be a memory operand: there is
    /// no three-operand `imul` form that reads one of its sources from
    /// memory while also taking an immediate, so this crate restricts
    /// `imul` to register and immediate sources only.
    pub fn imul(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.binary(BinOp::Imul, dst, src)
    }

    /// `dst &= src`.
    pub fn and(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.binary(BinOp::And, dst, src)
    }

    /// `dst |= src`.
    pub fn or(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.binary(BinOp::Or, dst, src)
    }

    /// `dst ^= src`.
    pub fn xor(&mut self, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.binary(BinOp::Xor, dst, src)
    }

    fn binary(&mut self, op: BinOp, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        self.instruction(dst, src, move |dst, src| IrOp::Binary { op, dst, src })
    }

    fn instruction(&mut self, dst: VarId, src: impl Into<IrOperand>, make: impl FnOnce(VarId, IrOperand) -> IrOp) -> &mut Self {
        checked!(self, {
            self.check_var(dst)?;
            let src = src.into();
            if let Some(v) = src.var() {
                self.check_var(v)?;
            }
            self.emittables.push(Emittable::instruction(make(dst, src)));
            Ok(())
        })
    }

    /// Sets flags from `lhs - rhs` without writing a result.
    pub fn cmp(&mut self, lhs: VarId, rhs: impl Into<IrOperand>) -> &mut Self {
        checked!(self, {
            self.check_var(lhs)?;
            let rhs = rhs.into();
            if let Some(v) = rhs.var() {
                self.check_var(v)?;
            }
            self.emittables.push(Emittable::instruction(IrOp::Cmp { lhs, rhs }));
            Ok(())
        })
    }

    /// `dst = src` if `cc` holds, else `dst` is unchanged. `src` may not
    /// be an immediate: x86 has no immediate-source `cmovcc` form.
    pub fn cmovcc(&mut self, cc: CondCode, dst: VarId, src: impl Into<IrOperand>) -> &mut Self {
        checked!(self, {
            self.check_var(dst)?;
            let src = src.into();
            if matches!(src, IrOperand::Imm(_)) {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "cmovcc",
                    detail: "cmovcc has no immediate-source form",
                });
            }
            if let Some(v) = src.var() {
                self.check_var(v)?;
            }
            self.emittables.push(Emittable::instruction(IrOp::Cmovcc { cc, dst, src }));
            Ok(())
        })
    }

    /// `dst = [base + disp]`.
    pub fn load(&mut self, dst: VarId, base: VarId, disp: i32) -> &mut Self {
        checked!(self, {
            self.check_var(dst)?;
            self.check_var(base)?;
            self.emittables.push(Emittable::instruction(IrOp::Load { dst, base, disp }));
            Ok(())
        })
    }

    /// `[base + disp] = src`.
    pub fn store(&mut self, base: VarId, disp: i32, src: impl Into<IrOperand>) -> &mut Self {
        checked!(self, {
            self.check_var(base)?;
            let src = src.into();
            if let Some(v) = src.var() {
                self.check_var(v)?;
            }
            self.emittables.push(Emittable::instruction(IrOp::Store { base, disp, src }));
            Ok(())
        })
    }

    /// `dst = &of` — the address of `of`'s spill slot, plus `disp`.
    /// `of` must already be spilled to the stack by the time lowering
    /// reaches this node; this method forces that itself by inserting a
    /// [`Compiler::spill`] immediately before the address computation.
    pub fn address_of(&mut self, dst: VarId, of: VarId, disp: i32) -> &mut Self {
        checked!(self, {
            self.check_var(dst)?;
            self.check_var(of)?;
            self.emittables.push(Emittable::ForceSpill(of));
            self.emittables
                .push(Emittable::instruction(IrOp::LeaStackSlot { dst, base: of, disp }));
            Ok(())
        })
    }

    /// `dst = &label`, RIP-relative, once `label` is bound.
    pub fn lea_label(&mut self, dst: VarId, label: IrLabel) -> &mut Self {
        checked!(self, {
            self.check_var(dst)?;
            self.emittables.push(Emittable::instruction(IrOp::LeaLabel { dst, label }));
            Ok(())
        })
    }

    /// Returns from the function with `var` as the integer/pointer
    /// return value (or no value if `None`). Always valid, regardless of
    /// where it appears in the emittable list: `finalize` rewrites it
    /// into "move into the ABI return register, then jump to the shared
    /// epilogue" rather than relying on this being the last node.
    pub fn ret(&mut self, var: Option<VarId>) -> &mut Self {
        checked!(self, {
            if let Some(v) = var {
                self.check_var(v)?;
            }
            self.emittables.push(Emittable::instruction(IrOp::Ret(var)));
            Ok(())
        })
    }

    // -- labels and control flow ------------------------------------------

    /// Creates a new, initially-unbound label in this compiler's own IR
    /// namespace (distinct from [`crate::label::Label`], which only
    /// exists once `finalize` builds a real `Assembler`).
    pub fn new_ir_label(&mut self) -> IrLabel {
        let l = IrLabel::new(self.ir_labels as usize);
        self.ir_labels += 1;
        l
    }

    /// Binds `label` at the current position in the emittable list.
    pub fn bind_label(&mut self, label: IrLabel) -> &mut Self {
        self.emittables.push(Emittable::Target(label));
        self
    }

    /// The label a self-recursive call should target: the function's true
    /// entry point, *before* the prologue `finalize` synthesizes. A label
    /// bound mid-body with [`Compiler::bind_label`] sits after the
    /// prologue, so a `call` to it would re-enter with the caller's own
    /// frame still live instead of building a fresh one — this label is
    /// bound separately by `finalize` itself, at the real function start,
    /// so [`Compiler::call_self`] produces an ordinary recursive call.
    pub fn entry_label(&mut self) -> IrLabel {
        if let Some(l) = self.entry_label {
            return l;
        }
        let l = self.new_ir_label();
        self.entry_label = Some(l);
        l
    }

    /// Unconditional jump to `label`.
    pub fn jmp(&mut self, label: IrLabel) -> &mut Self {
        self.emittables.push(Emittable::instruction(IrOp::Jmp(label)));
        self
    }

    /// Conditional jump to `label`.
    pub fn jcc(&mut self, cc: CondCode, label: IrLabel) -> &mut Self {
        self.emittables.push(Emittable::instruction(IrOp::Jcc(cc, label)));
        self
    }

    /// Appends a jump table: one relocatable pointer-sized slot per
    /// entry in `targets`, patched to each target label's final address
    /// once the function is lowered. The caller is expected to bind a
    /// label immediately before this call (via [`Compiler::new_ir_label`]
    /// / [`Compiler::bind_label`]) and reference that label from
    /// [`Compiler::lea_label`] to compute the table's own base address.
    pub fn new_jump_table(&mut self, targets: &[IrLabel]) -> &mut Self {
        self.emittables.push(Emittable::JumpTable(JumpTableNode {
            targets: targets.to_vec(),
        }));
        self
    }

    // -- calls -------------------------------------------------------------

    /// Calls a label bound elsewhere in this same compiler's IR (a
    /// self-recursive call). `label` should normally be
    /// [`Compiler::entry_label`] so the recursive call re-enters through a
    /// full prologue rather than a mid-body label. Returns the call's
    /// return-value variable, if `ret_ty` is `Some`.
    pub fn call_self(&mut self, label: IrLabel, conv: CallConv, args: &[VarId], ret_ty: Option<VarType>) -> Option<VarId> {
        self.call(CallTarget::SelfLabel(label), conv, args, ret_ty)
    }

    /// Calls a host function pointer outside the generated code.
    pub fn call_external(&mut self, target: *const u8, conv: CallConv, args: &[VarId], ret_ty: Option<VarType>) -> Option<VarId> {
        self.call(CallTarget::External(target as usize), conv, args, ret_ty)
    }

    fn call(&mut self, target: CallTarget, conv: CallConv, args: &[VarId], ret_ty: Option<VarType>) -> Option<VarId> {
        if self.error.is_some() {
            return None;
        }
        if let Some(VarType::F32) | Some(VarType::F64) = ret_ty {
            self.latch(AsmError::Unencodable {
                mnemonic: "call",
                detail: "floating-point call return values are not supported",
            });
            return None;
        }
        for &a in args {
            if let Err(e) = self.check_var(a) {
                self.latch(e);
                return None;
            }
        }
        let ret = ret_ty.map(|ty| self.new_var(ty));
        self.emittables.push(Emittable::Call(CallNode {
            target,
            conv,
            args: args.to_vec(),
            ret,
        }));
        ret
    }

    // -- raw bytes and diagnostics ------------------------------------------

    /// Logs `text` through the attached logger at this point in the
    /// emittable list; emits no code.
    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.emittables.push(Emittable::Comment(text.into()));
        self
    }

    /// Pads with NOPs until the lowered offset is a multiple of `n`,
    /// which must be one of `{1, 2, 4, 8, 16, 32}`.
    pub fn align(&mut self, n: u32) -> &mut Self {
        checked!(self, {
            if !matches!(n, 1 | 2 | 4 | 8 | 16 | 32) {
                return Err(AsmError::InvalidOperands {
                    mnemonic: "align",
                    detail: "alignment must be one of 1, 2, 4, 8, 16, 32",
                });
            }
            self.emittables.push(Emittable::Align(n));
            Ok(())
        })
    }

    /// Appends raw bytes verbatim at this point in the lowered stream.
    pub fn embed(&mut self, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.emittables.push(Emittable::EmbeddedData(bytes.into()));
        self
    }

    // -- finalize ------------------------------------------------------------

    /// Runs allocation and lowering over the whole emittable list and
    /// assembles the result, consuming this compiler's IR state.
    ///
    /// This is a two-phase pipeline: phase one walks the emittable list
    /// once, assigning each variable reference a physical register or
    /// stack slot and recording an abstract [`LOp`] per node (never
    /// touching a real `Assembler`); phase two builds the `Assembler`,
    /// emits the prologue, replays the recorded `LOp`s (creating a real
    /// `Label` the first time an `IrLabel` is referenced), emits the
    /// epilogue, and calls [`crate::assembler::Assembler::make`].
    /// Splitting it this way means the prologue — which needs the final
    /// frame size and the final set of clobbered callee-saved registers
    /// — can be emitted before any of the body, without a backpatching
    /// pass over already-encoded bytes.
    pub fn finalize(&mut self) -> AsmResult<crate::assembler::ExecutableBuffer> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let conv = self.conv.ok_or(AsmError::VariableMisuse {
            detail: "finalize called before declare_function",
        })?;
        let emittables = std::mem::take(&mut self.emittables);
        let mut vars = std::mem::take(&mut self.vars);
        let decl = match emittables.first() {
            Some(Emittable::FunctionDecl(d)) => d.clone(),
            _ => {
                return Err(AsmError::VariableMisuse {
                    detail: "a function body must begin with declare_function",
                })
            }
        };

        let int_arg_regs = conv.int_arg_regs();
        if decl.hints.naked && decl.params.len() > int_arg_regs.len() {
            return Err(AsmError::VariableMisuse {
                detail: "a naked function cannot take more parameters than fit in argument registers",
            });
        }

        let liveness = Liveness::compute(&emittables);
        let gpr_class = conv.gpr_class();
        let gpr_pool = RegisterPool::new(gpr_class, gpr_candidates(gpr_class));
        let xmm_pool = RegisterPool::new(RegClass::Xmm, xmm_candidates());
        let mut alloc = Allocator::new(gpr_pool, xmm_pool, &mut vars);

        let word = if conv.is_64bit() { 8i32 } else { 4i32 };
        let mut stack_index = 0i32;
        for (i, &param) in decl.params.iter().enumerate() {
            if i < int_arg_regs.len() {
                alloc.seed_register(param, int_arg_regs[i], true);
            } else {
                alloc.seed_stack(param, 2 * word + stack_index * word);
                stack_index += 1;
            }
        }

        let epilogue = IrLabel::new(self.ir_labels as usize);
        self.ir_labels += 1;

        let mut lw = Lowering {
            alloc,
            liveness: &liveness,
            emittables: &emittables,
            next_slot: 0,
            lops: Vec::new(),
            clobbered: Vec::new(),
            conv,
            epilogue,
        };

        for (idx, node) in emittables.iter().enumerate() {
            let idx = idx as u32;
            if let Emittable::Comment(text) = node {
                self.logger.log_comment(text);
                continue;
            }
            lw.lower(idx, node)?;
        }

        let frame_bytes = -lw.next_slot;
        let push_pop = decl.hints.push_pop_prologue.unwrap_or(self.flags.push_pop_prologue());
        let frame_reg = if conv.is_64bit() { RBP } else { EBP };
        let stack_reg = if conv.is_64bit() { RSP } else { ESP };

        let mut asm = Assembler::with_flags(self.flags);
        if let Some(mem) = &self.mem {
            asm = asm.with_memory(mem.clone());
        }

        let mut labels: HashMap<IrLabel, Label> = HashMap::new();

        if let Some(entry) = self.entry_label {
            let entry_lbl = label_for(&mut asm, &mut labels, entry);
            asm.bind(entry_lbl);
        }

        if !decl.hints.naked {
            asm.push(frame_reg);
            asm.mov_rr(frame_reg, stack_reg);
            if push_pop {
                for &r in &lw.clobbered {
                    asm.push(r);
                }
                if frame_bytes > 0 {
                    asm.sub_ri(stack_reg, frame_bytes);
                }
            } else {
                let total = frame_bytes + lw.clobbered.len() as i32 * word;
                if total > 0 {
                    asm.sub_ri(stack_reg, total);
                }
                for (i, &r) in lw.clobbered.iter().enumerate() {
                    asm.mov_mr(Mem::base_disp(stack_reg, i as i32 * word, Size::of_reg_class(r.class())), r);
                }
            }
        }

        for op in &lw.lops {
            emit_lop(&mut asm, op, &mut labels, stack_reg);
        }

        let epilogue_label = label_for(&mut asm, &mut labels, epilogue);
        asm.bind(epilogue_label);

        if decl.hints.emms_on_return {
            asm.emms();
        }

        if !decl.hints.naked {
            if push_pop {
                if frame_bytes > 0 {
                    asm.add_ri(stack_reg, frame_bytes);
                }
                for &r in lw.clobbered.iter().rev() {
                    asm.pop(r);
                }
            } else {
                for (i, &r) in lw.clobbered.iter().enumerate() {
                    asm.mov_rm(r, Mem::base_disp(stack_reg, i as i32 * word, Size::of_reg_class(r.class())));
                }
                let total = frame_bytes + lw.clobbered.len() as i32 * word;
                if total > 0 {
                    asm.add_ri(stack_reg, total);
                }
            }
            asm.pop(frame_reg);
        }

        if conv.callee_pops_args() {
            let popped = decl.params.len().saturating_sub(int_arg_regs.len()) as u16 * word as u16;
            asm.ret_imm16(popped);
        } else {
            asm.ret();
        }

        asm.make()
    }
}

/// The general-purpose registers available for variable allocation, in
/// priority order, excluding the stack and frame pointers (always
/// reserved for framing, never a candidate).
fn gpr_candidates(class: RegClass) -> Vec<Reg> {
    if class == RegClass::Gpq {
        vec![RAX, RCX, RDX, RBX, RSI, RDI, R8, R9, R10, R11, R12, R13, R14, R15]
    } else {
        vec![EAX, ECX, EDX, EBX, ESI, EDI]
    }
}

fn xmm_candidates() -> Vec<Reg> {
    vec![
        XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,
    ]
}

/// One lowered operation, abstracted just enough to defer label
/// resolution and prologue sizing to the end of phase one. Everything
/// here maps onto exactly one `Assembler` mnemonic call in phase two.
enum LOp {
    MovRR(Reg, Reg),
    MovRI(Reg, Imm),
    MovRM(Reg, Mem),
    MovMR(Mem, Reg),
    MovMI(Mem, Imm),
    Bin(BinOp, Reg, Operand),
    Cmp(Reg, Operand),
    Cmovcc(CondCode, Reg, Operand),
    Lea(Reg, Mem),
    LeaLabel(Reg, IrLabel),
    Jmp(IrLabel),
    Jcc(CondCode, IrLabel),
    Target(IrLabel),
    Align(u32),
    Embed(Vec<u8>),
    JumpTable(Vec<IrLabel>),
    Push(Reg),
    SubRspImm(i32),
    AddRspImm(i32),
    CallLabel(IrLabel),
    CallExternal(usize, Reg),
}

fn label_for(asm: &mut Assembler, labels: &mut HashMap<IrLabel, Label>, l: IrLabel) -> Label {
    *labels.entry(l).or_insert_with(|| asm.new_label())
}

fn emit_lop(asm: &mut Assembler, op: &LOp, labels: &mut HashMap<IrLabel, Label>, stack_reg: Reg) {
    match *op {
        LOp::MovRR(dst, src) => {
            asm.mov_rr(dst, src);
        }
        LOp::MovRI(dst, imm) => {
            asm.mov_ri(dst, imm);
        }
        LOp::MovRM(dst, mem) => {
            asm.mov_rm(dst, mem);
        }
        LOp::MovMR(mem, src) => {
            asm.mov_mr(mem, src);
        }
        LOp::MovMI(mem, imm) => {
            asm.mov_mi(mem, imm);
        }
        LOp::Bin(bop, dst, src) => emit_bin(asm, bop, dst, src),
        LOp::Cmp(lhs, rhs) => emit_cmp(asm, lhs, rhs),
        LOp::Cmovcc(cc, dst, src) => match src {
            Operand::Reg(r) => {
                asm.cmovcc_rr(cc, dst, r);
            }
            Operand::Mem(m) => {
                asm.cmovcc_rm(cc, dst, m);
            }
            _ => unreachable!("cmovcc source is always a register or a memory operand"),
        },
        LOp::Lea(dst, mem) => {
            asm.lea(dst, mem);
        }
        LOp::LeaLabel(dst, l) => {
            let lbl = label_for(asm, labels, l);
            asm.lea(dst, Mem::rip_relative(lbl, Size::of_reg_class(dst.class())));
        }
        LOp::Jmp(l) => {
            let lbl = label_for(asm, labels, l);
            asm.jmp_label(lbl);
        }
        LOp::Jcc(cc, l) => {
            let lbl = label_for(asm, labels, l);
            asm.jcc_label(cc, lbl);
        }
        LOp::Target(l) => {
            let lbl = label_for(asm, labels, l);
            asm.bind(lbl);
        }
        LOp::Align(n) => {
            asm.align(n);
        }
        LOp::Embed(ref bytes) => {
            asm.embed(bytes);
        }
        LOp::JumpTable(ref targets) => {
            let slot_size: u8 = if asm.mode.is_64bit() { 8 } else { 4 };
            for &t in targets {
                let lbl = label_for(asm, labels, t);
                let off = asm.offset();
                asm.embed(&vec![0u8; slot_size as usize]);
                asm.record_reloc(off, slot_size, RelocMode::AbsoluteLabel(lbl));
            }
        }
        LOp::Push(r) => {
            asm.push(r);
        }
        LOp::SubRspImm(n) => {
            asm.sub_ri(stack_reg, n);
        }
        LOp::AddRspImm(n) => {
            asm.add_ri(stack_reg, n);
        }
        LOp::CallLabel(l) => {
            let lbl = label_for(asm, labels, l);
            asm.call_label(lbl);
        }
        LOp::CallExternal(ptr, scratch) => {
            asm.call_external(scratch, ptr as *const u8);
        }
    }
}

macro_rules! bin_dispatch {
    ($asm:expr, $dst:expr, $src:expr, $rr:ident, $rm:ident, $ri:ident) => {
        match $src {
            Operand::Reg(s) => {
                $asm.$rr($dst, s);
            }
            Operand::Mem(m) => {
                $asm.$rm($dst, m);
            }
            Operand::Imm(i) => {
                $asm.$ri($dst, i);
            }
            Operand::Label(_) => unreachable!("a label cannot appear in an arithmetic position"),
        }
    };
}

fn emit_bin(asm: &mut Assembler, op: BinOp, dst: Reg, src: Operand) {
    match op {
        BinOp::Add => bin_dispatch!(asm, dst, src, add_rr, add_rm, add_ri),
        BinOp::Sub => bin_dispatch!(asm, dst, src, sub_rr, sub_rm, sub_ri),
        BinOp::And => bin_dispatch!(asm, dst, src, and_rr, and_rm, and_ri),
        BinOp::Or => bin_dispatch!(asm, dst, src, or_rr, or_rm, or_ri),
        BinOp::Xor => bin_dispatch!(asm, dst, src, xor_rr, xor_rm, xor_ri),
        BinOp::Imul => match src {
            Operand::Reg(s) => {
                asm.imul_rr(dst, s);
            }
            Operand::Imm(i) => {
                asm.imul_rri(dst, dst, i);
            }
            _ => unreachable!("imul only supports a register or an immediate source"),
        },
    }
}

fn emit_cmp(asm: &mut Assembler, lhs: Reg, rhs: Operand) {
    match rhs {
        Operand::Reg(r) => {
            asm.cmp_rr(lhs, r);
        }
        Operand::Mem(m) => {
            asm.cmp_rm(lhs, m);
        }
        Operand::Imm(i) => {
            asm.cmp_ri(lhs, i);
        }
        Operand::Label(_) => unreachable!("a label cannot appear in a compare"),
    }
}

/// Resolves a set of register-to-register moves that may need to happen
/// "in parallel" (as at a call site, where every argument's current
/// register generally differs from its ABI slot, and those slots can
/// overlap with other arguments' current registers) into a sequence
/// ordinary moves can execute safely. Pairs are `(from, to)`.
///
/// The approach: repeatedly take any move whose destination is not also
/// some other pending move's source — it is safe to execute right now,
/// since nothing downstream still needs the old value there. When every
/// remaining move is part of a cycle, break it by rescuing the value
/// currently in the first pending move's destination into `scratch`,
/// then redirect any move that was reading from that register to read
/// from `scratch` instead.
fn resolve_parallel_moves(pairs: &[(Reg, Reg)], scratch: Reg) -> Vec<(Reg, Reg)> {
    let mut remaining: Vec<(Reg, Reg)> = pairs.iter().copied().filter(|&(s, d)| s != d).collect();
    let mut result = Vec::new();
    loop {
        let safe = remaining.iter().position(|&(_, d)| !remaining.iter().any(|&(s2, _)| s2 == d));
        match safe {
            Some(pos) => result.push(remaining.remove(pos)),
            None => {
                if remaining.is_empty() {
                    break;
                }
                let (_, d0) = remaining[0];
                result.push((d0, scratch));
                for pair in remaining.iter_mut() {
                    if pair.0 == d0 {
                        pair.0 = scratch;
                    }
                }
            }
        }
    }
    result
}

/// Per-`finalize()` lowering state: the allocator, the liveness table,
/// the original emittable list (read-only, needed for victim selection
/// and last-use tests), and the `LOp` stream being built up.
struct Lowering<'a> {
    alloc: Allocator<'a>,
    liveness: &'a Liveness,
    emittables: &'a [Emittable],
    next_slot: i32,
    lops: Vec<LOp>,
    clobbered: Vec<Reg>,
    conv: CallConv,
    epilogue: IrLabel,
}

impl<'a> Lowering<'a> {
    fn frame_reg(&self) -> Reg {
        if self.conv.is_64bit() {
            RBP
        } else {
            EBP
        }
    }

    fn stack_reg(&self) -> Reg {
        if self.conv.is_64bit() {
            RSP
        } else {
            ESP
        }
    }

    fn note_clobber(&mut self, reg: Reg) {
        if self.conv.callee_saved().contains(&reg) && !self.clobbered.contains(&reg) {
            self.clobbered.push(reg);
        }
    }

    fn is_modified(&self, var: VarId) -> bool {
        self.alloc.vars.iter().find(|v| v.id == var).map(|v| v.modified).unwrap_or(false)
    }

    /// Unconditionally evicts `var`, emitting a spill-store only if its
    /// value was actually written since it last held a stack copy.
    fn spill_var(&mut self, var: VarId) {
        let modified = self.is_modified(var);
        if let Some((r, slot)) = self.alloc.force_spill(var, &mut self.next_slot) {
            if modified {
                let mem = Mem::base_disp(self.frame_reg(), slot, Size::of_reg_class(r.class()));
                self.lops.push(LOp::MovMR(mem, r));
            }
        }
    }

    fn ensure(&mut self, var: VarId, idx: u32) -> AsmResult<Reg> {
        let class = self.alloc.class_of(var);
        let (reg, spilled, reload_slot) = self.alloc.ensure_reg(var, class, idx, self.liveness, self.emittables, &mut self.next_slot)?;
        if let Some((_, victim_reg, slot)) = spilled {
            let mem = Mem::base_disp(self.frame_reg(), slot, Size::of_reg_class(victim_reg.class()));
            self.lops.push(LOp::MovMR(mem, victim_reg));
        }
        if let Some(slot) = reload_slot {
            let mem = Mem::base_disp(self.frame_reg(), slot, Size::of_reg_class(reg.class()));
            self.lops.push(LOp::MovRM(reg, mem));
        }
        self.note_clobber(reg);
        Ok(reg)
    }

    fn materialize(&mut self, operand: IrOperand, idx: u32, size: Size) -> AsmResult<Operand> {
        match operand {
            IrOperand::Imm(v) => Ok(Operand::Imm(Imm::new(v))),
            IrOperand::Var(v) => Ok(Operand::Reg(self.ensure(v, idx)?)),
            IrOperand::Mem { base, disp } => {
                let r = self.ensure(base, idx)?;
                Ok(Operand::Mem(Mem::base_disp(r, disp, size)))
            }
        }
    }

    fn post(&mut self, node: &Emittable, idx: u32) {
        for v in node.referenced_vars() {
            self.alloc.free_if_last_use(v, idx, self.liveness);
        }
    }

    fn lower(&mut self, idx: u32, node: &Emittable) -> AsmResult<()> {
        match node {
            Emittable::FunctionDecl(_) | Emittable::FunctionEnd => {}
            Emittable::Comment(_) => unreachable!("comments are filtered out before lowering"),
            Emittable::Target(label) => self.lops.push(LOp::Target(*label)),
            Emittable::Align(n) => self.lops.push(LOp::Align(*n)),
            Emittable::EmbeddedData(bytes) => self.lops.push(LOp::Embed(bytes.clone())),
            Emittable::ForceSpill(var) => self.spill_var(*var),
            Emittable::Unuse(_) => {}
            Emittable::JumpTable(jt) => self.lops.push(LOp::JumpTable(jt.targets.clone())),
            Emittable::Call(call) => self.lower_call(idx, call)?,
            Emittable::Instruction { op, .. } => self.lower_instruction(idx, op)?,
        }
        self.post(node, idx);
        Ok(())
    }

    fn lower_instruction(&mut self, idx: u32, op: &IrOp) -> AsmResult<()> {
        match *op {
            IrOp::Mov { dst, src } => {
                let size = Size::of_reg_class(self.alloc.class_of(dst));
                let value = self.materialize(src, idx, size)?;
                let dst_reg = self.ensure(dst, idx)?;
                self.alloc.mark_modified(dst);
                match value {
                    Operand::Reg(r) => {
                        if r != dst_reg {
                            self.lops.push(LOp::MovRR(dst_reg, r));
                        }
                    }
                    Operand::Mem(m) => self.lops.push(LOp::MovRM(dst_reg, m)),
                    Operand::Imm(i) => self.lops.push(LOp::MovRI(dst_reg, i)),
                    Operand::Label(_) => unreachable!("Mov never materializes a label operand"),
                }
            }
            IrOp::Load { dst, base, disp } => {
                let size = Size::of_reg_class(self.alloc.class_of(dst));
                let base_reg = self.ensure(base, idx)?;
                let dst_reg = self.ensure(dst, idx)?;
                self.alloc.mark_modified(dst);
                self.lops.push(LOp::MovRM(dst_reg, Mem::base_disp(base_reg, disp, size)));
            }
            IrOp::Store { base, disp, src } => {
                let base_reg = self.ensure(base, idx)?;
                let size = src.var().map(|v| Size::of_reg_class(self.alloc.class_of(v))).unwrap_or(Size::Dword);
                let value = self.materialize(src, idx, size)?;
                let mem = Mem::base_disp(base_reg, disp, size);
                match value {
                    Operand::Reg(r) => self.lops.push(LOp::MovMR(mem, r)),
                    Operand::Imm(i) => self.lops.push(LOp::MovMI(mem, i)),
                    _ => {
                        return Err(AsmError::InvalidOperands {
                            mnemonic: "store",
                            detail: "store source must be a variable or an immediate",
                        })
                    }
                }
            }
            IrOp::Binary { op: bop, dst, src } => {
                let dst_reg = self.ensure(dst, idx)?;
                if let BinOp::Imul = bop {
                    if matches!(src, IrOperand::Mem { .. }) {
                        return Err(AsmError::InvalidOperands {
                            mnemonic: "imul",
                            detail: "imul has no memory-operand source form in this crate",
                        });
                    }
                }
                let size = Size::of_reg_class(self.alloc.class_of(dst));
                let value = self.materialize(src, idx, size)?;
                self.alloc.mark_modified(dst);
                self.lops.push(LOp::Bin(bop, dst_reg, value));
            }
            IrOp::Cmp { lhs, rhs } => {
                let lhs_reg = self.ensure(lhs, idx)?;
                let size = Size::of_reg_class(self.alloc.class_of(lhs));
                let value = self.materialize(rhs, idx, size)?;
                self.lops.push(LOp::Cmp(lhs_reg, value));
            }
            IrOp::LeaStackSlot { dst, base, disp } => {
                let slot = match self.alloc.loc_of(base) {
                    VarLoc::Stack(s) => s,
                    _ => {
                        return Err(AsmError::VariableMisuse {
                            detail: "address-of target must already be spilled to the stack",
                        })
                    }
                };
                let dst_reg = self.ensure(dst, idx)?;
                self.alloc.mark_modified(dst);
                self.lops
                    .push(LOp::Lea(dst_reg, Mem::base_disp(self.frame_reg(), slot + disp, Size::Unspecified)));
            }
            IrOp::LeaLabel { dst, label } => {
                let dst_reg = self.ensure(dst, idx)?;
                self.alloc.mark_modified(dst);
                self.lops.push(LOp::LeaLabel(dst_reg, label));
            }
            IrOp::Jmp(label) => self.lops.push(LOp::Jmp(label)),
            IrOp::Jcc(cc, label) => self.lops.push(LOp::Jcc(cc, label)),
            IrOp::Cmovcc { cc, dst, src } => {
                let dst_reg = self.ensure(dst, idx)?;
                let size = Size::of_reg_class(self.alloc.class_of(dst));
                let value = self.materialize(src, idx, size)?;
                self.alloc.mark_modified(dst);
                self.lops.push(LOp::Cmovcc(cc, dst_reg, value));
            }
            IrOp::Ret(var) => {
                if let Some(v) = var {
                    if self.alloc.class_of(v) == RegClass::Xmm {
                        return Err(AsmError::Unencodable {
                            mnemonic: "ret",
                            detail: "floating-point return values are not supported",
                        });
                    }
                    let want = self.conv.int_return_reg();
                    let reg = self.ensure(v, idx)?;
                    if reg != want {
                        self.lops.push(LOp::MovRR(want, reg));
                        self.note_clobber(want);
                    }
                }
                self.lops.push(LOp::Jmp(self.epilogue));
            }
        }
        Ok(())
    }

    fn lower_call(&mut self, idx: u32, call: &CallNode) -> AsmResult<()> {
        let resident: Vec<VarId> = self
            .alloc
            .vars
            .iter()
            .filter(|v| matches!(v.loc, VarLoc::Reg(_)))
            .map(|v| v.id)
            .collect();
        for var in resident {
            if call.args.contains(&var) {
                continue;
            }
            self.spill_var(var);
        }

        let mut srcs = Vec::with_capacity(call.args.len());
        for &a in &call.args {
            srcs.push(self.ensure(a, idx)?);
        }

        let arg_regs = call.conv.int_arg_regs();
        let mut reg_moves: Vec<(Reg, Reg)> = Vec::new();
        let mut stack_args: Vec<Reg> = Vec::new();
        for (i, &src) in srcs.iter().enumerate() {
            if i < arg_regs.len() {
                reg_moves.push((src, arg_regs[i]));
            } else {
                stack_args.push(src);
            }
        }

        let used: Vec<Reg> = reg_moves.iter().flat_map(|&(s, d)| [s, d]).collect();
        let scratch = gpr_candidates(call.conv.gpr_class())
            .into_iter()
            .find(|r| !used.contains(r))
            .unwrap_or_else(|| call.conv.int_return_reg());

        let word = if call.conv.is_64bit() { 8i32 } else { 4i32 };
        let shadow = call.conv.shadow_space_bytes() as i32;
        let stack_bytes = stack_args.len() as i32 * word;
        let use_push = call.conv.callee_pops_args();
        let align = call.conv.call_stack_alignment() as i32;
        let raw = shadow + stack_bytes;
        let adjust = if align > 1 { (raw + align - 1) / align * align } else { raw };

        if use_push {
            for &src in stack_args.iter().rev() {
                self.lops.push(LOp::Push(src));
            }
        } else if adjust > 0 {
            self.lops.push(LOp::SubRspImm(adjust));
            for (i, &src) in stack_args.iter().enumerate() {
                let offset = shadow + i as i32 * word;
                let mem = Mem::base_disp(self.stack_reg(), offset, Size::of_reg_class(src.class()));
                self.lops.push(LOp::MovMR(mem, src));
            }
        }

        for (src, dst) in resolve_parallel_moves(&reg_moves, scratch) {
            self.lops.push(LOp::MovRR(dst, src));
            self.note_clobber(dst);
        }

        match call.target {
            CallTarget::SelfLabel(label) => self.lops.push(LOp::CallLabel(label)),
            CallTarget::External(ptr) => self.lops.push(LOp::CallExternal(ptr, scratch)),
        }

        if !use_push && adjust > 0 {
            self.lops.push(LOp::AddRspImm(adjust));
        }

        if let Some(ret) = call.ret {
            let reg = call.conv.int_return_reg();
            self.alloc.seed_register(ret, reg, true);
            self.note_clobber(reg);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_function_finalizes_cleanly() {
        let mut c = Compiler::new(Mode::X64);
        let (params, ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64], Some(VarType::I64));
        let x = params[0];
        c.mov(ret.unwrap(), x);
        c.ret(ret);
        let buf = c.finalize().expect("identity function should assemble");
        assert!(buf.len() > 0);
    }

    #[test]
    fn arithmetic_and_spill_pressure_finalizes() {
        let mut c = Compiler::new(Mode::X64);
        let (params, ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64, VarType::I64], Some(VarType::I64));
        let a = params[0];
        let b = params[1];
        let mut acc = Vec::new();
        for _ in 0..20 {
            let v = c.new_var(VarType::I64);
            c.mov(v, a);
            c.add(v, b);
            acc.push(v);
        }
        let r = ret.unwrap();
        c.mov(r, acc[0]);
        for &v in &acc[1..] {
            c.add(r, v);
        }
        c.ret(ret);
        let buf = c.finalize().expect("heavy register pressure should still assemble via spills");
        assert!(buf.len() > 0);
    }

    #[test]
    fn self_recursive_call_finalizes() {
        let mut c = Compiler::new(Mode::X64);
        let (params, ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64], Some(VarType::I64));
        let n = params[0];
        let entry = c.entry_label();
        let one = c.new_var(VarType::I64);
        c.mov(one, 1i64);
        let cc_le = CondCode::Le;
        let base_case = c.new_ir_label();
        c.cmp(n, one);
        c.jcc(cc_le, base_case);

        let n_minus_one = c.new_var(VarType::I64);
        c.mov(n_minus_one, n);
        c.sub(n_minus_one, 1i64);
        let sub_ret = c.call_self(entry, CallConv::SystemV64, &[n_minus_one], Some(VarType::I64));
        let result = c.new_var(VarType::I64);
        c.mov(result, n);
        c.imul(result, sub_ret.unwrap());
        c.ret(Some(result));

        c.bind_label(base_case);
        c.ret(Some(n));

        let buf = c.finalize().expect("a self-recursive factorial should assemble");
        assert!(buf.len() > 0);
    }

    #[test]
    fn eight_argument_fastcall_spills_the_overflow_args_to_the_stack() {
        let mut c = Compiler::new(Mode::X86);
        let params: Vec<VarType> = (0..8).map(|_| VarType::I32).collect();
        let (params, ret) = c.declare_function(CallConv::Fastcall, &params, Some(VarType::I32));
        let r = ret.unwrap();
        c.mov(r, params[0]);
        for &p in &params[1..] {
            c.add(r, p);
        }
        c.ret(ret);
        let buf = c.finalize().expect("eight-argument fastcall should assemble");
        assert!(buf.len() > 0);
    }

    #[test]
    fn address_of_a_spilled_variable_finalizes() {
        let mut c = Compiler::new(Mode::X64);
        let (_, ret) = c.declare_function(CallConv::SystemV64, &[], Some(VarType::I64));
        let v = c.new_var(VarType::I64);
        c.mov(v, 42i64);
        let addr = c.new_var(VarType::I64);
        c.address_of(addr, v, 0);
        c.load(ret.unwrap(), addr, 0);
        c.ret(ret);
        let buf = c.finalize().expect("reading back a spill slot's own address should assemble");
        assert!(buf.len() > 0);
    }

    #[test]
    fn conditional_move_sequence_finalizes() {
        let mut c = Compiler::new(Mode::X64);
        let (params, ret) = c.declare_function(CallConv::SystemV64, &[VarType::I64, VarType::I64], Some(VarType::I64));
        let a = params[0];
        let b = params[1];
        c.cmp(a, b);
        let r = ret.unwrap();
        c.mov(r, a);
        c.cmovcc(CondCode::L, r, b);
        c.ret(ret);
        let buf = c.finalize().expect("a cmovcc-based max sequence should assemble");
        assert!(buf.len() > 0);
    }

    #[test]
    fn sixty_four_bit_variable_rejected_in_32_bit_mode() {
        let mut c = Compiler::new(Mode::X86);
        c.new_var(VarType::I64);
        assert!(c.error().is_some());
    }

    #[test]
    fn cmovcc_rejects_an_immediate_source() {
        let mut c = Compiler::new(Mode::X64);
        let (_, ret) = c.declare_function(CallConv::SystemV64, &[], Some(VarType::I64));
        let v = ret.unwrap();
        c.cmovcc(CondCode::E, v, 1i64);
        assert!(c.error().is_some());
    }

    #[test]
    fn pinning_a_variable_to_the_wrong_class_register_latches() {
        let mut c = Compiler::new(Mode::X64);
        let (_, ret) = c.declare_function(CallConv::SystemV64, &[], Some(VarType::F64));
        let v = ret.unwrap();
        c.alloc(v, RAX);
        assert!(c.error().is_some());
    }

    #[test]
    fn finalize_before_declare_function_is_an_error() {
        let mut c = Compiler::new(Mode::X64);
        assert!(c.finalize().is_err());
    }
}
