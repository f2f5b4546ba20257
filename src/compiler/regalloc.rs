//! The allocation state (spec §4.4.3 step 2) and victim-selection logic
//! (step 3). Spec §9's "State save/restore" strategy is not what this
//! allocator uses for branch merge points — see `liveness.rs`'s module
//! doc and `Compiler::finalize`'s grounding note in `mod.rs` for the
//! "re-materialize on merge" approach it takes instead.
//!
//! `RegisterSet` here is the same "bit vector of available registers"
//! idea as `cranelift-codegen`'s `regalloc::register_set::RegisterSet`,
//! just flattened to the handful of concrete x86 register files this
//! crate allocates from instead of Cranelift's generic multi-class
//! register-unit scheme.

use crate::compiler::liveness::Liveness;
use crate::compiler::var::{VarId, VarLoc, Variable};
use crate::error::AsmError;
use crate::isa::registers::{Reg, RegClass};
use std::collections::HashMap;

/// Registers available for allocation, in priority order (first = most
/// preferred), for one `RegClass`. Represented as a plain `Vec` rather
/// than a bitmask: the candidate pools here are small (≤14 GPRs, ≤16
/// XMMs) and a linear scan over them is never the bottleneck a
/// multi-architecture allocator like Cranelift's has to worry about.
pub(crate) struct RegisterPool {
    class: RegClass,
    candidates: Vec<Reg>,
    taken: Vec<bool>,
}

impl RegisterPool {
    pub(crate) fn new(class: RegClass, candidates: Vec<Reg>) -> Self {
        let n = candidates.len();
        RegisterPool {
            class,
            candidates,
            taken: vec![false; n],
        }
    }

    fn index_of(&self, r: Reg) -> Option<usize> {
        self.candidates.iter().position(|&c| c == r)
    }

    pub(crate) fn is_free(&self, r: Reg) -> bool {
        self.index_of(r).map_or(false, |i| !self.taken[i])
    }

    pub(crate) fn take(&mut self, r: Reg) {
        if let Some(i) = self.index_of(r) {
            self.taken[i] = true;
        }
    }

    pub(crate) fn free(&mut self, r: Reg) {
        if let Some(i) = self.index_of(r) {
            self.taken[i] = false;
        }
    }

    /// The first free candidate, if any.
    pub(crate) fn first_free(&self) -> Option<Reg> {
        self.candidates
            .iter()
            .zip(self.taken.iter())
            .find(|(_, &t)| !t)
            .map(|(&r, _)| r)
    }

    pub(crate) fn class(&self) -> RegClass {
        self.class
    }
}

/// Carves the next spill slot out of the frame's local area, growing
/// `next_slot` (which only ever decreases from 0) downward. XMM slots
/// need 16-byte alignment (spec §8 scenario 4's alignment probe); GPR
/// slots are 8-byte-granular, which is naturally aligned since every
/// decrement is itself a multiple of 8.
fn alloc_slot(next_slot: &mut i32, class: RegClass) -> i32 {
    let (size, align): (i32, i32) = if class == RegClass::Xmm { (16, 16) } else { (8, 8) };
    let rem = (-*next_slot) % align;
    if rem != 0 {
        *next_slot -= align - rem;
    }
    *next_slot -= size;
    *next_slot
}

/// Owns both register pools and the variable location table for one
/// `Compiler::finalize` run.
pub(crate) struct Allocator<'a> {
    pub gpr: RegisterPool,
    pub xmm: RegisterPool,
    pub vars: &'a mut Vec<Variable>,
    pub owner: HashMap<Reg, VarId>,
}

impl<'a> Allocator<'a> {
    pub(crate) fn new(gpr: RegisterPool, xmm: RegisterPool, vars: &'a mut Vec<Variable>) -> Self {
        Allocator {
            gpr,
            xmm,
            vars,
            owner: HashMap::new(),
        }
    }

    fn pool_for(&mut self, class: RegClass) -> &mut RegisterPool {
        if class == RegClass::Xmm {
            &mut self.xmm
        } else {
            &mut self.gpr
        }
    }

    fn var_mut(&mut self, id: VarId) -> &mut Variable {
        self.vars.iter_mut().find(|v| v.id == id).expect("var exists")
    }

    fn var(&self, id: VarId) -> &Variable {
        self.vars.iter().find(|v| v.id == id).expect("var exists")
    }

    /// This variable's register class, given the GPR pool's own class
    /// (which fixes the concrete width `VarType::I32`/`I64` resolve to
    /// for the owning `Compiler`'s mode — see `var::VarType::reg_class`).
    pub(crate) fn class_of(&self, id: VarId) -> RegClass {
        self.var(id).ty.reg_class(self.gpr.class())
    }

    /// This variable's current location.
    pub(crate) fn loc_of(&self, id: VarId) -> VarLoc {
        self.var(id).loc
    }

    /// Marks `var` as holding a freshly computed value (spec §4.4.3:
    /// "Mark written variables as modified").
    pub(crate) fn mark_modified(&mut self, var: VarId) {
        self.var_mut(var).modified = true;
    }

    /// `var`'s configured size in bytes, for sizing its spill slot.
    pub(crate) fn size_of(&self, id: VarId) -> u8 {
        self.var(id).ty.size_bytes()
    }

    /// Ensures `var` has a physical register, choosing a victim and
    /// recording a spill/reload if necessary (spec §4.4.3 step 3's
    /// pre-hook). Returns the register it now occupies, and whether a
    /// victim was spilled (and which variable/register, so the caller
    /// can emit the spill-store), and whether `var` itself needed a
    /// reload (and from which slot).
    #[allow(clippy::type_complexity)]
    pub(crate) fn ensure_reg(
        &mut self,
        var: VarId,
        class: RegClass,
        idx: u32,
        liveness: &Liveness,
        emittables: &[crate::compiler::emittable::Emittable],
        next_slot: &mut i32,
    ) -> Result<(Reg, Option<(VarId, Reg, i32)>, Option<i32>), AsmError> {
        let current_loc = self.var_mut(var).loc;
        if let VarLoc::Reg(r) = current_loc {
            return Ok((r, None, None));
        }

        let pinned = self.var_mut(var).pinned;
        let reg = if let Some(r) = pinned {
            if !self.pool_for(class).is_free(r) {
                return Err(AsmError::VariableMisuse {
                    detail: "pinned register is already occupied and spilling it is not permitted",
                });
            }
            r
        } else if let Some(r) = self.pool_for(class).first_free() {
            r
        } else {
            self.choose_victim(class, idx, liveness, emittables)?
        };

        let mut spilled_victim = None;
        if let Some(&owner_var) = self.owner.get(&reg) {
            if owner_var != var {
                let owner = self.var_mut(owner_var);
                let modified = owner.modified;
                let slot = match owner.loc {
                    VarLoc::Stack(s) => s,
                    _ => owner.home_slot.unwrap_or_else(|| alloc_slot(next_slot, class)),
                };
                owner.loc = VarLoc::Stack(slot);
                self.owner.remove(&reg);
                if modified {
                    log::debug!("spilling {} to stack slot {}", reg, slot);
                    spilled_victim = Some((owner_var, reg, slot));
                }
            }
        }

        let reload_slot = match current_loc {
            VarLoc::Stack(s) => Some(s),
            _ => None,
        };

        self.pool_for(class).take(reg);
        self.owner.insert(reg, var);
        self.var_mut(var).loc = VarLoc::Reg(reg);
        Ok((reg, spilled_victim, reload_slot))
    }

    /// Victim selection (spec §4.4.3 step 3): skip locked/pinned
    /// registers, prefer a variable that is already spilled or whose
    /// next use is latest, tie-break on lower priority.
    fn choose_victim(
        &self,
        class: RegClass,
        idx: u32,
        liveness: &Liveness,
        emittables: &[crate::compiler::emittable::Emittable],
    ) -> Result<Reg, AsmError> {
        let pool = if class == RegClass::Xmm { &self.xmm } else { &self.gpr };
        let mut best: Option<(Reg, u32, u32)> = None; // (reg, next_use, priority)
        for (&reg, &owner_var) in self.owner.iter().filter(|(r, _)| pool.candidates.contains(*r)) {
            let owner = self.vars.iter().find(|v| v.id == owner_var).expect("owner exists");
            if owner.pinned.is_some() {
                continue;
            }
            let next_use = liveness.next_use_after(owner_var, idx, emittables);
            let candidate = (reg, next_use, owner.priority);
            best = Some(match best {
                None => candidate,
                Some(b) if candidate.1 > b.1 || (candidate.1 == b.1 && candidate.2 < b.2) => candidate,
                Some(b) => b,
            });
        }
        best.map(|(r, _, _)| r).ok_or(AsmError::VariableMisuse {
            detail: "no register available to spill: every candidate is pinned or locked",
        })
    }

    /// Frees `var`'s register without spilling it (spec §4.4.3 step 3
    /// post-hook: "for each operand variable whose last use is this
    /// instruction, free its physical register").
    pub(crate) fn free_if_last_use(&mut self, var: VarId, idx: u32, liveness: &Liveness) {
        if !liveness.is_last_use(var, idx) {
            return;
        }
        let gpr_class = self.gpr.class();
        let (loc, class) = {
            let v = self.var_mut(var);
            (v.loc, v.ty.reg_class(gpr_class))
        };
        if let VarLoc::Reg(r) = loc {
            self.pool_for(class).free(r);
            self.owner.remove(&r);
            self.var_mut(var).loc = VarLoc::Unassigned;
        }
    }

    /// Seeds `var` as already resident in `reg` without emitting any
    /// move — used at function entry to claim the ABI argument
    /// registers for incoming parameters (spec §4.4.2: "derives which
    /// registers hold arguments 0..N"). `modified` must be `true` here:
    /// the register is the parameter's only copy, so the first eviction
    /// must write it to a fresh spill slot (see `Compiler::finalize` in
    /// `mod.rs` for why an unmodified variable's eviction skips the
    /// store).
    pub(crate) fn seed_register(&mut self, var: VarId, reg: Reg, modified: bool) {
        let class = self.var_mut(var).ty.reg_class(self.gpr.class());
        self.pool_for(class).take(reg);
        self.owner.insert(reg, var);
        let v = self.var_mut(var);
        v.loc = VarLoc::Reg(reg);
        v.modified = modified;
    }

    /// Seeds `var` as already resident in a stack slot the caller set
    /// up (an incoming stack-passed argument, spec §4.4.2) without
    /// touching any register. `modified` stays `false`: the slot already
    /// holds the correct bits, so an eviction that never wrote a new
    /// value needn't write one back.
    pub(crate) fn seed_stack(&mut self, var: VarId, slot: i32) {
        let v = self.var_mut(var);
        v.loc = VarLoc::Stack(slot);
        v.home_slot = Some(slot);
        v.modified = false;
    }

    /// Unconditionally evicts `var` to a spill slot (spec §4.4.1
    /// `Compiler::spill`), regardless of its `modified` flag — force-spill
    /// is explicit user intent that the slot hold the variable's current
    /// value from this point on. A variable with a `home_slot` (an
    /// incoming stack-passed argument) reuses it rather than carving a
    /// fresh one; an unassigned variable (never yet placed in a
    /// register) is given a fresh slot with no value to write back.
    /// Returns the register it vacated (`None` if it wasn't in one) and
    /// the slot it now occupies.
    pub(crate) fn force_spill(&mut self, var: VarId, next_slot: &mut i32) -> Option<(Reg, i32)> {
        let class = self.class_of(var);
        let loc = self.var(var).loc;
        match loc {
            VarLoc::Reg(r) => {
                let slot = self.var(var).home_slot.unwrap_or_else(|| alloc_slot(next_slot, class));
                self.pool_for(class).free(r);
                self.owner.remove(&r);
                self.var_mut(var).loc = VarLoc::Stack(slot);
                Some((r, slot))
            }
            VarLoc::Unassigned => {
                let slot = alloc_slot(next_slot, class);
                self.var_mut(var).loc = VarLoc::Stack(slot);
                None
            }
            VarLoc::Stack(_) => None,
        }
    }
}
