//! Numbering and liveness (spec §4.4.3 step 1).
//!
//! Modeled on `cranelift-codegen`'s `regalloc::liveness` pass, but
//! flattened: Cranelift numbers within a CFG of extended basic blocks;
//! this crate's Emittable list has no block structure, only a single
//! linear program order (spec §4.4.1 "doubly-linked list ... with a
//! movable cursor"). Live ranges are therefore computed directly over
//! that order rather than over dominance-tree block boundaries.
//!
//! This is a conservative approximation for code with backward branches:
//! a variable whose first and last textual use straddle a loop back-edge
//! is treated as live for the whole straddled range, which is always
//! safe (it may hold a register slightly longer than a CFG-aware
//! allocator would) and is exact for straight-line code and for the
//! forward-only control flow the `FunctionDecl`/`Call`/`Jcc` shapes in
//! spec §8's end-to-end scenarios use.
//!
//! Back-edges are found by matching every `Jmp`/`Jcc`'s `IrLabel` against
//! the index of its `Target` node: when the target's index is at or
//! before the jump's own index, the jump closes a loop, and every
//! variable whose recorded last use falls inside `[target, jump]` has
//! its last use widened to the jump site. Without this, a variable
//! defined before the loop and read only once per iteration (its
//! textual last use sitting before the back-edge) would have its
//! register freed — and handed to a loop-local variable — partway
//! through the first iteration.

use crate::compiler::emittable::{Emittable, IrLabel, IrOp};
use crate::compiler::var::VarId;
use cranelift_entity::SecondaryMap;
use std::collections::HashMap;

/// `(first, last)` instruction index a variable is referenced at.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct LiveRange {
    pub first: Option<u32>,
    pub last: Option<u32>,
}

/// The result of the numbering pass: a live range per variable, indexed
/// directly by [`VarId`].
pub(crate) struct Liveness {
    pub ranges: SecondaryMap<VarId, LiveRange>,
}

impl Liveness {
    /// Numbers every emittable in program order and records, per
    /// variable, the first and last instruction index referencing it.
    /// A variable marked dead by `Emittable::Unuse` stops accumulating
    /// uses past that point (spec §4.4.1 `Compiler::unuse`: the user
    /// asserts they won't reference it again), and every variable's
    /// range is then widened across any back-edge it's live into (see
    /// this module's doc).
    pub(crate) fn compute(emittables: &[Emittable]) -> Self {
        let dead_at = dead_points(emittables);
        let mut ranges: SecondaryMap<VarId, LiveRange> = SecondaryMap::new();
        for (idx, node) in emittables.iter().enumerate() {
            let idx = idx as u32;
            for var in node.referenced_vars() {
                if let Some(&d) = dead_at.get(&var) {
                    if idx > d {
                        continue;
                    }
                }
                let r = &mut ranges[var];
                if r.first.is_none() {
                    r.first = Some(idx);
                }
                r.last = Some(idx);
            }
        }
        widen_across_back_edges(emittables, &dead_at, &mut ranges);
        Liveness { ranges }
    }

    /// True if `var`'s last recorded use is at or before `idx` — used by
    /// the allocator's post-hook to free a register once its owner's
    /// final reference has just been processed (spec §4.4.3 step 3).
    pub(crate) fn is_last_use(&self, var: VarId, idx: u32) -> bool {
        self.ranges[var].last == Some(idx)
    }

    /// The next instruction index, strictly after `idx`, that
    /// references `var`, used by the victim-selection heuristic (spec
    /// §4.4.3: "whose next use is latest"). Returns `u32::MAX` when
    /// there is no later use, which naturally sorts that variable as
    /// the least urgent victim.
    pub(crate) fn next_use_after(&self, var: VarId, idx: u32, emittables: &[Emittable]) -> u32 {
        for (i, node) in emittables.iter().enumerate().skip(idx as usize + 1) {
            if node.referenced_vars().contains(&var) {
                return i as u32;
            }
        }
        u32::MAX
    }
}

/// The earliest `Emittable::Unuse(var)` index per variable, if any.
fn dead_points(emittables: &[Emittable]) -> HashMap<VarId, u32> {
    let mut dead_at = HashMap::new();
    for (idx, node) in emittables.iter().enumerate() {
        if let Emittable::Unuse(var) = node {
            dead_at.entry(*var).or_insert(idx as u32);
        }
    }
    dead_at
}

/// `(target_idx, jump_idx)` for every `Jmp`/`Jcc` whose `IrLabel` is
/// bound at or before the jump itself — i.e. every back-edge.
fn back_edges(emittables: &[Emittable]) -> Vec<(u32, u32)> {
    let mut label_index: HashMap<IrLabel, u32> = HashMap::new();
    for (idx, node) in emittables.iter().enumerate() {
        if let Emittable::Target(label) = node {
            label_index.entry(*label).or_insert(idx as u32);
        }
    }
    let mut edges = Vec::new();
    for (idx, node) in emittables.iter().enumerate() {
        let idx = idx as u32;
        let label = match node {
            Emittable::Instruction { op: IrOp::Jmp(l), .. } => Some(*l),
            Emittable::Instruction { op: IrOp::Jcc(_, l), .. } => Some(*l),
            _ => None,
        };
        if let Some(l) = label {
            if let Some(&target) = label_index.get(&l) {
                if target <= idx {
                    edges.push((target, idx));
                }
            }
        }
    }
    edges
}

/// Widens every variable's recorded last use to `jump_idx` for any
/// back-edge `(target_idx, jump_idx)` whose loop body its last use falls
/// inside (`target_idx <= last < jump_idx`) — see this module's doc.
/// Skips a variable already marked dead at or before the edge's target:
/// `Compiler::unuse` is the user's explicit assertion that the variable
/// is done, and a loop that starts after that point never carries it.
/// Runs to a fixed point so nested or sequential loops each get their
/// own widening pass off of the previous one's result.
fn widen_across_back_edges(emittables: &[Emittable], dead_at: &HashMap<VarId, u32>, ranges: &mut SecondaryMap<VarId, LiveRange>) {
    let edges = back_edges(emittables);
    if edges.is_empty() {
        return;
    }
    loop {
        let mut changed = false;
        for (var, r) in ranges.iter_mut() {
            for &(target, jump_idx) in &edges {
                if let Some(dead) = dead_at.get(&var) {
                    if *dead <= target {
                        continue;
                    }
                }
                if let Some(last) = r.last {
                    if target <= last && last < jump_idx {
                        r.last = Some(jump_idx);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}
