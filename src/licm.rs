//! Loop-Invariant Code Motion
//!
//! Hoists instructions whose operands are all defined outside the loop (or
//! are themselves already proven invariant) into the loop's pre-header,
//! provided the instruction's block dominates the loop's exiting block or
//! the instruction has no uses outside the loop.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::analysis::UseDefChain;
use crate::cfg::ControlFlowGraph;
use crate::dominator::DominatorTree;
use crate::function::Function;
use crate::instruction::{FunctionId, Instruction, InstructionId};
use crate::loops::{Loop, LoopForest};
use crate::passes::{FunctionPass, PreservedAnalyses};
use crate::value::ValueKind;

#[derive(Debug, Default)]
pub struct LoopInvariantCodeMotion;

impl LoopInvariantCodeMotion {
    pub fn new() -> Self {
        Self
    }

    /// Run on a single loop.
    pub fn run_on_loop(func: &mut Function, l: &Loop, cfg: &ControlFlowGraph, dt: &DominatorTree) -> PreservedAnalyses {
        if !l.is_simplify_form(cfg) {
            return PreservedAnalyses::All;
        }
        let preheader = l.preheader(cfg).expect("simplify form guarantees a preheader");
        let exiting = l.exiting_block_with(cfg).expect("simplify form guarantees an exiting block");

        let use_def = UseDefChain::analyze(func);
        let order = crate::cfg::reverse_postorder(l.header, |b| {
            cfg.successors(b).iter().copied().filter(|s| l.contains(*s)).collect()
        });

        let mut memo: HashMap<InstructionId, bool> = HashMap::new();
        let mut to_hoist: Vec<InstructionId> = Vec::new();
        for &block in &order {
            let ids: Vec<InstructionId> = func.blocks.get(block).unwrap().iter().map(|i| i.id()).collect();
            for id in ids {
                let (_, inst) = func.find_instruction(id).unwrap();
                if inst.is_phi() || inst.is_terminator() || inst.has_side_effects() {
                    continue;
                }
                if !is_loop_invariant_instruction(func, l, &mut memo, id) {
                    continue;
                }
                let dominates_exits = dt.dominates(block, exiting);
                let loop_dead = is_loop_dead(func, l, &use_def, id);
                if dominates_exits || loop_dead {
                    to_hoist.push(id);
                }
            }
        }

        if to_hoist.is_empty() {
            return PreservedAnalyses::All;
        }

        for id in to_hoist {
            let (block, _) = func.find_instruction(id).unwrap();
            let pos = func.blocks.get(block).unwrap().instructions.iter().position(|i| i.id() == id).unwrap();
            let inst = func.blocks.get_mut(block).unwrap().remove(pos);
            let preheader_block = func.blocks.get_mut(preheader).unwrap();
            let insert_at = if preheader_block.has_terminator() { preheader_block.len() - 1 } else { preheader_block.len() };
            preheader_block.insert(insert_at, inst);
            log::debug!("licm: hoisted instruction {id} from block {block} to pre-header {preheader}");
        }

        PreservedAnalyses::None
    }
}

/// A value is loop-invariant iff it is a constant, a function parameter, an
/// instruction defined outside `l`, or an in-loop instruction that is itself
/// loop-invariant. Mutually recursive with [`is_loop_invariant_instruction`].
fn is_loop_invariant_value(func: &Function, l: &Loop, memo: &mut HashMap<InstructionId, bool>, value: crate::value::ValueId) -> bool {
    match func.value(value).ok().map(|v| &v.kind) {
        Some(ValueKind::Constant(_)) | Some(ValueKind::Parameter(_)) => true,
        Some(ValueKind::Instruction(id)) => {
            let id = *id;
            match func.find_instruction(id) {
                Ok((block, _)) if !l.contains(block) => true,
                Ok(_) => is_loop_invariant_instruction(func, l, memo, id),
                Err(_) => false,
            }
        }
        None => false,
    }
}

/// A phi node is never loop-invariant; any other instruction is invariant
/// iff every operand is loop-invariant. Memoized per loop invocation so
/// shared sub-expressions aren't re-derived.
fn is_loop_invariant_instruction(func: &Function, l: &Loop, memo: &mut HashMap<InstructionId, bool>, id: InstructionId) -> bool {
    if let Some(&cached) = memo.get(&id) {
        return cached;
    }
    // Guard against revisiting an instruction while it's being classified;
    // SSA forbids operand cycles so this only protects against a bug, never
    // legitimately fires.
    memo.insert(id, false);
    let (_, inst) = func.find_instruction(id).unwrap();
    let result = if inst.is_phi() {
        false
    } else {
        inst.operands().iter().all(|&op| is_loop_invariant_value(func, l, memo, op))
    };
    memo.insert(id, result);
    result
}

/// `true` iff every use of `id`'s result lies inside `l` — the value never
/// escapes, so it may be moved without observability (SPEC_FULL §4.2 (b)).
fn is_loop_dead(func: &Function, l: &Loop, use_def: &UseDefChain, id: InstructionId) -> bool {
    let (_, inst) = func.find_instruction(id).unwrap();
    let Some(result) = inst.result() else { return false };
    use_def.uses_of(result).iter().all(|u| match func.find_instruction(u.user) {
        Ok((block, _)) => l.contains(block),
        Err(_) => false,
    })
}

impl FunctionPass for LoopInvariantCodeMotion {
    fn name(&self) -> &'static str {
        "loop-invariant-code-motion"
    }

    fn run_on_function(&mut self, func: &mut Function, _module_functions: &[FunctionId]) -> PreservedAnalyses {
        let Some(cfg) = ControlFlowGraph::from_function(func) else { return PreservedAnalyses::All };
        let dt = DominatorTree::compute(&cfg);
        let forest = LoopForest::analyze(func, &cfg);

        // Innermost loops first: hoisting out of an inner loop can make an
        // instruction newly invariant with respect to its enclosing loop.
        let mut order: Vec<usize> = (0..forest.len()).collect();
        order.sort_by(|&a, &b| forest.get(b).depth.cmp(&forest.get(a).depth));

        let mut changed = false;
        for idx in order {
            let l = forest.get(idx).clone();
            if Self::run_on_loop(func, &l, &cfg, &dt).changed() {
                changed = true;
            }
        }

        if changed {
            PreservedAnalyses::None
        } else {
            PreservedAnalyses::All
        }
    }
}
