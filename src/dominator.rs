//! Dominator tree analysis
//!
//! Computes dominance via the standard iterative reverse-postorder fixed
//! point (Cooper, Harvey & Kennedy). This is deliberately not a true
//! Lengauer-Tarjan implementation: it is correct, simple, and fast enough
//! for the block counts this crate's IR reaches.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::cfg::ControlFlowGraph;
use crate::instruction::BlockId;

fn idom_fixed_point(
    entry: BlockId,
    rpo: &[BlockId],
    preds: impl Fn(BlockId) -> Vec<BlockId>,
) -> HashMap<BlockId, BlockId> {
    let index: HashMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    let mut idom: HashMap<BlockId, Option<usize>> = HashMap::new();
    idom.insert(entry, Some(index[&entry]));

    let intersect = |a: usize, b: usize, idom: &HashMap<BlockId, Option<usize>>, rpo: &[BlockId]| -> usize {
        let mut a = a;
        let mut b = b;
        while a != b {
            while a > b {
                a = idom[&rpo[a]].unwrap();
            }
            while b > a {
                b = idom[&rpo[b]].unwrap();
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &block in rpo.iter() {
            if block == entry {
                continue;
            }
            let mut new_idom: Option<usize> = None;
            for pred in preds(block) {
                let Some(&Some(pred_idx)) = idom.get(&pred) else { continue };
                new_idom = Some(match new_idom {
                    None => pred_idx,
                    Some(cur) => intersect(cur, pred_idx, &idom, rpo),
                });
            }
            let entry_for_block = idom.entry(block).or_insert(None);
            if *entry_for_block != new_idom {
                *entry_for_block = new_idom;
                changed = true;
            }
        }
    }

    idom
        .into_iter()
        .filter_map(|(b, i)| i.map(|i| (b, rpo[i])))
        .filter(|&(b, idom_b)| b != idom_b)
        .collect()
}

/// Immediate-dominator based dominator tree over a function's CFG.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: BlockId,
    idom: HashMap<BlockId, BlockId>,
}

impl DominatorTree {
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let rpo = crate::cfg::reverse_postorder(cfg.entry, |b| cfg.successors(b).to_vec());
        let idom = idom_fixed_point(cfg.entry, &rpo, |b| cfg.predecessors(b).to_vec());
        Self { entry: cfg.entry, idom }
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    /// `true` iff every path from the entry to `b` passes through `a`
    /// (a block dominates itself).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&idom) = self.idom.get(&cur) {
            if idom == a {
                return true;
            }
            if idom == cur {
                break;
            }
            cur = idom;
        }
        false
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }
}

/// Post-dominator tree: dominance over the reversed CFG, rooted at the
/// (possibly synthetic) set of exit blocks collapsed to a single virtual
/// exit so a function exiting through multiple `ret`s still has one root.
#[derive(Debug, Clone)]
pub struct PostDominatorTree {
    ipdom: HashMap<BlockId, BlockId>,
    exits: Vec<BlockId>,
}

impl PostDominatorTree {
    pub fn compute(cfg: &ControlFlowGraph, exits: &[BlockId]) -> Self {
        if exits.is_empty() {
            return Self { ipdom: HashMap::new(), exits: Vec::new() };
        }
        // Reverse the graph and run the same fixed point from a virtual
        // root predecessor of every real exit block.
        const VIRTUAL_EXIT: BlockId = BlockId::MAX;
        let succ_of = |b: BlockId| -> Vec<BlockId> {
            if b == VIRTUAL_EXIT {
                exits.to_vec()
            } else {
                cfg.predecessors(b).to_vec()
            }
        };
        let rpo = crate::cfg::reverse_postorder(VIRTUAL_EXIT, succ_of);
        let pred_of = |b: BlockId| -> Vec<BlockId> {
            if exits.contains(&b) {
                let mut v = cfg.successors(b).to_vec();
                v.push(VIRTUAL_EXIT);
                v
            } else {
                cfg.successors(b).to_vec()
            }
        };
        let mut ipdom = idom_fixed_point(VIRTUAL_EXIT, &rpo, pred_of);
        ipdom.remove(&VIRTUAL_EXIT);
        Self { ipdom, exits: exits.to_vec() }
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&ipdom) = self.ipdom.get(&cur) {
            if ipdom == a {
                return true;
            }
            if ipdom == cur {
                break;
            }
            cur = ipdom;
        }
        self.exits.contains(&a) && self.exits.contains(&b)
    }
}

/// Dominance frontier, computed from a [`DominatorTree`]'s immediate
/// dominators by the standard Cytron et al. algorithm.
#[derive(Debug, Clone, Default)]
pub struct DominanceFrontier {
    frontier: HashMap<BlockId, Vec<BlockId>>,
}

impl DominanceFrontier {
    pub fn compute(cfg: &ControlFlowGraph, dt: &DominatorTree) -> Self {
        let mut frontier: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &block in cfg.blocks() {
            let preds = cfg.predecessors(block);
            if preds.len() < 2 {
                continue;
            }
            for &pred in preds {
                let mut runner = pred;
                while let Some(idom) = dt.immediate_dominator(runner) {
                    if dt.dominates(block, runner) {
                        break;
                    }
                    let entry = frontier.entry(runner).or_default();
                    if !entry.contains(&block) {
                        entry.push(block);
                    }
                    if idom == runner {
                        break;
                    }
                    runner = idom;
                }
            }
        }
        Self { frontier }
    }

    pub fn of(&self, block: BlockId) -> &[BlockId] {
        self.frontier.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
