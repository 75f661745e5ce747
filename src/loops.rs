//! Natural loops and the loop forest
//!
//! Detects natural loops from back edges in a control flow graph and builds
//! a forest over them with real parent/child nesting, pre-header/latch/exit
//! identification, and simplified-form and guard checks.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use hashbrown::HashSet;

use crate::cfg::ControlFlowGraph;
use crate::function::Function;
use crate::instruction::{BlockId, Instruction};

/// A natural loop: single-entry region closed under a unique back edge to
/// its header.
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    pub latch: BlockId,
    pub blocks: HashSet<BlockId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub depth: u32,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// The loop's unique non-loop predecessor of the header, if it exists.
    pub fn preheader(&self, cfg: &ControlFlowGraph) -> Option<BlockId> {
        let mut outside: Vec<BlockId> = cfg.predecessors(self.header).iter().copied().filter(|p| !self.blocks.contains(p)).collect();
        outside.dedup();
        match outside.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// The in-loop block with a successor outside the loop, if there is
    /// exactly one.
    pub fn exiting_block_with(&self, cfg: &ControlFlowGraph) -> Option<BlockId> {
        let mut exiting: Vec<BlockId> = self
            .blocks
            .iter()
            .copied()
            .filter(|&b| cfg.successors(b).iter().any(|s| !self.blocks.contains(s)))
            .collect();
        exiting.sort_unstable();
        match exiting.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    pub fn exit_block_with(&self, cfg: &ControlFlowGraph) -> Option<BlockId> {
        let exiting = self.exiting_block_with(cfg)?;
        let mut exits: Vec<BlockId> = cfg.successors(exiting).iter().copied().filter(|s| !self.blocks.contains(s)).collect();
        exits.dedup();
        match exits.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// A loop is in simplified form iff pre-header, header, latch, exiting
    /// block, and exit block all uniquely exist (SPEC_FULL §3).
    pub fn is_simplify_form(&self, cfg: &ControlFlowGraph) -> bool {
        self.preheader(cfg).is_some() && self.exiting_block_with(cfg).is_some() && self.exit_block_with(cfg).is_some()
    }

    /// The guard, if this loop is guarded: the pre-header's unique
    /// predecessor, provided that predecessor's terminator is a conditional
    /// branch with one successor equal to the loop's own exit block (i.e. it
    /// actually skips the loop entirely rather than merely preceding it). A
    /// bare "unique predecessor with a conditional terminator" is not enough:
    /// that also describes an unrelated preceding loop's exiting block, which
    /// would otherwise misclassify every pair of back-to-back simple loops as
    /// guarded and break adjacency detection for them.
    pub fn guard(&self, func: &Function, cfg: &ControlFlowGraph) -> Option<BlockId> {
        let preheader = self.preheader(cfg)?;
        let exit = self.exit_block_with(cfg)?;
        let preds = cfg.predecessors(preheader);
        let [candidate] = preds else { return None };
        let block = func.blocks.get(*candidate).ok()?;
        match block.terminator() {
            Some(Instruction::CondBr { true_target, false_target, .. }) if *true_target == exit || *false_target == exit => {
                Some(*candidate)
            }
            _ => None,
        }
    }

    /// The loop's entry block: its guard if guarded, else its pre-header.
    pub fn entry_block(&self, func: &Function, cfg: &ControlFlowGraph) -> Option<BlockId> {
        self.guard(func, cfg).or_else(|| self.preheader(cfg))
    }
}

/// The forest of loops within a function; roots are top-level loops.
#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
}

impl LoopForest {
    /// Detect every natural loop in `func` via back-edge discovery, then
    /// compute real parent/child nesting (fixing the teacher's no-op
    /// `compute_nesting` stub, SPEC_FULL §9): a loop's parent is the
    /// smallest other loop whose block set is a strict superset of its own.
    pub fn analyze(_func: &Function, cfg: &ControlFlowGraph) -> Self {
        let back_edges = find_back_edges(cfg);
        let mut loops: Vec<Loop> = Vec::new();
        for (latch, header) in back_edges {
            let mut blocks = HashSet::new();
            blocks.insert(header);
            let mut worklist = vec![latch];
            while let Some(b) = worklist.pop() {
                if !blocks.insert(b) {
                    continue;
                }
                for &pred in cfg.predecessors(b) {
                    if !blocks.contains(&pred) {
                        worklist.push(pred);
                    }
                }
            }
            loops.push(Loop { header, latch, blocks, parent: None, children: Vec::new(), depth: 1 });
        }

        let n = loops.len();
        for i in 0..n {
            let mut best: Option<usize> = None;
            for j in 0..n {
                if i == j {
                    continue;
                }
                if loops[j].blocks.len() > loops[i].blocks.len() && loops[i].blocks.is_subset(&loops[j].blocks) {
                    let smaller_than_current = match best {
                        None => true,
                        Some(b) => loops[j].blocks.len() < loops[b].blocks.len(),
                    };
                    if smaller_than_current {
                        best = Some(j);
                    }
                }
            }
            loops[i].parent = best;
        }
        for i in 0..n {
            if let Some(p) = loops[i].parent {
                loops[p].children.push(i);
            }
        }
        fn depth_of(loops: &[Loop], i: usize) -> u32 {
            match loops[i].parent {
                None => 1,
                Some(p) => 1 + depth_of(loops, p),
            }
        }
        for i in 0..n {
            loops[i].depth = depth_of(&loops, i);
        }

        Self { loops }
    }

    pub fn get(&self, idx: usize) -> &Loop {
        &self.loops[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Loop {
        &mut self.loops[idx]
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter()
    }

    pub fn top_level(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.loops.len()).filter(move |&i| self.loops[i].parent.is_none())
    }

    /// Reassign `block` from whatever loop currently owns it to `target`.
    pub fn reassign_block(&mut self, block: BlockId, target: usize) {
        for (i, l) in self.loops.iter_mut().enumerate() {
            if i != target {
                l.blocks.remove(&block);
            }
        }
        self.loops[target].blocks.insert(block);
    }

    /// Remove a loop from the forest, re-parenting its children to its
    /// former parent.
    pub fn remove(&mut self, idx: usize) {
        let parent = self.loops[idx].parent;
        for l in self.loops.iter_mut() {
            if l.parent == Some(idx) {
                l.parent = parent;
            }
        }
        if let Some(p) = parent {
            self.loops[p].children.retain(|&c| c != idx);
        }
        self.loops[idx].blocks.clear();
    }
}

fn find_back_edges(cfg: &ControlFlowGraph) -> Vec<(BlockId, BlockId)> {
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut backs = Vec::new();

    fn dfs(
        block: BlockId,
        cfg: &ControlFlowGraph,
        visiting: &mut HashSet<BlockId>,
        visited: &mut HashSet<BlockId>,
        backs: &mut Vec<(BlockId, BlockId)>,
    ) {
        visiting.insert(block);
        for &succ in cfg.successors(block) {
            if visiting.contains(&succ) {
                backs.push((block, succ));
            } else if !visited.contains(&succ) {
                dfs(succ, cfg, visiting, visited, backs);
            }
        }
        visiting.remove(&block);
        visited.insert(block);
    }

    dfs(cfg.entry, cfg, &mut visiting, &mut visited, &mut backs);
    backs
}
