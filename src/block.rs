//! Basic blocks
//!
//! A basic block owns an ordered sequence of instructions terminated by
//! exactly one terminator.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec, vec::Vec};

use crate::error::IrError;
use crate::instruction::{BlockId, Instruction};

/// A basic block in the IR.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: Option<String>,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub fn add_predecessor(&mut self, pred: BlockId) {
        if !self.predecessors.contains(&pred) {
            self.predecessors.push(pred);
        }
    }

    pub fn add_successor(&mut self, succ: BlockId) {
        if !self.successors.contains(&succ) {
            self.successors.push(succ);
        }
    }

    pub fn remove_predecessor(&mut self, pred: BlockId) {
        self.predecessors.retain(|&p| p != pred);
    }

    pub fn remove_successor(&mut self, succ: BlockId) {
        self.successors.retain(|&s| s != succ);
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut Instruction> {
        self.instructions.last_mut().filter(|i| i.is_terminator())
    }

    pub fn has_terminator(&self) -> bool {
        self.terminator().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Index of the first non-phi instruction; phis must precede it.
    pub fn first_non_phi_index(&self) -> usize {
        self.instructions.iter().position(|i| !i.is_phi()).unwrap_or(self.instructions.len())
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|i| i.is_phi())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.instructions.iter_mut()
    }

    /// Remove every binary/compare/load instruction whose result is unused.
    /// Phi nodes and side-effecting/terminator instructions are never removed.
    /// Returns the count of instructions eliminated. Backs the local
    /// dead-code elimination step of the peephole optimizer.
    /// Local DCE (SPEC_FULL §4.1): erases only binary operators whose
    /// result has no remaining use. Other dead-looking instructions
    /// (compares, loads, array-address computations) are left in place —
    /// widening this to them is out of scope for the documented contract.
    pub fn remove_dead(&mut self, used: &hashbrown::HashSet<crate::value::ValueId>) -> usize {
        let before = self.instructions.len();
        self.instructions.retain(|inst| {
            if !matches!(inst, Instruction::Binary { .. }) {
                return true;
            }
            inst.result().map_or(true, |r| used.contains(&r))
        });
        before - self.instructions.len()
    }

    pub fn insert(&mut self, index: usize, instruction: Instruction) {
        self.instructions.insert(index, instruction);
    }

    pub fn remove(&mut self, index: usize) -> Instruction {
        self.instructions.remove(index)
    }
}

/// Compute reverse post-order of blocks reachable from `entry`.
pub fn compute_rpo(entry: BlockId, blocks: &[BasicBlock]) -> Vec<BlockId> {
    let mut visited = vec![false; blocks.len()];
    let mut post_order = Vec::with_capacity(blocks.len());

    fn dfs(block_id: BlockId, blocks: &[BasicBlock], visited: &mut [bool], post_order: &mut Vec<BlockId>) {
        let idx = block_id as usize;
        if idx >= visited.len() || visited[idx] {
            return;
        }
        visited[idx] = true;
        if let Some(block) = blocks.iter().find(|b| b.id == block_id) {
            for &succ in &block.successors {
                dfs(succ, blocks, visited, post_order);
            }
        }
        post_order.push(block_id);
    }

    dfs(entry, blocks, &mut visited, &mut post_order);
    post_order.reverse();
    post_order
}

pub fn compute_po(entry: BlockId, blocks: &[BasicBlock]) -> Vec<BlockId> {
    let mut rpo = compute_rpo(entry, blocks);
    rpo.reverse();
    rpo
}

/// Arena of basic blocks, indexed by [`BlockId`].
#[derive(Debug, Default)]
pub struct BlockMap {
    blocks: Vec<BasicBlock>,
    entry: Option<BlockId>,
    next_id: BlockId,
}

impl BlockMap {
    pub fn new() -> Self {
        Self { blocks: Vec::new(), entry: None, next_id: 0 }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = self.next_id;
        self.next_id += 1;
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn create_entry_block(&mut self) -> BlockId {
        let id = self.create_block();
        self.entry = Some(id);
        id
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn set_entry(&mut self, id: BlockId) {
        self.entry = Some(id);
    }

    pub fn get(&self, id: BlockId) -> Result<&BasicBlock, IrError> {
        self.blocks.iter().find(|b| b.id == id).ok_or(IrError::UnknownBlock(id))
    }

    pub fn get_mut(&mut self, id: BlockId) -> Result<&mut BasicBlock, IrError> {
        self.blocks.iter_mut().find(|b| b.id == id).ok_or(IrError::UnknownBlock(id))
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.iter().any(|b| b.id == id)
    }

    pub fn remove(&mut self, id: BlockId) -> Option<BasicBlock> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        Some(self.blocks.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.blocks.iter_mut()
    }

    pub fn ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|b| b.id).collect()
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if let Ok(b) = self.get_mut(from) {
            b.add_successor(to);
        }
        if let Ok(b) = self.get_mut(to) {
            b.add_predecessor(from);
        }
    }

    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        if let Ok(b) = self.get_mut(from) {
            b.remove_successor(to);
        }
        if let Ok(b) = self.get_mut(to) {
            b.remove_predecessor(from);
        }
    }

    /// Recompute every block's successor/predecessor list from its
    /// terminator. Used after CFG surgery (e.g. loop fusion) instead of
    /// patching edges by hand.
    pub fn rebuild_edges(&mut self) {
        for block in &mut self.blocks {
            block.successors.clear();
            block.predecessors.clear();
        }
        let edges: Vec<_> = self
            .blocks
            .iter()
            .flat_map(|b| b.terminator().map(|t| t.successors()).unwrap_or_default().into_iter().map(move |t| (b.id, t)))
            .collect();
        for (from, to) in edges {
            self.add_edge(from, to);
        }
    }

    pub fn rpo(&self) -> Vec<BlockId> {
        self.entry.map(|e| compute_rpo(e, &self.blocks)).unwrap_or_default()
    }

    pub fn po(&self) -> Vec<BlockId> {
        self.entry.map(|e| compute_po(e, &self.blocks)).unwrap_or_default()
    }

    /// Remove every block unreachable from the entry. Loop fusion invokes
    /// this after a successful fusion to clean up the stranded duplicate
    /// header/latch.
    pub fn eliminate_unreachable_blocks(&mut self) -> usize {
        let Some(entry) = self.entry else { return 0 };
        let reachable = compute_rpo(entry, &self.blocks);
        let before = self.blocks.len();
        self.blocks.retain(|b| reachable.contains(&b.id) || b.id == entry);
        self.rebuild_edges();
        before - self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    #[test]
    fn basic_block_push() {
        let mut block = BasicBlock::new(0);
        assert!(block.is_empty());
        block.push(Instruction::Ret { id: 0 });
        assert!(!block.is_empty());
        assert_eq!(block.len(), 1);
    }

    #[test]
    fn block_map_edges() {
        let mut map = BlockMap::new();
        let entry = map.create_entry_block();
        let b1 = map.create_block();
        let b2 = map.create_block();

        map.add_edge(entry, b1);
        map.add_edge(entry, b2);
        map.add_edge(b1, b2);

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(entry).unwrap().successors.len(), 2);
    }

    #[test]
    fn rpo_starts_at_entry() {
        let mut map = BlockMap::new();
        let b0 = map.create_entry_block();
        let b1 = map.create_block();
        let b2 = map.create_block();
        map.add_edge(b0, b1);
        map.add_edge(b0, b2);
        map.add_edge(b1, b2);

        let rpo = map.rpo();
        assert_eq!(rpo[0], b0);
        assert_eq!(rpo.len(), 3);
    }

    #[test]
    fn eliminate_unreachable() {
        let mut map = BlockMap::new();
        let entry = map.create_entry_block();
        let live = map.create_block();
        let dead = map.create_block();
        map.get_mut(entry).unwrap().push(Instruction::Br { id: 0, target: live });
        map.get_mut(live).unwrap().push(Instruction::Ret { id: 1 });
        map.get_mut(dead).unwrap().push(Instruction::Ret { id: 2 });
        map.rebuild_edges();

        let removed = map.eliminate_unreachable_blocks();
        assert_eq!(removed, 1);
        assert!(!map.contains(dead));
    }
}
