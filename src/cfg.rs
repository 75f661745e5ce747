//! Control flow graph utilities
//!
//! A thin read-only view over a [`Function`]'s blocks, plus traversal-order
//! helpers shared by the dominance and loop analyses.

#[cfg(not(feature = "std"))]
use alloc::{collections::VecDeque, vec::Vec};
#[cfg(feature = "std")]
use std::collections::VecDeque;

use hashbrown::HashMap;

use crate::function::Function;
use crate::instruction::BlockId;

/// How an edge reached its target, for diagnostics and loop classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgEdgeKind {
    Unconditional,
    ConditionalTrue,
    ConditionalFalse,
    LoopBack,
    LoopExit,
}

/// A lightweight successor/predecessor view derived from a function's blocks.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub entry: BlockId,
    successors: HashMap<BlockId, Vec<BlockId>>,
    predecessors: HashMap<BlockId, Vec<BlockId>>,
}

impl ControlFlowGraph {
    pub fn from_function(func: &Function) -> Option<Self> {
        let entry = func.entry_block()?;
        let mut successors = HashMap::new();
        let mut predecessors = HashMap::new();
        for block in func.blocks.iter() {
            successors.insert(block.id, block.successors.clone());
            predecessors.insert(block.id, block.predecessors.clone());
        }
        Some(Self { entry, successors, predecessors })
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockId> {
        self.successors.keys()
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }
}

/// Reverse post-order traversal from `entry` over an arbitrary successor
/// function, used by the dominance and loop-forest analyses so they don't
/// depend directly on [`crate::block::BlockMap`]'s storage.
pub fn reverse_postorder(entry: BlockId, successors: impl Fn(BlockId) -> Vec<BlockId>) -> Vec<BlockId> {
    let mut visited = hashbrown::HashSet::new();
    let mut order = Vec::new();

    fn visit(
        block: BlockId,
        successors: &impl Fn(BlockId) -> Vec<BlockId>,
        visited: &mut hashbrown::HashSet<BlockId>,
        order: &mut Vec<BlockId>,
    ) {
        if !visited.insert(block) {
            return;
        }
        for succ in successors(block) {
            visit(succ, successors, visited, order);
        }
        order.push(block);
    }

    visit(entry, &successors, &mut visited, &mut order);
    order.reverse();
    order
}

pub fn postorder(entry: BlockId, successors: impl Fn(BlockId) -> Vec<BlockId>) -> Vec<BlockId> {
    let mut rpo = reverse_postorder(entry, successors);
    rpo.reverse();
    rpo
}

pub fn bfs_order(entry: BlockId, successors: impl Fn(BlockId) -> Vec<BlockId>) -> Vec<BlockId> {
    let mut visited = hashbrown::HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(entry);
    visited.insert(entry);
    while let Some(block) = queue.pop_front() {
        order.push(block);
        for succ in successors(block) {
            if visited.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    order
}
