//! Use-def analysis
//!
//! Builds the use-list side of SSA: for every value, which instructions
//! reference it as an operand.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::function::Function;
use crate::instruction::InstructionId;
use crate::value::ValueId;

/// Where a value is used: the instruction doing the referencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueUse {
    pub user: InstructionId,
}

/// Use-lists for every value defined in a function.
#[derive(Debug, Default)]
pub struct UseDefChain {
    uses: HashMap<ValueId, Vec<ValueUse>>,
}

impl UseDefChain {
    pub fn analyze(func: &Function) -> Self {
        let mut uses: HashMap<ValueId, Vec<ValueUse>> = HashMap::new();
        for inst in func.instructions() {
            for operand in inst.operands() {
                uses.entry(operand).or_default().push(ValueUse { user: inst.id() });
            }
        }
        Self { uses }
    }

    pub fn uses_of(&self, value: ValueId) -> &[ValueUse] {
        self.uses.get(&value).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_used(&self, value: ValueId) -> bool {
        !self.uses_of(value).is_empty()
    }

    pub fn use_count(&self, value: ValueId) -> usize {
        self.uses_of(value).len()
    }

    pub fn has_single_use(&self, value: ValueId) -> bool {
        self.use_count(value) == 1
    }

    /// Every use of `value`, restricted to uses inside `blocks`.
    pub fn uses_outside(&self, func: &Function, value: ValueId, blocks: &hashbrown::HashSet<crate::instruction::BlockId>) -> bool {
        self.uses_of(value).iter().any(|u| match func.find_instruction(u.user) {
            Ok((block, _)) => !blocks.contains(&block),
            Err(_) => true,
        })
    }
}
