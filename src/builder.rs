//! IR builder
//!
//! Convenience API for constructing and editing IR, used by the passes to
//! insert new instructions (e.g. LPO's replacement shifts) without hand-
//! threading block/function indices.

use crate::function::Function;
use crate::instruction::{BinaryOp, ICmpPredicate, Instruction, InstructionId};
use crate::types::IrType;
use crate::value::ValueId;

/// Where newly built instructions are inserted.
pub struct IrBuilder<'a> {
    func: &'a mut Function,
    block: crate::instruction::BlockId,
    /// Insert before this index in the block; `None` appends at the end.
    insertion_point: Option<usize>,
}

impl<'a> IrBuilder<'a> {
    pub fn at_end_of(func: &'a mut Function, block: crate::instruction::BlockId) -> Self {
        Self { func, block, insertion_point: None }
    }

    pub fn before(func: &'a mut Function, block: crate::instruction::BlockId, index: usize) -> Self {
        Self { func, block, insertion_point: Some(index) }
    }

    fn insert(&mut self, inst: Instruction) {
        let b = self.func.blocks.get_mut(self.block).expect("builder block must exist");
        match self.insertion_point {
            Some(idx) => {
                b.insert(idx, inst);
                self.insertion_point = Some(idx + 1);
            }
            None => b.push(inst),
        }
    }

    pub fn build_binary(&mut self, op: BinaryOp, ty: IrType, lhs: ValueId, rhs: ValueId) -> InstructionId {
        let id = self.func.alloc_instruction_id(Some(ty));
        self.insert(Instruction::Binary { id, op, ty, lhs, rhs });
        id
    }

    pub fn build_compare(&mut self, pred: ICmpPredicate, lhs: ValueId, rhs: ValueId) -> InstructionId {
        let id = self.func.alloc_instruction_id(Some(IrType::Bool));
        self.insert(Instruction::Compare { id, pred, lhs, rhs });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConstantInt;

    #[test]
    fn build_binary_appends_to_block() {
        let mut f = Function::new(0, "f", IrType::Void);
        let b = f.blocks.create_entry_block();
        let x = f.add_param(IrType::I32, None);
        let c = f.constant(ConstantInt::new(3, 32));
        {
            let mut builder = IrBuilder::at_end_of(&mut f, b);
            builder.build_binary(BinaryOp::Shl, IrType::I32, x, c);
        }
        assert_eq!(f.blocks.get(b).unwrap().len(), 1);
    }
}
