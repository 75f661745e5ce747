//! IR functions
//!
//! A function owns an ordered sequence of basic blocks (the first is the
//! entry block), a formal parameter list, and the values those blocks define.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::block::BlockMap;
use crate::error::IrError;
use crate::instruction::{BlockId, FunctionId, Instruction, InstructionId};
use crate::types::IrType;
use crate::value::{ConstantInt, Value, ValueId, ValueKind};

/// A function parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub index: u32,
    pub ty: IrType,
    pub name: Option<String>,
}

/// A function: an ordered sequence of basic blocks plus the value table
/// backing every instruction result, parameter, and constant it references.
#[derive(Debug)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_ty: IrType,
    pub blocks: BlockMap,
    values: Vec<Value>,
    next_value_id: ValueId,
}

impl Function {
    pub fn new(id: FunctionId, name: impl Into<String>, return_ty: IrType) -> Self {
        Self {
            id,
            name: name.into(),
            params: Vec::new(),
            return_ty,
            blocks: BlockMap::new(),
            values: Vec::new(),
            next_value_id: 0,
        }
    }

    pub fn add_param(&mut self, ty: IrType, name: Option<String>) -> ValueId {
        let index = self.params.len() as u32;
        let id = self.alloc_value_id();
        self.values.push(Value { id, ty, kind: ValueKind::Parameter(index), name: name.clone() });
        self.params.push(Parameter { index, ty, name });
        id
    }

    fn alloc_value_id(&mut self) -> ValueId {
        let id = self.next_value_id;
        self.next_value_id += 1;
        id
    }

    /// Allocate the next instruction id. By convention an instruction's
    /// result [`ValueId`] equals its [`InstructionId`], so this also
    /// registers the defined value in the function's value table when
    /// `ty` is `Some`.
    pub fn alloc_instruction_id(&mut self, ty: Option<IrType>) -> InstructionId {
        let id = self.alloc_value_id();
        if let Some(ty) = ty {
            self.values.push(Value { id, ty, kind: ValueKind::Instruction(id), name: None });
        }
        id
    }

    pub fn constant(&mut self, c: ConstantInt) -> ValueId {
        let id = self.alloc_value_id();
        self.values.push(Value { id, ty: c.ty(), kind: ValueKind::Constant(c), name: None });
        id
    }

    pub fn value(&self, id: ValueId) -> Result<&Value, IrError> {
        self.values.iter().find(|v| v.id == id).ok_or(IrError::UnknownValue(id))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.entry()
    }

    /// All instructions in the function, in block-then-position order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.iter())
    }

    pub fn find_instruction(&self, id: InstructionId) -> Result<(BlockId, &Instruction), IrError> {
        for block in self.blocks.iter() {
            if let Some(inst) = block.iter().find(|i| i.id() == id) {
                return Ok((block.id, inst));
            }
        }
        Err(IrError::UnknownInstruction(id))
    }

    /// Replace every operand reference to `old` with `new`, across every
    /// instruction in every block. Instructions left with no remaining uses
    /// are not removed here; local dead-code elimination does that.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        for block in self.blocks.iter_mut() {
            for inst in block.iter_mut() {
                inst.replace_operand(old, new);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_get_stable_ids() {
        let mut f = Function::new(0, "f", IrType::I32);
        let p0 = f.add_param(IrType::I32, Some("x".into()));
        let p1 = f.add_param(IrType::I32, Some("y".into()));
        assert_ne!(p0, p1);
        assert!(f.value(p0).unwrap().is_parameter());
    }

    #[test]
    fn constants_are_registered() {
        let mut f = Function::new(0, "f", IrType::I32);
        let c = f.constant(ConstantInt::new(8, 32));
        assert_eq!(f.value(c).unwrap().as_constant().unwrap().to_i64(), 8);
    }
}
