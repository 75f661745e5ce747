//! Memory dependence analysis
//!
//! Decides whether a store and a load may alias and, if so, the
//! cross-iteration distance between them: the check loop fusion needs to
//! rule out introducing a negative-distance dependence by reordering two
//! loop bodies into one.

use crate::function::Function;
use crate::instruction::{Instruction, InstructionId};
use crate::value::ValueId;

/// A discovered dependence between two memory accesses, with its constant
/// distance in loop iterations if both accesses are affine in the same
/// induction variable (positive: `dst` reads/writes `distance` iterations
/// after `src`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependence {
    pub distance: i64,
}

/// Dependence facade over a single function.
pub struct DependenceInfo<'a> {
    func: &'a Function,
}

impl<'a> DependenceInfo<'a> {
    pub fn new(func: &'a Function) -> Self {
        Self { func }
    }

    fn array_addr(&self, id: ValueId) -> Option<(ValueId, ValueId)> {
        let (_, inst) = self.func.find_instruction(id).ok()?;
        match inst {
            Instruction::ArrayAddr { array, index, .. } => Some((*array, *index)),
            _ => None,
        }
    }

    fn index_offset(&self, index: ValueId, other_index: ValueId) -> Option<i64> {
        if index == other_index {
            return Some(0);
        }
        let a = self.func.value(index).ok()?.as_constant().map(|c| c.to_i64());
        let b = self.func.value(other_index).ok()?.as_constant().map(|c| c.to_i64());
        match (a, b) {
            (Some(a), Some(b)) => Some(a - b),
            _ => self.affine_offset(index, other_index),
        }
    }

    /// Recognize `index = iv + k1` and `other_index = iv + k2` for a shared
    /// base `iv`, returning `k1 - k2`.
    fn affine_offset(&self, index: ValueId, other_index: ValueId) -> Option<i64> {
        let decompose = |v: ValueId| -> Option<(ValueId, i64)> {
            if let Ok((_, inst)) = self.func.find_instruction(v) {
                if let Instruction::Binary { op, lhs, rhs, .. } = inst {
                    let offset = self.func.value(*rhs).ok()?.as_constant()?.to_i64();
                    return match op {
                        crate::instruction::BinaryOp::Add => Some((*lhs, offset)),
                        crate::instruction::BinaryOp::Sub => Some((*lhs, -offset)),
                        _ => None,
                    };
                }
            }
            Some((v, 0))
        };
        let (base_a, off_a) = decompose(index)?;
        let (base_b, off_b) = decompose(other_index)?;
        if base_a == base_b {
            Some(off_a - off_b)
        } else {
            None
        }
    }

    /// Decide whether `src` (a store) and `dst` (a load) may access the same
    /// array element, and if so compute the iteration distance.
    ///
    /// Returns `None` when the analysis cannot establish aliasing — callers
    /// must treat "unknown" as "may alias with unknown distance", the
    /// conservative choice that blocks fusion (SPEC_FULL §4.3).
    pub fn depends(&self, src: InstructionId, dst: InstructionId) -> Option<Dependence> {
        let (_, src_inst) = self.func.find_instruction(src).ok()?;
        let (_, dst_inst) = self.func.find_instruction(dst).ok()?;
        let Instruction::Store { pointer: src_ptr, .. } = src_inst else { return None };
        let Instruction::Load { pointer: dst_ptr, .. } = dst_inst else { return None };
        let (src_array, src_index) = self.array_addr(*src_ptr)?;
        let (dst_array, dst_index) = self.array_addr(*dst_ptr)?;
        if src_array != dst_array {
            return None; // different arrays, provably independent
        }
        self.index_offset(dst_index, src_index).map(|distance| Dependence { distance })
    }

    /// `true` iff fusing the loop containing `src` with the loop containing
    /// `dst` is legal: every dependence between them has a non-negative
    /// distance. Unknown dependences are conservatively disqualifying.
    pub fn no_negative_distance(&self, stores: &[InstructionId], loads: &[InstructionId]) -> bool {
        for &src in stores {
            for &dst in loads {
                let (_, src_inst) = self.func.find_instruction(src).unwrap();
                let (_, dst_inst) = self.func.find_instruction(dst).unwrap();
                let Instruction::Store { pointer: src_ptr, .. } = src_inst else { continue };
                let Instruction::Load { pointer: dst_ptr, .. } = dst_inst else { continue };
                let Some((src_array, _)) = self.array_addr(*src_ptr) else { return false };
                let Some((dst_array, _)) = self.array_addr(*dst_ptr) else { return false };
                if src_array != dst_array {
                    continue;
                }
                match self.depends(src, dst) {
                    Some(d) if d.distance < 0 => return false,
                    Some(_) => {}
                    None => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::BinaryOp;
    use crate::types::IrType;
    use crate::value::ConstantInt;

    #[test]
    fn same_index_is_zero_distance() {
        let mut f = Function::new(0, "f", IrType::Void);
        let b = f.blocks.create_entry_block();
        let arr = f.constant(ConstantInt::new(0, 64));
        let idx = f.constant(ConstantInt::new(0, 32));
        let addr_id = f.alloc_instruction_id(Some(IrType::I64));
        f.blocks.get_mut(b).unwrap().push(Instruction::ArrayAddr { id: addr_id, array: arr, index: idx });
        let val = f.constant(ConstantInt::new(1, 32));
        let store_id = f.alloc_instruction_id(None);
        f.blocks.get_mut(b).unwrap().push(Instruction::Store { id: store_id, pointer: addr_id, value: val });
        let load_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Load { id: load_id, ty: IrType::I32, pointer: addr_id });

        let di = DependenceInfo::new(&f);
        let dep = di.depends(store_id, load_id).unwrap();
        assert_eq!(dep.distance, 0);
    }

    #[test]
    fn affine_offset_detects_negative_distance() {
        let mut f = Function::new(0, "f", IrType::Void);
        let b = f.blocks.create_entry_block();
        let arr = f.constant(ConstantInt::new(0, 64));
        let iv = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Phi { id: iv, ty: IrType::I32, incoming: vec![] });
        let one = f.constant(ConstantInt::new(1, 32));
        let minus_one_idx = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Binary { id: minus_one_idx, op: BinaryOp::Sub, ty: IrType::I32, lhs: iv, rhs: one });

        let store_addr = f.alloc_instruction_id(Some(IrType::I64));
        f.blocks.get_mut(b).unwrap().push(Instruction::ArrayAddr { id: store_addr, array: arr, index: iv });
        let val = f.constant(ConstantInt::new(1, 32));
        let store_id = f.alloc_instruction_id(None);
        f.blocks.get_mut(b).unwrap().push(Instruction::Store { id: store_id, pointer: store_addr, value: val });

        let load_addr = f.alloc_instruction_id(Some(IrType::I64));
        f.blocks.get_mut(b).unwrap().push(Instruction::ArrayAddr { id: load_addr, array: arr, index: minus_one_idx });
        let load_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Load { id: load_id, ty: IrType::I32, pointer: load_addr });

        let di = DependenceInfo::new(&f);
        let dep = di.depends(store_id, load_id).unwrap();
        assert_eq!(dep.distance, -1);
        assert!(!di.no_negative_distance(&[store_id], &[load_id]));
    }
}
