//! Local Peephole Optimizer
//!
//! Per-block algebraic simplification and strength reduction on binary
//! integer operations, followed by local dead-code elimination: multiply and
//! divide by a power of two (or a power of two plus or minus one) become
//! shifts, additive and subtractive identities fold away, and an add/sub
//! pair that cancels through an intervening use is recognized directly.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::function::Function;
use crate::instruction::{BinaryOp, FunctionId, Instruction, InstructionId};
use crate::passes::{FunctionPass, PreservedAnalyses};
use crate::value::{ConstantInt, ValueId};

#[derive(Debug, Default)]
pub struct LocalPeepholeOptimizer;

impl LocalPeepholeOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// If `rhs` (and only `rhs`) is a known integer constant, return the
    /// non-constant `lhs` paired with that constant. Division opcodes only
    /// ever treat the divisor (rhs) as a candidate constant.
    fn rhs_constant(func: &Function, lhs: ValueId, rhs: ValueId) -> Option<(ValueId, ConstantInt)> {
        func.value(rhs).ok().and_then(|v| v.as_constant()).map(|c| (lhs, c))
    }

    /// For commutative ops (`Add`, `Mul`), either operand may carry the
    /// constant; the first one found wins ties.
    fn commutative_constant(func: &Function, lhs: ValueId, rhs: ValueId) -> Option<(ValueId, ConstantInt)> {
        if let Some(c) = func.value(lhs).ok().and_then(|v| v.as_constant()) {
            return Some((rhs, c));
        }
        func.value(rhs).ok().and_then(|v| v.as_constant()).map(|c| (lhs, c))
    }

    fn is_known_non_negative(func: &Function, v: ValueId) -> bool {
        func.value(v).ok().and_then(|val| val.as_constant()).map_or(false, |c| !c.is_negative())
    }

    /// Attempt to rewrite one instruction. On success, returns the
    /// replacement value every use of this instruction's result should be
    /// redirected to (instructions may be appended to the block as a side
    /// effect via `builder`).
    fn rewrite(
        func: &mut Function,
        block: crate::instruction::BlockId,
        index: usize,
    ) -> Option<ValueId> {
        let (op, ty, lhs, rhs, result) = {
            let inst = &func.blocks.get(block).unwrap().instructions[index];
            let Instruction::Binary { op, ty, lhs, rhs, id } = inst else { return None };
            (*op, *ty, *lhs, *rhs, *id)
        };

        let width = ty.bit_width().unwrap_or(64);

        match op {
            BinaryOp::Mul => {
                let (x, c) = Self::commutative_constant(func, lhs, rhs)?;
                if c.is_one() {
                    return Some(x);
                }
                if let Some(k) = c.exact_log2() {
                    if u32::from(width) > k {
                        let shift = func.constant(ConstantInt::new(i64::from(k), width));
                        let mut builder = crate::builder::IrBuilder::before(func, block, index + 1);
                        let shl = builder.build_binary(BinaryOp::Shl, ty, x, shift);
                        return Some(shl);
                    }
                    return None;
                }
                if let Some(k) = c.add(1).exact_log2() {
                    if u32::from(width) > k {
                        let shift = func.constant(ConstantInt::new(i64::from(k), width));
                        let mut builder = crate::builder::IrBuilder::before(func, block, index + 1);
                        let shl = builder.build_binary(BinaryOp::Shl, ty, x, shift);
                        let sub = builder.build_binary(BinaryOp::Sub, ty, shl, x);
                        return Some(sub);
                    }
                    return None;
                }
                if let Some(k) = c.sub(1).exact_log2() {
                    if u32::from(width) > k {
                        let shift = func.constant(ConstantInt::new(i64::from(k), width));
                        let mut builder = crate::builder::IrBuilder::before(func, block, index + 1);
                        let shl = builder.build_binary(BinaryOp::Shl, ty, x, shift);
                        let add = builder.build_binary(BinaryOp::Add, ty, shl, x);
                        return Some(add);
                    }
                }
                None
            }
            BinaryOp::Add => {
                let (x, c) = Self::commutative_constant(func, lhs, rhs)?;
                if c.is_zero() {
                    return Some(x);
                }
                cancel_cross_instruction(func, result, BinaryOp::Sub, c);
                None
            }
            BinaryOp::Sub => {
                let (x, c) = Self::rhs_constant(func, lhs, rhs)?;
                if c.is_zero() {
                    return Some(x);
                }
                cancel_cross_instruction(func, result, BinaryOp::Add, c);
                None
            }
            BinaryOp::UDiv => {
                let (x, c) = Self::rhs_constant(func, lhs, rhs)?;
                let k = c.exact_log2()?;
                if u32::from(width) <= k {
                    return None;
                }
                let shift = func.constant(ConstantInt::new(i64::from(k), width));
                let mut builder = crate::builder::IrBuilder::before(func, block, index + 1);
                Some(builder.build_binary(BinaryOp::LShr, ty, x, shift))
            }
            BinaryOp::SDiv => {
                let (x, c) = Self::rhs_constant(func, lhs, rhs)?;
                if c.is_negative() || !Self::is_known_non_negative(func, x) {
                    return None;
                }
                let k = c.exact_log2()?;
                if u32::from(width) <= k {
                    return None;
                }
                let shift = func.constant(ConstantInt::new(i64::from(k), width));
                let mut builder = crate::builder::IrBuilder::before(func, block, index + 1);
                Some(builder.build_binary(BinaryOp::LShr, ty, x, shift))
            }
            _ => None,
        }
    }
}

/// For every `op(other, c)` instruction that consumes `defined`, redirect
/// its uses to whichever operand of `defined`'s own definition supplied the
/// pre-cancellation value (cross-instruction add/sub cancellation).
fn cancel_cross_instruction(func: &mut Function, defined: ValueId, op: BinaryOp, c: ConstantInt) {
    let x = {
        let (_, inst) = func.find_instruction(defined).unwrap();
        match inst {
            Instruction::Binary { lhs, rhs, .. } => {
                if func.value(*rhs).ok().and_then(|v| v.as_constant()).map_or(false, |rc| rc == c) {
                    *lhs
                } else if func.value(*lhs).ok().and_then(|v| v.as_constant()).map_or(false, |lc| lc == c) {
                    *rhs
                } else {
                    return;
                }
            }
            _ => return,
        }
    };

    let candidates: Vec<(crate::instruction::BlockId, InstructionId)> = func
        .blocks
        .iter()
        .flat_map(|b| b.iter().map(move |i| (b.id, i)))
        .filter_map(|(bid, inst)| match inst {
            Instruction::Binary { op: found_op, lhs, rhs, id, .. } if *found_op == op && *lhs == defined => {
                func.value(*rhs).ok().and_then(|v| v.as_constant()).filter(|rc| *rc == c).map(|_| (bid, *id))
            }
            _ => None,
        })
        .collect();

    for (_, user_id) in candidates {
        func.replace_all_uses(user_id, x);
    }
}

impl FunctionPass for LocalPeepholeOptimizer {
    fn name(&self) -> &'static str {
        "local-peephole-optimizer"
    }

    fn run_on_function(&mut self, func: &mut Function, _module_functions: &[FunctionId]) -> PreservedAnalyses {
        let mut changed = false;
        let block_ids = func.blocks.ids();

        for block_id in block_ids {
            let mut index = 0;
            loop {
                let len = func.blocks.get(block_id).unwrap().instructions.len();
                if index >= len {
                    break;
                }
                let is_binary = matches!(func.blocks.get(block_id).unwrap().instructions[index], Instruction::Binary { .. });
                if is_binary {
                    if let Some(replacement) = Self::rewrite(func, block_id, index) {
                        let old = {
                            let Instruction::Binary { id, .. } = &func.blocks.get(block_id).unwrap().instructions[index] else { unreachable!() };
                            *id
                        };
                        func.replace_all_uses(old, replacement);
                        changed = true;
                        log::debug!("lpo: rewrote value {old} to {replacement}");
                    }
                }
                index += 1;
            }

            // Local DCE: remove binary/compare instructions with no uses.
            let used = used_values(func);
            let removed = func.blocks.get_mut(block_id).unwrap().remove_dead(&used);
            if removed > 0 {
                changed = true;
                log::debug!("lpo: removed {removed} dead instruction(s) from block {block_id}");
            }
        }

        if changed {
            PreservedAnalyses::None
        } else {
            PreservedAnalyses::All
        }
    }
}

fn used_values(func: &Function) -> HashSet<ValueId> {
    let mut used = HashSet::new();
    for inst in func.instructions() {
        for operand in inst.operands() {
            used.insert(operand);
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IrType;

    fn single_block_mul(c: i64) -> (Function, InstructionId) {
        let mut f = Function::new(0, "f", IrType::I32);
        let b = f.blocks.create_entry_block();
        let x = f.add_param(IrType::I32, None);
        let cst = f.constant(ConstantInt::new(c, 32));
        let mul_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Binary { id: mul_id, op: BinaryOp::Mul, ty: IrType::I32, lhs: x, rhs: cst });
        f.blocks.get_mut(b).unwrap().push(Instruction::RetValue { id: f.alloc_instruction_id(None), value: mul_id });
        (f, mul_id)
    }

    #[test]
    fn mul_by_power_of_two_becomes_shift() {
        let (mut f, mul_id) = single_block_mul(8);
        let mut lpo = LocalPeepholeOptimizer::new();
        let ids = vec![0];
        lpo.run_on_function(&mut f, &ids);

        let entry = f.entry_block().unwrap();
        let insts: Vec<_> = f.blocks.get(entry).unwrap().iter().collect();
        assert!(insts.iter().any(|i| matches!(i, Instruction::Binary { op: BinaryOp::Shl, .. })));
        assert!(!insts.iter().any(|i| i.id() == mul_id));
    }

    #[test]
    fn mul_by_fifteen_uses_shift_and_sub() {
        let (mut f, _) = single_block_mul(15);
        let mut lpo = LocalPeepholeOptimizer::new();
        lpo.run_on_function(&mut f, &[0]);

        let entry = f.entry_block().unwrap();
        let insts: Vec<_> = f.blocks.get(entry).unwrap().iter().collect();
        assert!(insts.iter().any(|i| matches!(i, Instruction::Binary { op: BinaryOp::Shl, .. })));
        assert!(insts.iter().any(|i| matches!(i, Instruction::Binary { op: BinaryOp::Sub, .. })));
    }

    #[test]
    fn add_then_sub_cancels() {
        let mut f = Function::new(0, "f", IrType::I32);
        let b = f.blocks.create_entry_block();
        let x = f.add_param(IrType::I32, None);
        let one = f.constant(ConstantInt::new(1, 32));
        let add_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Binary { id: add_id, op: BinaryOp::Add, ty: IrType::I32, lhs: x, rhs: one });
        let sub_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Binary { id: sub_id, op: BinaryOp::Sub, ty: IrType::I32, lhs: add_id, rhs: one });
        f.blocks.get_mut(b).unwrap().push(Instruction::RetValue { id: f.alloc_instruction_id(None), value: sub_id });

        let mut lpo = LocalPeepholeOptimizer::new();
        lpo.run_on_function(&mut f, &[0]);

        let entry = f.entry_block().unwrap();
        let ret = f.blocks.get(entry).unwrap().terminator().unwrap();
        assert!(matches!(ret, Instruction::RetValue { value, .. } if *value == x));
    }

    #[test]
    fn udiv_by_power_of_two_becomes_lshr() {
        let mut f = Function::new(0, "f", IrType::I32);
        let b = f.blocks.create_entry_block();
        let x = f.add_param(IrType::I32, None);
        let sixteen = f.constant(ConstantInt::new(16, 32));
        let div_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Binary { id: div_id, op: BinaryOp::UDiv, ty: IrType::I32, lhs: x, rhs: sixteen });
        f.blocks.get_mut(b).unwrap().push(Instruction::RetValue { id: f.alloc_instruction_id(None), value: div_id });

        let mut lpo = LocalPeepholeOptimizer::new();
        lpo.run_on_function(&mut f, &[0]);

        let entry = f.entry_block().unwrap();
        let insts: Vec<_> = f.blocks.get(entry).unwrap().iter().collect();
        assert!(insts.iter().any(|i| matches!(i, Instruction::Binary { op: BinaryOp::LShr, .. })));
    }

    #[test]
    fn udiv_with_constant_dividend_is_untouched() {
        // `udiv 16, %x` — the power-of-two dividend must not be rewritten.
        let mut f = Function::new(0, "f", IrType::I32);
        let b = f.blocks.create_entry_block();
        let x = f.add_param(IrType::I32, None);
        let sixteen = f.constant(ConstantInt::new(16, 32));
        let div_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(b).unwrap().push(Instruction::Binary { id: div_id, op: BinaryOp::UDiv, ty: IrType::I32, lhs: sixteen, rhs: x });
        f.blocks.get_mut(b).unwrap().push(Instruction::RetValue { id: f.alloc_instruction_id(None), value: div_id });

        let mut lpo = LocalPeepholeOptimizer::new();
        lpo.run_on_function(&mut f, &[0]);

        let entry = f.entry_block().unwrap();
        let insts: Vec<_> = f.blocks.get(entry).unwrap().iter().collect();
        assert!(insts.iter().any(|i| matches!(i, Instruction::Binary { op: BinaryOp::UDiv, .. })));
    }
}
