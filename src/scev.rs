//! Scalar evolution
//!
//! A minimal facade recognizing the canonical induction-variable shape: a
//! header phi stepped by a constant in the latch, compared against a
//! loop-invariant bound by the exiting block's conditional branch. Needed by
//! Loop Fusion's same-trip-count legality check.

use crate::function::Function;
use crate::instruction::{BinaryOp, ICmpPredicate, Instruction};
use crate::loops::Loop;
use crate::value::ValueId;

/// A loop-invariant operand of a trip-count expression, resolved enough to
/// compare two loops from different parts of the IR (or different
/// functions) for equality: two occurrences of the same constant compare
/// equal by value, not by which constant instruction produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Const(i64),
    Value(ValueId),
}

/// A trip count, symbolic where it can be, unknown otherwise.
///
/// `Unknown` never compares equal to anything, including itself, so a loop
/// whose bound can't be recognized can never be judged to share a trip
/// count with another loop.
#[derive(Debug, Clone, Copy)]
pub enum TripCount {
    /// `(bound - start) / step`, all operands loop-invariant.
    Affine { start: Operand, bound: Operand, step: i64 },
    Constant(u64),
    Unknown,
}

impl PartialEq for TripCount {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TripCount::Constant(a), TripCount::Constant(b)) => a == b,
            (TripCount::Affine { start: s1, bound: b1, step: st1 }, TripCount::Affine { start: s2, bound: b2, step: st2 }) => {
                s1 == s2 && b1 == b2 && st1 == st2
            }
            _ => false,
        }
    }
}

/// Scalar-evolution facade over a single function.
pub struct ScalarEvolution<'a> {
    func: &'a Function,
}

impl<'a> ScalarEvolution<'a> {
    pub fn new(func: &'a Function) -> Self {
        Self { func }
    }

    /// Recognize the loop's canonical induction variable: the unique phi in
    /// the header stepped by a constant `Add`/`Sub` in the latch. Returns the
    /// phi's own id, its starting value (the incoming value on the
    /// non-latch, i.e. pre-header, edge), and its per-iteration step.
    pub fn canonical_induction_variable(&self, l: &Loop) -> Option<(ValueId, ValueId, i64)> {
        let header = self.func.blocks.get(l.header).ok()?;
        for phi in header.phis() {
            let Instruction::Phi { id, incoming, .. } = phi else { continue };
            let start = incoming.iter().find(|(pred, _)| *pred != l.latch).map(|(_, v)| *v)?;
            for &(pred, incoming_value) in incoming {
                if pred != l.latch {
                    continue;
                }
                if let Ok((_, step_inst)) = self.func.find_instruction(incoming_value) {
                    if let Instruction::Binary { op: BinaryOp::Add, lhs, rhs, .. } = step_inst {
                        if *lhs == *id {
                            if let Some(step) = self.as_constant_i64(*rhs) {
                                return Some((*id, start, step));
                            }
                        }
                    }
                    if let Instruction::Binary { op: BinaryOp::Sub, lhs, rhs, .. } = step_inst {
                        if *lhs == *id {
                            if let Some(step) = self.as_constant_i64(*rhs) {
                                return Some((*id, start, -step));
                            }
                        }
                    }
                }
            }
        }
        None
    }

    fn as_constant_i64(&self, v: ValueId) -> Option<i64> {
        self.func.value(v).ok().and_then(|val| val.as_constant()).map(|c| c.to_i64())
    }

    /// Resolve a value to a comparable [`Operand`]: constants compare by
    /// their numeric value regardless of which constant instruction produced
    /// them, so two structurally identical loops with separately-allocated
    /// "0" constants are still recognized as sharing a trip count.
    fn as_operand(&self, v: ValueId) -> Operand {
        match self.as_constant_i64(v) {
            Some(c) => Operand::Const(c),
            None => Operand::Value(v),
        }
    }

    /// Compute the symbolic trip count of `l` from its exiting block's
    /// comparison against the canonical induction variable.
    pub fn trip_count(&self, l: &Loop, exiting: crate::instruction::BlockId) -> TripCount {
        let Some((iv, start, step)) = self.canonical_induction_variable(l) else { return TripCount::Unknown };
        let Ok(block) = self.func.blocks.get(exiting) else { return TripCount::Unknown };
        let Some(Instruction::CondBr { cond, .. }) = block.terminator() else { return TripCount::Unknown };
        let Ok((_, cmp)) = self.func.find_instruction(*cond) else { return TripCount::Unknown };
        let Instruction::Compare { pred, lhs, rhs, .. } = cmp else { return TripCount::Unknown };
        if !matches!(pred, ICmpPredicate::Slt | ICmpPredicate::Ult | ICmpPredicate::Ne) {
            return TripCount::Unknown;
        }
        let bound_side = if *lhs == iv { *rhs } else if *rhs == iv { *lhs } else { return TripCount::Unknown };
        TripCount::Affine { start: self.as_operand(start), bound: self.as_operand(bound_side), step }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::types::IrType;
    use crate::value::ConstantInt;

    #[test]
    fn unknown_never_equals_itself() {
        assert_ne!(TripCount::Unknown, TripCount::Unknown);
    }

    fn counted_loop(bound_value: i64) -> (Function, Loop, crate::instruction::BlockId) {
        let mut f = Function::new(0, "f", IrType::Void);
        let pre = f.blocks.create_entry_block();
        let header = f.blocks.create_block();
        let body = f.blocks.create_block();
        let exit = f.blocks.create_block();

        let zero = f.constant(ConstantInt::new(0, 32));
        let one = f.constant(ConstantInt::new(1, 32));
        let bound = f.constant(ConstantInt::new(bound_value, 32));

        let phi_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(header).unwrap().push(Instruction::Phi { id: phi_id, ty: IrType::I32, incoming: vec![(pre, zero), (body, 0)] });
        let cmp_id = f.alloc_instruction_id(Some(IrType::Bool));
        f.blocks.get_mut(header).unwrap().push(Instruction::Compare { id: cmp_id, pred: ICmpPredicate::Slt, lhs: phi_id, rhs: bound });
        f.blocks.get_mut(header).unwrap().push(Instruction::CondBr { id: f.alloc_instruction_id(None), cond: cmp_id, true_target: body, false_target: exit });

        let step_id = f.alloc_instruction_id(Some(IrType::I32));
        f.blocks.get_mut(body).unwrap().push(Instruction::Binary { id: step_id, op: BinaryOp::Add, ty: IrType::I32, lhs: phi_id, rhs: one });
        f.blocks.get_mut(body).unwrap().push(Instruction::Br { id: f.alloc_instruction_id(None), target: header });

        f.blocks.get_mut(exit).unwrap().push(Instruction::Ret { id: f.alloc_instruction_id(None) });

        if let Some(Instruction::Phi { incoming, .. }) = f.blocks.get_mut(header).unwrap().iter_mut().next() {
            incoming[1].1 = step_id;
        }
        f.blocks.rebuild_edges();

        let mut blocks = hashbrown::HashSet::new();
        blocks.insert(header);
        blocks.insert(body);
        let l = Loop { header, latch: body, blocks, parent: None, children: vec![], depth: 1 };
        (f, l, header)
    }

    #[test]
    fn recognizes_canonical_induction_variable() {
        let (f, l, _) = counted_loop(10);
        let se = ScalarEvolution::new(&f);
        let (_, start, step) = se.canonical_induction_variable(&l).unwrap();
        assert_eq!(step, 1);
        assert_eq!(se.as_operand(start), Operand::Const(0));
    }

    #[test]
    fn same_bound_same_trip_count_even_across_functions() {
        let (f1, l1, h1) = counted_loop(10);
        let (f2, l2, h2) = counted_loop(10);
        let se1 = ScalarEvolution::new(&f1);
        let se2 = ScalarEvolution::new(&f2);
        let tc1 = se1.trip_count(&l1, h1);
        let tc2 = se2.trip_count(&l2, h2);
        // Both loops count from the constant 0 to the constant 10 by 1,
        // even though the two "0"/"10" constants are separate instructions
        // in separate functions: constants compare by value, not identity.
        assert_eq!(tc1, tc2);
        let tc1_again = se1.trip_count(&l1, h1);
        assert_eq!(tc1, tc1_again);
    }

    #[test]
    fn different_bound_differs() {
        let (f1, l1, h1) = counted_loop(10);
        let (f2, l2, h2) = counted_loop(20);
        let se1 = ScalarEvolution::new(&f1);
        let se2 = ScalarEvolution::new(&f2);
        assert_ne!(se1.trip_count(&l1, h1), se2.trip_count(&l2, h2));
    }
}
