//! Pass contract
//!
//! `PreservedAnalyses` reports whether a pass's mutation (if any) invalidated
//! previously computed analyses: `All` when nothing changed, `None`
//! otherwise — this core's passes never preserve only a subset, so there is
//! no third `set`-of-analyses state to represent. `FunctionPass`
//! dispatches a function-local pass over every function in a module with an
//! explicit per-function split-borrow loop, rather than an unsafe aliasing
//! shortcut.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::function::Function;
use crate::instruction::FunctionId;
use crate::module::Module;

/// Which analyses a pass's mutation left valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreservedAnalyses {
    /// No mutation occurred; every previously computed analysis is valid.
    All,
    /// The IR changed in a way that invalidates every analysis.
    None,
}

impl PreservedAnalyses {
    pub fn changed(&self) -> bool {
        matches!(self, PreservedAnalyses::None)
    }

    pub fn merge(self, other: PreservedAnalyses) -> PreservedAnalyses {
        if self.changed() || other.changed() {
            PreservedAnalyses::None
        } else {
            PreservedAnalyses::All
        }
    }
}

/// A pass that rewrites one function at a time.
pub trait FunctionPass {
    fn name(&self) -> &'static str;

    fn run_on_function(&mut self, func: &mut Function, module_functions: &[FunctionId]) -> PreservedAnalyses;

    /// Default whole-module driver: take each function's id up front, then
    /// operate on one `&mut Function` at a time. Unlike the teacher's
    /// `OptimizationPass::run_on_module`, this never holds a second
    /// reference into `module` while a function is mutably borrowed —
    /// `module_functions` gives passes read-only visibility into which
    /// other functions exist without aliasing the one being rewritten.
    fn run_on_module(&mut self, module: &mut Module) -> PreservedAnalyses {
        let ids = module.function_ids();
        let mut result = PreservedAnalyses::All;
        for id in ids.iter().copied() {
            if let Ok(func) = module.get_function_mut(id) {
                result = result.merge(self.run_on_function(func, &ids));
            }
        }
        result
    }
}
