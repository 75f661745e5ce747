//! Pass manager
//!
//! Drives the local peephole optimizer, then loop-invariant code motion,
//! then loop fusion over a module, iterated to a fixed point (or
//! `max_iterations`, whichever comes first). There is no `add_pass`
//! extension point: this wires exactly the three passes this crate
//! implements, not an open-ended pass pipeline.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::cfg::ControlFlowGraph;
use crate::licm::LoopInvariantCodeMotion;
use crate::loop_fusion::LoopFusion;
use crate::loops::LoopForest;
use crate::lpo::LocalPeepholeOptimizer;
use crate::module::Module;
use crate::passes::FunctionPass;

/// Optimization level, selecting which passes run and how many fixed-point
/// rounds the pass manager is willing to spend finding out there's nothing
/// left to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    /// No optimization; the pass manager is a no-op.
    None,
    /// LPO only.
    Basic,
    /// LPO and LICM.
    Standard,
    /// LPO, LICM, and LF.
    Aggressive,
    /// LPO and LICM, but not LF: fusing loops can grow a fused body's live
    /// ranges and working set, which cuts against optimizing for size.
    Size,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::Standard
    }
}

/// Which passes run, and how many fixed-point rounds to allow.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    pub level: OptimizationLevel,
    pub lpo: bool,
    pub licm: bool,
    pub loop_fusion: bool,
    pub max_iterations: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::with_level(OptimizationLevel::Standard)
    }
}

impl OptimizerConfig {
    pub fn with_level(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::None => {
                Self { level, lpo: false, licm: false, loop_fusion: false, max_iterations: 0 }
            }
            OptimizationLevel::Basic => {
                Self { level, lpo: true, licm: false, loop_fusion: false, max_iterations: 2 }
            }
            OptimizationLevel::Standard => {
                Self { level, lpo: true, licm: true, loop_fusion: false, max_iterations: 4 }
            }
            OptimizationLevel::Aggressive => {
                Self { level, lpo: true, licm: true, loop_fusion: true, max_iterations: 8 }
            }
            OptimizationLevel::Size => {
                Self { level, lpo: true, licm: true, loop_fusion: false, max_iterations: 4 }
            }
        }
    }
}

/// Drives LPO, LICM, and LF to a fixed point over a module.
pub struct PassManager {
    config: OptimizerConfig,
    lpo: LocalPeepholeOptimizer,
    licm: LoopInvariantCodeMotion,
    loop_fusion: LoopFusion,
}

impl PassManager {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config, lpo: LocalPeepholeOptimizer::new(), licm: LoopInvariantCodeMotion::new(), loop_fusion: LoopFusion::new() }
    }

    /// Run the configured passes to a fixed point, or until `max_iterations`
    /// full rounds have run, whichever comes first.
    pub fn optimize(&mut self, module: &mut Module) -> OptimizationStats {
        let mut stats = OptimizationStats::default();

        for iteration in 0..self.config.max_iterations {
            let mut changed = false;
            stats.iterations = iteration + 1;

            if self.config.lpo {
                let before = total_instructions(module);
                if self.lpo.run_on_module(module).changed() {
                    stats.passes_applied += 1;
                    changed = true;
                    stats.instructions_eliminated += before.saturating_sub(total_instructions(module)) as u64;
                }
            }

            if self.config.licm {
                let before = total_preheader_instructions(module);
                if self.licm.run_on_module(module).changed() {
                    stats.passes_applied += 1;
                    changed = true;
                    stats.instructions_hoisted += total_preheader_instructions(module).saturating_sub(before) as u64;
                }
            }

            if self.config.loop_fusion {
                let before = total_loops(module);
                if self.loop_fusion.run_on_module(module).changed() {
                    stats.passes_applied += 1;
                    changed = true;
                    stats.loops_fused += before.saturating_sub(total_loops(module)) as u64;
                }
            }

            if !changed {
                break;
            }
        }

        stats
    }
}

fn total_instructions(module: &Module) -> usize {
    module.functions().map(|f| f.instructions().count()).sum()
}

fn total_loops(module: &Module) -> usize {
    module
        .functions()
        .filter_map(|f| ControlFlowGraph::from_function(f).map(|cfg| LoopForest::analyze(f, &cfg).len()))
        .sum()
}

fn total_preheader_instructions(module: &Module) -> usize {
    module
        .functions()
        .map(|f| match ControlFlowGraph::from_function(f) {
            Some(cfg) => LoopForest::analyze(f, &cfg)
                .iter()
                .filter_map(|l| l.preheader(&cfg))
                .filter_map(|id| f.blocks.get(id).ok())
                .map(|b| b.len())
                .sum(),
            None => 0,
        })
        .sum()
}

/// Running totals for a `PassManager::optimize` call.
#[derive(Debug, Default, Clone, Copy)]
pub struct OptimizationStats {
    pub iterations: u32,
    pub passes_applied: u64,
    pub instructions_eliminated: u64,
    pub instructions_hoisted: u64,
    pub loops_fused: u64,
}
