//! IR validation and diagnostics
//!
//! `Diagnostic`/`Severity` carry enough location context to report problems
//! against a specific function and block; module validation checks the
//! structural invariants every block and function must hold.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::instruction::{BlockId, FunctionId};
use crate::module::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub function: FunctionId,
    pub block: Option<BlockId>,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, location: Location) -> Self {
        Self { severity: Severity::Error, code, message: message.into(), location: Some(location) }
    }
}

/// Validate structural invariants: every block ends in exactly one
/// terminator, and phi nodes only appear at the start of a block.
pub fn validate(module: &Module) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for func in module.functions() {
        for block in func.blocks.iter() {
            if !block.has_terminator() {
                diagnostics.push(Diagnostic::error(
                    "E0001",
                    "block has no terminator",
                    Location { function: func.id, block: Some(block.id) },
                ));
            }
            let mut seen_non_phi = false;
            for inst in block.iter() {
                if inst.is_phi() && seen_non_phi {
                    diagnostics.push(Diagnostic::error(
                        "E0002",
                        "phi node after non-phi instruction",
                        Location { function: func.id, block: Some(block.id) },
                    ));
                }
                if !inst.is_phi() {
                    seen_non_phi = true;
                }
            }
            for (i, inst) in block.iter().enumerate() {
                if inst.is_terminator() && i + 1 != block.len() {
                    diagnostics.push(Diagnostic::error(
                        "E0003",
                        "terminator is not the last instruction",
                        Location { function: func.id, block: Some(block.id) },
                    ));
                }
            }
        }
    }
    diagnostics
}
