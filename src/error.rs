//! Crate error type
//!
//! Programmer-facing lookup failures use a typed `Result`. The optimization
//! passes themselves never return errors — a pass that can't legally apply
//! just reports no change — so this type is only for the IR-construction
//! and query surface.
//!
//! `thiserror`'s derive expands to an `impl std::error::Error`, which isn't
//! available under `no_std`; that configuration gets a hand-rolled
//! `Display`/`core::error::Error` impl instead.

use core::fmt;

use crate::instruction::{BlockId, FunctionId, InstructionId};
use crate::value::ValueId;

#[cfg(feature = "std")]
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),
    #[error("unknown instruction {0}")]
    UnknownInstruction(InstructionId),
    #[error("unknown value {0}")]
    UnknownValue(ValueId),
    #[error("block {0} has no terminator")]
    MissingTerminator(BlockId),
    #[error("malformed terminator in block {0}")]
    MalformedTerminator(BlockId),
}

#[cfg(not(feature = "std"))]
#[derive(Debug)]
pub enum IrError {
    UnknownBlock(BlockId),
    UnknownFunction(FunctionId),
    UnknownInstruction(InstructionId),
    UnknownValue(ValueId),
    MissingTerminator(BlockId),
    MalformedTerminator(BlockId),
}

#[cfg(not(feature = "std"))]
impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrError::UnknownBlock(id) => write!(f, "unknown block {id}"),
            IrError::UnknownFunction(id) => write!(f, "unknown function {id}"),
            IrError::UnknownInstruction(id) => write!(f, "unknown instruction {id}"),
            IrError::UnknownValue(id) => write!(f, "unknown value {id}"),
            IrError::MissingTerminator(id) => write!(f, "block {id} has no terminator"),
            IrError::MalformedTerminator(id) => write!(f, "malformed terminator in block {id}"),
        }
    }
}

#[cfg(not(feature = "std"))]
impl core::error::Error for IrError {}
