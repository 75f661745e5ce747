//! # SSA middle-end core
//!
//! This crate provides an in-memory SSA intermediate representation and a
//! small set of function-local optimization passes over it: a local peephole
//! optimizer, loop-invariant code motion, and loop fusion. It is a
//! standalone middle-end core, not tied to any particular front end or
//! backend target.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         PASS PIPELINE                         │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │   Module { Function* }                                        │
//! │         │                                                      │
//! │         ▼                                                      │
//! │   ┌─────────────┐                                               │
//! │   │  validation │ ◄── structural well-formedness checks         │
//! │   └──────┬──────┘                                               │
//! │          │                                                      │
//! │          ▼                                                      │
//! │   ┌─────────────┐                                               │
//! │   │     lpo     │ ◄── algebraic identities, strength reduction  │
//! │   └──────┬──────┘                                               │
//! │          │                                                      │
//! │          ▼                                                      │
//! │   ┌─────────────┐                                               │
//! │   │    licm     │ ◄── hoist loop-invariant computations         │
//! │   └──────┬──────┘                                               │
//! │          │                                                      │
//! │          ▼                                                      │
//! │   ┌─────────────┐                                               │
//! │   │ loop_fusion │ ◄── merge adjacent, control-flow-equivalent   │
//! │   └─────────────┘     same-trip-count loops                    │
//! │                                                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - IR type system
//! - [`value`] - Values and constants
//! - [`instruction`] - IR instruction set
//! - [`block`] - Basic blocks and control flow
//! - [`function`] - IR function representation
//! - [`module`] - IR module structure
//! - [`builder`] - IR builder utilities
//! - [`analysis`] - Use-def chains
//! - [`cfg`] - Control flow graph, traversal orders
//! - [`dominator`] - Dominator/post-dominator trees, dominance frontiers
//! - [`loops`] - Natural loops and the loop forest
//! - [`scev`] - Scalar evolution facts (induction variables, trip counts)
//! - [`dependence`] - Memory dependence between array accesses
//! - [`validation`] - IR validation
//! - [`passes`] - The function pass contract
//! - [`lpo`] - Local peephole optimizer
//! - [`licm`] - Loop-invariant code motion
//! - [`loop_fusion`] - Loop fusion
//! - [`optimizer`] - Pass manager wiring the above into a pipeline
//! - [`error`] - Crate-wide error type

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod analysis;
pub mod block;
pub mod builder;
pub mod cfg;
pub mod dependence;
pub mod dominator;
pub mod error;
pub mod function;
pub mod instruction;
pub mod licm;
pub mod loop_fusion;
pub mod loops;
pub mod lpo;
pub mod module;
pub mod optimizer;
pub mod passes;
pub mod scev;
pub mod types;
pub mod validation;
pub mod value;

pub use block::*;
pub use builder::*;
pub use error::*;
pub use function::*;
pub use instruction::*;
pub use licm::LoopInvariantCodeMotion;
pub use loop_fusion::LoopFusion;
pub use lpo::LocalPeepholeOptimizer;
pub use module::*;
pub use passes::{FunctionPass, PreservedAnalyses};
pub use types::*;
pub use value::*;
