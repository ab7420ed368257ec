//! Graph layer for the kiln compiler.
//!
//! This crate holds the tensor/axis graph arena and the narrow collaborator
//! interfaces consumed by the scheduling analyses in `kiln_schedule`:
//!
//! # Module Organization
//!
//! - [`types`] - Arena handles, axis kinds, parallel types
//! - [`extent`] - Symbolic extent expressions and their simplifier
//! - [`graph`] - The graph arena: construction, scheduling and traversal API
//! - [`domain_map`] - Pairwise domain mapper and the exact/permissive
//!   axis-equivalence oracle
//! - [`error`] - Error types and result handling

pub mod domain_map;
pub mod error;
pub mod extent;
pub mod graph;
pub mod types;

pub use domain_map::{AxisEquivalence, PairwiseDomainMap};
pub use error::{Error, Result};
pub use extent::Extent;
pub use graph::{Axis, AxisOp, AxisOpKind, Graph, OpKind, TensorOp};
pub use types::{
    AxisId, AxisOpId, CircularBufferType, IterKind, MappingMode, OpId, PARALLEL_TYPE_THREADS, PARALLEL_TYPE_TIDS,
    ParallelType, TensorId,
};
