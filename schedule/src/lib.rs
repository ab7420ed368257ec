//! Scheduling analyses for the kiln compiler.
//!
//! This crate decides, for a finished tensor graph, which axes correspond
//! across tensors, which broadcast axes acquire real width, how deep loop
//! nests may be shared, and what extent each hardware dimension carries.
//!
//! # Module Organization
//!
//! - [`concretize`] - Broadcast concretization analysis
//! - [`propagate`] - Max-information spanning tree (Prim's variant) with the
//!   Selector/Propagator replay interfaces
//! - [`domain_info`] - The root/logical domain information payload and its
//!   transfer rules
//! - [`inline`] - Inlining position calculator, `inline_most`/`inline_all_at`
//! - [`parallel_map`] - Parallel dimension map with warp padding and warp
//!   specialization
//! - [`error`] - Error types and result handling

pub mod concretize;
pub mod domain_info;
pub mod error;
pub mod inline;
pub mod parallel_map;
pub mod propagate;

#[cfg(test)]
pub mod test;

pub use concretize::ConcretizedBroadcastAxes;
pub use domain_info::{AxisInfo, DomainInfo, LogicalDomainModel};
pub use error::{Error, Result};
pub use inline::{MaxPosCalculator, inline_all_at, inline_most, inline_most_selected, inline_selected_at};
pub use parallel_map::{ParallelDimensionMap, WARP_SIZE, WarpPadInfo};
pub use propagate::{
    Edge, EdgeKind, InfoModel, MaxInfoSpanningTree, Propagator, Selector, SetSelector, SpanningTreePrinter,
};
