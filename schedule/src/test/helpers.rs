//! Test utilities for the scheduling analyses.
//!
//! Helper constructors for the graph shapes the analyses care about:
//! elementwise chains, broadcast-then-binary concretization patterns, and
//! identically scheduled producer/consumer pairs.

use kiln_ir::{AxisId, Extent, Graph, IterKind, TensorId};

pub fn iter_axis(g: &mut Graph, extent: i64) -> AxisId {
    g.new_axis(Extent::Const(extent), IterKind::Iteration)
}

pub fn input_1d(g: &mut Graph, extent: i64) -> TensorId {
    let a = iter_axis(g, extent);
    g.input_tensor(vec![a])
}

pub fn input_2d(g: &mut Graph, d0: i64, d1: i64) -> TensorId {
    let a = iter_axis(g, d0);
    let b = iter_axis(g, d1);
    g.input_tensor(vec![a, b])
}

/// A straight chain of `copies` elementwise copy tensors after one 2D input.
/// Returns the graph and all tensors, input first.
pub fn copy_chain(copies: usize) -> (Graph, Vec<TensorId>) {
    let mut g = Graph::new();
    let mut tensors = vec![input_2d(&mut g, 4, 8)];
    for _ in 0..copies {
        let last = *tensors.last().unwrap();
        tensors.push(g.unary(last));
    }
    (g, tensors)
}

/// The canonical concretization pattern:
///
/// ```text
/// t0[i1]  --broadcast-->  t1[b, i1]
/// t2[i0, i1]  --binary(t1)-->  t3[i0, i1]
/// ```
///
/// Returns `(graph, t0, t1, t2, t3)`; the broadcast axis is
/// `root_domain(t1)[0]`.
pub fn broadcast_then_binary(concrete_extent: i64) -> (Graph, TensorId, TensorId, TensorId, TensorId) {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 8);
    let t1 = g.broadcast(t0, vec![true, false]).unwrap();
    let t2 = input_2d(&mut g, concrete_extent, 8);
    let t3 = g.binary(t1, t2).unwrap();
    (g, t0, t1, t2, t3)
}

/// Two copies in a row with the same split replayed on both, so their loop
/// axes land in the same equivalence classes.
pub fn identically_split_pair(extent: i64, factor: i64) -> (Graph, TensorId, TensorId, TensorId) {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, extent);
    let t1 = g.unary(t0);
    let t2 = g.unary(t1);
    g.split(t1, 0, factor).unwrap();
    g.split(t2, 0, factor).unwrap();
    (g, t0, t1, t2)
}
