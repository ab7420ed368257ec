//! Tests for inlining position calculation.

use std::collections::BTreeSet;

use kiln_ir::{Extent, Graph, IterKind};

use crate::error::Error;
use crate::inline::{MaxPosCalculator, inline_all_at, inline_most, inline_selected_at};
use crate::test::helpers::*;

#[test]
fn copy_chain_inlines_fully() {
    let (mut g, ts) = copy_chain(4);
    inline_most(&mut g, BTreeSet::new()).unwrap();
    for &tv in &ts[1..] {
        assert_eq!(g.compute_at(tv), g.ndims(tv));
    }
    // Graph inputs are never inlined.
    assert_eq!(g.compute_at(ts[0]), 0);
}

#[test]
fn max_pos_never_increases_with_more_forbidden_axes() {
    let (g, ts) = copy_chain(2);
    let t1 = ts[1];

    let unrestricted = MaxPosCalculator::new(&g, BTreeSet::new(), false).get_max_pos_all(t1, false, true);
    assert_eq!(unrestricted, 2);

    let forbidden = BTreeSet::from([g.loop_domain(t1)[0]]);
    let restricted = MaxPosCalculator::new(&g, forbidden, false).get_max_pos_all(t1, false, true);
    assert_eq!(restricted, 0);
    assert!(restricted <= unrestricted);

    let inner_forbidden = BTreeSet::from([g.loop_domain(t1)[1]]);
    let partly = MaxPosCalculator::new(&g, inner_forbidden, false).get_max_pos_all(t1, false, true);
    assert_eq!(partly, 1);
}

#[test]
fn reductions_stop_the_self_position() {
    let mut g = Graph::new();
    let t0 = input_2d(&mut g, 4, 8);
    let t1 = g.reduce(t0, &[1]).unwrap();
    let calc = MaxPosCalculator::new(&g, BTreeSet::new(), false);
    assert_eq!(calc.get_max_pos_self(t1, false, false, false, false), 1);
    assert_eq!(calc.get_max_pos_self(t1, false, true, false, false), 2);
}

#[test]
fn vectorized_axes_stop_the_self_position() {
    let (mut g, ts) = copy_chain(1);
    let t1 = ts[1];
    g.parallelize(g.loop_domain(t1)[1], kiln_ir::ParallelType::Vectorize);
    let calc = MaxPosCalculator::new(&g, BTreeSet::new(), false);
    assert_eq!(calc.get_max_pos_self(t1, false, false, false, false), 1);
    assert_eq!(calc.get_max_pos_self(t1, false, false, true, false), 2);
}

fn squeezed_broadcast_graph() -> (Graph, kiln_ir::TensorId, kiln_ir::TensorId) {
    let mut g = Graph::new();
    let a = iter_axis(&mut g, 4);
    let b = g.new_axis(Extent::one(), IterKind::Broadcast);
    let t0 = g.input_tensor(vec![a, b]);
    let t1 = g.unary(t0);
    let t2 = g.squeeze(t1, vec![false, true]).unwrap();
    (g, t1, t2)
}

#[test]
fn axes_unmappable_to_a_consumer_limit_the_position() {
    let (g, t1, _t2) = squeezed_broadcast_graph();
    let calc = MaxPosCalculator::new(&g, BTreeSet::new(), false);
    assert_eq!(calc.get_max_pos_all(t1, false, true), 1);
    // Best effort tolerates the unmapped broadcast axis.
    assert_eq!(calc.get_max_pos_all(t1, true, true), 2);
}

#[test]
fn compute_at_only_ignores_broadcast_axes_in_the_unmappable_scan() {
    let (g, t1, _t2) = squeezed_broadcast_graph();
    let calc = MaxPosCalculator::new(&g, BTreeSet::new(), true);
    // The broadcast axis is never recorded as unmappable, but it still fails
    // to map to the squeeze, so the consumer limit remains.
    assert_eq!(calc.get_max_pos_self(t1, false, false, false, false), 2);
    assert_eq!(calc.get_max_pos_all(t1, false, true), 1);
}

#[test]
fn sibling_limits_are_shared() {
    let mut g = Graph::new();
    let t0 = input_2d(&mut g, 4, 8);
    let (out, stats) = g.attention(t0).unwrap();
    let calc = MaxPosCalculator::new(&g, BTreeSet::new(), false);
    // The stats sibling only has one loop axis, so the primary output cannot
    // inline past it.
    assert_eq!(calc.get_max_pos_all(stats, false, true), 1);
    assert_eq!(calc.get_max_pos_all(out, false, true), 1);
    assert_eq!(calc.get_max_pos_all(out, false, false), 2);
}

#[test]
fn identical_splits_align_consumer_positions() {
    let (g, _, t1, t2) = identically_split_pair(12, 4);
    let calc = MaxPosCalculator::new(&g, BTreeSet::new(), false);
    assert_eq!(calc.get_consumer_pos_aligned_to_producer_ca(t2, t1, 2), 2);
    assert_eq!(calc.get_consumer_pos_aligned_to_producer_ca(t2, t1, 1), 1);
    assert_eq!(calc.get_consumer_pos_aligned_to_producer_ca(t2, t1, 0), 0);
}

#[test]
fn inline_all_at_propagates_positions_from_the_reference() {
    let (mut g, t0, t1, t2) = identically_split_pair(12, 4);
    inline_all_at(&mut g, t2, 1, true, BTreeSet::new()).unwrap();
    assert_eq!(g.compute_at(t0), 0);
    assert_eq!(g.compute_at(t1), 1);
    assert_eq!(g.compute_at(t2), 1);
}

#[test]
fn inline_selected_at_leaves_unselected_tensors_alone() {
    let (mut g, _, t1, t2) = identically_split_pair(12, 4);
    inline_selected_at(&mut g, &BTreeSet::from([t1]), t2, 1, true, BTreeSet::new()).unwrap();
    assert_eq!(g.compute_at(t1), 1);
    assert_eq!(g.compute_at(t2), 0);
}

#[test]
fn strict_inlining_past_the_limit_is_an_error() {
    let (mut g, t1, _t2) = squeezed_broadcast_graph();
    let err = inline_all_at(&mut g, t1, 2, false, BTreeSet::new()).unwrap_err();
    assert!(matches!(err, Error::InlinePositionTooDeep { .. }));
}
