//! Tests for broadcast concretization analysis.

use kiln_ir::{AxisEquivalence, Extent, Graph};

use crate::concretize::ConcretizedBroadcastAxes;
use crate::test::helpers::*;

#[test]
fn unconsumed_broadcast_is_never_concretized() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 8);
    let t1 = g.broadcast(t0, vec![true, false]).unwrap();
    let t2 = g.unary(t1);
    let bcast = g.root_domain(t1)[0];

    let equivalence = AxisEquivalence::build(&g);
    let analysis = ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap();

    assert!(!analysis.is_concretized(bcast));
    assert!(analysis.all_concretized(bcast).is_empty());
    // The copy's mirrored broadcast axis inherits the origin but is not
    // concretized either.
    assert!(!analysis.is_concretized(g.root_domain(t2)[0]));
}

#[test]
fn binary_against_concrete_axis_concretizes_uniquely() {
    let (g, _, t1, _, t3) = broadcast_then_binary(3);
    let bcast = g.root_domain(t1)[0];
    let concrete = g.root_domain(t3)[0];

    let equivalence = AxisEquivalence::build(&g);
    let analysis = ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap();

    assert!(analysis.is_concretized(bcast));
    assert!(analysis.is_uniquely_concretized(bcast));
    assert!(!analysis.maybe_non_uniquely_concretized(bcast));
    assert_eq!(analysis.all_concretized(bcast).into_iter().collect::<Vec<_>>(), vec![concrete]);
}

#[test]
fn exactly_equal_concretizers_deduplicate() {
    // The same broadcast consumed twice against the same concrete tensor:
    // both concretizing axes are exactly mapped, so the set stays at one.
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 8);
    let t1 = g.broadcast(t0, vec![true, false]).unwrap();
    let t2 = input_2d(&mut g, 3, 8);
    let _t3 = g.binary(t1, t2).unwrap();
    let _t4 = g.binary(t1, t2).unwrap();
    let bcast = g.root_domain(t1)[0];

    let equivalence = AxisEquivalence::build(&g);
    let analysis = ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap();

    assert!(analysis.is_uniquely_concretized(bcast));
}

#[test]
fn distinct_concretizers_are_counted() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 8);
    let t1 = g.broadcast(t0, vec![true, false]).unwrap();
    let t2 = input_2d(&mut g, 3, 8);
    let t3 = input_2d(&mut g, 5, 8);
    let _ = g.binary(t1, t2).unwrap();
    let _ = g.binary(t1, t3).unwrap();
    let bcast = g.root_domain(t1)[0];

    let equivalence = AxisEquivalence::build(&g);
    let analysis = ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap();

    assert!(analysis.is_concretized(bcast));
    assert!(analysis.maybe_non_uniquely_concretized(bcast));
    assert_eq!(analysis.all_concretized(bcast).len(), 2);
}

#[test]
fn trivial_reduction_does_not_concretize() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 8);
    let t1 = g.broadcast(t0, vec![true, false]).unwrap();
    let _t2 = g.reduce(t1, &[0]).unwrap();
    let bcast = g.root_domain(t1)[0];

    let equivalence = AxisEquivalence::build(&g);
    let analysis = ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap();

    assert!(!analysis.is_concretized(bcast));
}

#[test]
fn truncation_to_one_seeds_a_fresh_origin() {
    let mut g = Graph::new();
    let t0 = input_2d(&mut g, 16, 8);
    let t1 = g.narrow(t0, 0, Extent::Const(1)).unwrap();
    let t2 = input_2d(&mut g, 16, 8);
    let _t3 = g.binary(t1, t2).unwrap();
    let introduced = g.logical_domain(t1)[0];
    assert!(g.axis(introduced).is_broadcast());

    let equivalence = AxisEquivalence::build(&g);
    let analysis = ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap();

    assert!(analysis.is_uniquely_concretized(introduced));
}

#[test]
fn concretization_sets_grow_monotonically_under_extension() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 8);
    let t1 = g.broadcast(t0, vec![true, false]).unwrap();
    let bcast = g.root_domain(t1)[0];

    let before = {
        let equivalence = AxisEquivalence::build(&g);
        ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap().all_concretized(bcast)
    };
    assert!(before.is_empty());

    let t2 = input_2d(&mut g, 3, 8);
    let _t3 = g.binary(t1, t2).unwrap();
    let after = {
        let equivalence = AxisEquivalence::build(&g);
        ConcretizedBroadcastAxes::build(&g, &equivalence).unwrap().all_concretized(bcast)
    };
    assert!(before.is_subset(&after));
    assert_eq!(after.len(), 1);
}
