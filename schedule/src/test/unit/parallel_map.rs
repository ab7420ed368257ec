//! Tests for the parallel dimension map.

use kiln_ir::{AxisEquivalence, CircularBufferType, Extent, Graph, IterKind, ParallelType};
use test_case::test_case;

use crate::error::Error;
use crate::parallel_map::{ParallelDimensionMap, WARP_SIZE, WarpPadInfo};
use crate::test::helpers::*;

fn build(g: &Graph, warp_pad: &WarpPadInfo) -> crate::error::Result<ParallelDimensionMap> {
    let equivalence = AxisEquivalence::build(g);
    ParallelDimensionMap::build(g, &equivalence, warp_pad)
}

#[test]
fn disagreeing_extents_take_the_maximum_and_lose_exactness() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 3);
    let t1 = input_1d(&mut g, 5);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);
    g.parallelize(g.loop_domain(t1)[0], ParallelType::TIDx);

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDx), Some(&Extent::Const(5)));
    assert!(!map.is_exact(ParallelType::TIDx));
}

#[test]
fn exactly_mapped_axes_keep_the_dimension_exact() {
    let (mut g, ts) = copy_chain(1);
    g.parallelize(g.loop_domain(ts[0])[0], ParallelType::TIDx);
    g.parallelize(g.loop_domain(ts[1])[0], ParallelType::TIDx);

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDx), Some(&Extent::Const(4)));
    assert!(map.is_exact(ParallelType::TIDx));
    assert!(map.get_raw(ParallelType::TIDy).is_none());
}

#[test]
fn broadcast_axes_carry_no_shape_information() {
    let mut g = Graph::new();
    let b = g.new_axis(Extent::one(), IterKind::Broadcast);
    let t0 = g.input_tensor(vec![b]);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert!(map.get_raw(ParallelType::TIDx).is_none());
    assert!(map.get(ParallelType::TIDx).is_none());
}

#[test]
fn dynamic_extents_fall_back_to_the_launch_scalar() {
    let mut g = Graph::new();
    let a = g.new_axis(Extent::sym("n"), IterKind::Iteration);
    let t0 = g.input_tensor(vec![a]);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDx), Some(&Extent::sym("n")));
    assert_eq!(map.get(ParallelType::TIDx), Some(Extent::ParallelDim(ParallelType::TIDx)));
    assert!(map.is_exact(ParallelType::TIDx));
}

#[test_case(32, 32, true ; "one full warp is untouched")]
#[test_case(64, 64, true ; "two full warps are untouched")]
#[test_case(20, 32, false ; "partial warp rounds up and demotes exactness")]
#[test_case(33, 64, false ; "one extra thread claims a whole warp")]
fn warp_padding_rounds_up_to_a_warp_multiple(extent: i64, padded: i64, exact: bool) {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, extent);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);

    let pad = WarpPadInfo { is_tidx_padded: true, is_tidx_single_warp: false, has_warp_reduction: true };
    let map = build(&g, &pad).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDx), Some(&Extent::Const(padded)));
    assert_eq!(map.is_exact(ParallelType::TIDx), exact);
}

#[test]
fn single_warp_padding_uses_the_literal_warp_size() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 20);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);

    let pad = WarpPadInfo { is_tidx_padded: true, is_tidx_single_warp: true, has_warp_reduction: true };
    let map = build(&g, &pad).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDx), Some(&Extent::Const(WARP_SIZE)));
}

#[test]
fn warp_padding_without_a_reduction_is_skipped() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 20);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);

    let pad = WarpPadInfo { is_tidx_padded: true, is_tidx_single_warp: false, has_warp_reduction: false };
    let map = build(&g, &pad).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDx), Some(&Extent::Const(20)));
    assert!(map.is_exact(ParallelType::TIDx));
}

#[test]
fn warp_specialization_reserves_one_thread_layer() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 3);
    let t1 = g.unary(t0);
    g.parallelize(g.loop_domain(t1)[0], ParallelType::TIDy);
    g.set_circular_buffer(t1, CircularBufferType::WarpSpecialized { on: ParallelType::TIDy, num_registers: None });

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert!(!map.is_exact(ParallelType::TIDy));
    assert_eq!(map.warp_specialization_padded_val(ParallelType::TIDy).unwrap(), 1);
    // The raw extent carries the pad; the compute view recovers the base.
    assert_eq!(map.get_raw_compute(ParallelType::TIDy).unwrap(), Some(Extent::Const(3)));
    assert_eq!(map.get_raw_load(ParallelType::TIDy).unwrap(), Some(Extent::Const(1)));
}

#[test]
fn warp_specialization_on_an_unused_dimension_claims_two_layers() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 128);
    let t1 = g.unary(t0);
    g.parallelize(g.loop_domain(t1)[0], ParallelType::TIDx);
    g.set_circular_buffer(t1, CircularBufferType::WarpSpecialized { on: ParallelType::TIDy, num_registers: None });

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert_eq!(map.get_raw(ParallelType::TIDy), Some(&Extent::Const(2)));
    assert_eq!(map.get_raw_compute(ParallelType::TIDy).unwrap(), Some(Extent::Const(1)));
}

#[test]
fn register_sharing_pads_to_the_thread_group() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 128);
    let t1 = g.unary(t0);
    g.parallelize(g.loop_domain(t1)[0], ParallelType::TIDx);
    g.set_circular_buffer(
        t1,
        CircularBufferType::WarpSpecialized { on: ParallelType::TIDy, num_registers: Some((40, 232)) },
    );

    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert_eq!(map.warp_specialization_padded_val(ParallelType::TIDy).unwrap(), 1);
    assert_eq!(map.get_raw_compute(ParallelType::TIDy).unwrap(), Some(Extent::Const(1)));
    assert_eq!(map.get_num_compute_threads_each_block().unwrap(), Extent::Const(128));
    assert!(!map.is_exact(ParallelType::TIDy));
}

#[test]
fn register_sharing_with_misaligned_threads_is_fatal() {
    let mut g = Graph::new();
    let t0 = input_2d(&mut g, 64, 3);
    let t1 = g.unary(t0);
    g.parallelize(g.loop_domain(t1)[0], ParallelType::TIDx);
    g.parallelize(g.loop_domain(t1)[1], ParallelType::TIDy);
    g.set_circular_buffer(
        t1,
        CircularBufferType::WarpSpecialized { on: ParallelType::TIDy, num_registers: Some((40, 232)) },
    );

    let err = build(&g, &WarpPadInfo::default()).unwrap_err();
    assert!(matches!(err, Error::RegisterSharingMisaligned { threads: 320, .. }));
}

#[test]
fn register_sharing_rejects_dynamic_extents() {
    let mut g = Graph::new();
    let a = g.new_axis(Extent::sym("n"), IterKind::Iteration);
    let t0 = g.input_tensor(vec![a]);
    let t1 = g.unary(t0);
    g.parallelize(g.loop_domain(t1)[0], ParallelType::TIDx);
    g.set_circular_buffer(
        t1,
        CircularBufferType::WarpSpecialized { on: ParallelType::TIDy, num_registers: Some((40, 232)) },
    );

    let err = build(&g, &WarpPadInfo::default()).unwrap_err();
    assert!(matches!(err, Error::RegisterSharingDynamicDim { dim: ParallelType::TIDx, .. }));
}

#[test]
fn padded_val_is_only_defined_for_specialized_dimensions() {
    let (g, _) = copy_chain(1);
    let map = build(&g, &WarpPadInfo::default()).unwrap();
    assert!(matches!(
        map.warp_specialization_padded_val(ParallelType::TIDx),
        Err(Error::NotWarpSpecialized { .. })
    ));
}

#[test]
fn display_lists_every_hardware_dimension() {
    let mut g = Graph::new();
    let t0 = input_1d(&mut g, 5);
    g.parallelize(g.loop_domain(t0)[0], ParallelType::TIDx);
    let map = build(&g, &WarpPadInfo::default()).unwrap();
    let rendered = map.to_string();
    assert!(rendered.contains("threadIdx.x: 5, exact"));
    assert!(rendered.contains("blockIdx.y: unused"));
}
