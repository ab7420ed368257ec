//! Inlining position calculation.
//!
//! Decides how deep a tensor may share a loop nest with its producers and
//! consumers. [`MaxPosCalculator`] answers per-tensor position queries;
//! [`inline_most`] and [`inline_all_at`] apply them to the whole graph (or a
//! selection), writing `compute_at` positions back after validation.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use once_cell::unsync::OnceCell;
use snafu::ensure;
use tracing::debug;

use kiln_ir::{AxisEquivalence, AxisId, Graph, MappingMode, PairwiseDomainMap, ParallelType, TensorId};

use crate::domain_info::{DomainInfo, LogicalDomainModel, resolve_loop_pos};
use crate::error::*;
use crate::propagate::{MaxInfoSpanningTree, Propagator};

/// Per-graph calculator of maximum inlining positions.
pub struct MaxPosCalculator<'g> {
    graph: &'g Graph,
    /// Logical axes that fail to map to at least one consumer of their
    /// tensor; loops derived from them cannot be shared.
    unmappable_axes: BTreeSet<AxisId>,
    /// User-forbidden axes.
    uninlinable_axes: BTreeSet<AxisId>,
    /// Lazily built equivalence graph for cross-tensor position queries.
    equivalence: OnceCell<AxisEquivalence>,
}

impl<'g> MaxPosCalculator<'g> {
    /// `compute_at_only` restricts the unmappable scan to axes that matter
    /// for compute-at placement, i.e. broadcast axes are ignored.
    pub fn new(graph: &'g Graph, uninlinable_axes: BTreeSet<AxisId>, compute_at_only: bool) -> Self {
        let unmappable_axes = build_unmappable_dims(graph, compute_at_only);
        Self { graph, unmappable_axes, uninlinable_axes, equivalence: OnceCell::new() }
    }

    fn equivalence(&self) -> &AxisEquivalence {
        self.equivalence.get_or_init(|| AxisEquivalence::build(self.graph))
    }

    /// Can a loop nest be shared through `id` of `tv`? Flag combinations
    /// differ per query: self positions forbid reductions and unmappable
    /// axes, cross-tensor checks allow reductions and unmappable axes.
    pub fn is_allowed_id(
        &self,
        id: AxisId,
        tv: TensorId,
        best_effort: bool,
        allow_reduction: bool,
        allow_vectorize: bool,
        allow_unmappable: bool,
    ) -> bool {
        let axis = self.graph.axis(id);
        if !allow_reduction && axis.is_reduction() {
            return false;
        }
        if self.uninlinable_axes.contains(&id) {
            return false;
        }
        if !allow_vectorize && axis.parallel == ParallelType::Vectorize {
            return false;
        }
        if !allow_unmappable {
            // A loop axis is unmappable when any logical axis it derives from
            // is; best effort tolerates broadcast sources, which carry no
            // shape of their own.
            let hits_unmappable = self.logical_sources(tv, id).any(|src| {
                self.unmappable_axes.contains(&src) && !(best_effort && self.graph.axis(src).is_broadcast())
            });
            if hits_unmappable {
                return false;
            }
        }
        true
    }

    /// Logical axes of `tv` that `id` equals or derives from.
    fn logical_sources(&self, tv: TensorId, id: AxisId) -> impl Iterator<Item = AxisId> + '_ {
        let graph = self.graph;
        graph
            .logical_domain(tv)
            .iter()
            .copied()
            .filter(move |&src| src == id || !graph.axis_ops_between(src, id).is_empty())
            .collect_vec()
            .into_iter()
    }

    /// Deepest position in `tv`'s own loop domain made of allowed axes only,
    /// scanning outermost-in and stopping at the first disallowed one.
    pub fn get_max_pos_self(
        &self,
        tv: TensorId,
        best_effort: bool,
        allow_reduction: bool,
        allow_vectorize: bool,
        allow_unmappable: bool,
    ) -> usize {
        self.graph
            .loop_domain(tv)
            .iter()
            .take_while(|&&id| {
                self.is_allowed_id(id, tv, best_effort, allow_reduction, allow_vectorize, allow_unmappable)
            })
            .count()
    }

    /// Deepest position at which `producer` may be inlined into `consumer`.
    pub fn get_max_producer_pos_from_consumer(
        &self,
        producer: TensorId,
        consumer: TensorId,
        best_effort: bool,
    ) -> usize {
        let equivalence = self.equivalence();
        let consumer_loop = self.graph.loop_domain(consumer);
        for (pos, &p_id) in self.graph.loop_domain(producer).iter().enumerate() {
            let mapped = consumer_loop
                .iter()
                .copied()
                .find(|&c_id| equivalence.are_mapped(p_id, c_id, MappingMode::Permissive));
            match mapped {
                Some(c_id) => {
                    if !self.is_allowed_id(c_id, consumer, best_effort, true, false, true) {
                        return pos;
                    }
                }
                None => {
                    if !(best_effort && self.graph.axis(p_id).is_broadcast()) {
                        return pos;
                    }
                }
            }
        }
        self.graph.ndims(producer)
    }

    /// Deepest position of `tv` every dependent tensor can also honor: the
    /// minimum over its own limit, each consumer's limit, and (optionally)
    /// its siblings' limits.
    pub fn get_max_pos_all(&self, tv: TensorId, best_effort: bool, check_siblings: bool) -> usize {
        let mut max_pos = self.get_max_pos_self(tv, best_effort, false, false, false);
        for consumer in self.graph.consumers_of(tv) {
            max_pos = max_pos.min(self.get_max_producer_pos_from_consumer(tv, consumer, best_effort));
        }
        if check_siblings {
            for sibling in self.graph.siblings_of(tv) {
                max_pos = max_pos.min(self.get_max_pos_all(sibling, best_effort, false));
            }
        }
        max_pos
    }

    /// Translate a producer inline position into the equivalent consumer
    /// position: scan the consumer loop from the innermost axis outward until
    /// one maps into the producer's inlined prefix.
    pub fn get_consumer_pos_aligned_to_producer_ca(
        &self,
        consumer: TensorId,
        producer: TensorId,
        producer_pos: usize,
    ) -> usize {
        aligned_position(self.graph, self.equivalence(), consumer, producer, producer_pos)
    }
}

fn aligned_position(
    graph: &Graph,
    equivalence: &AxisEquivalence,
    to: TensorId,
    from: TensorId,
    from_pos: usize,
) -> usize {
    let from_prefix = &graph.loop_domain(from)[..from_pos];
    let to_loop = graph.loop_domain(to);
    let mut to_pos = to_loop.len();
    while to_pos > 0 {
        let to_id = to_loop[to_pos - 1];
        if from_prefix
            .iter()
            .any(|&from_id| equivalence.are_mapped(to_id, from_id, MappingMode::Permissive))
        {
            break;
        }
        to_pos -= 1;
    }
    to_pos
}

/// Logical axes of each tensor that fail to map to at least one of its
/// consumers. Producer reduction axes are exempt; they never map and are
/// handled by the reduction rules instead.
fn build_unmappable_dims(graph: &Graph, compute_at_only: bool) -> BTreeSet<AxisId> {
    let mut unmappable = BTreeSet::new();
    for tv in graph.all_tensor_ids() {
        for consumer in graph.consumers_of(tv) {
            let Ok(pairwise) = PairwiseDomainMap::new(graph, tv, consumer) else {
                continue;
            };
            let mapped = pairwise.map_producer_to_consumer(None);
            for &id in graph.logical_domain(tv) {
                let axis = graph.axis(id);
                if axis.is_reduction() || (compute_at_only && axis.is_broadcast()) {
                    continue;
                }
                if !mapped.contains_key(&id) {
                    unmappable.insert(id);
                }
            }
        }
    }
    unmappable
}

/// Position-forwarding propagator: walks the spanning tree carrying the
/// loop position that corresponds to the reference position at each tensor.
struct FindMappedPositions<'g> {
    graph: &'g Graph,
    equivalence: &'g AxisEquivalence,
    positions: BTreeMap<TensorId, usize>,
}

impl FindMappedPositions<'_> {
    fn transfer(&mut self, from: TensorId, to: TensorId) {
        let Some(&from_pos) = self.positions.get(&from) else {
            debug_assert!(false, "position propagated out of traversal order");
            return;
        };
        let to_pos = aligned_position(self.graph, self.equivalence, to, from, from_pos);
        self.positions.insert(to, to_pos);
    }
}

impl Propagator for FindMappedPositions<'_> {
    fn propagate_sibling(&mut self, from: TensorId, to: TensorId) {
        // Uniform siblings share loop structure; positions carry over as-is.
        if let Some(&pos) = self.positions.get(&from) {
            self.positions.insert(to, pos);
        }
    }

    fn propagate_p2c(&mut self, from: TensorId, to: TensorId) {
        self.transfer(from, to);
    }

    fn propagate_c2p(&mut self, from: TensorId, to: TensorId) {
        self.transfer(from, to);
    }
}

/// Loop positions over the reachable graph that correspond to
/// `reference_pos` of `reference`.
fn positions_mapped_to(graph: &Graph, reference: TensorId, reference_pos: i64) -> Result<BTreeMap<TensorId, usize>> {
    let resolved = resolve_loop_pos(graph, reference, reference_pos)?;
    let info = DomainInfo::from_reference_at(graph, reference, reference_pos, false)?;
    let equivalence = AxisEquivalence::build(graph);
    let tree = MaxInfoSpanningTree::new(graph, LogicalDomainModel::new(false), reference, info, None);
    let mut finder =
        FindMappedPositions { graph, equivalence: &equivalence, positions: BTreeMap::from([(reference, resolved)]) };
    tree.traverse(&mut finder);
    Ok(finder.positions)
}

/// Clamp requested positions against the calculator and write them back as
/// `compute_at`. Positions never decrease an existing setting.
fn apply_inline_positions(
    graph: &mut Graph,
    positions: BTreeMap<TensorId, usize>,
    best_effort: bool,
    uninlinable_axes: BTreeSet<AxisId>,
) -> Result<()> {
    let mut resolved = Vec::with_capacity(positions.len());
    let calc = MaxPosCalculator::new(graph, uninlinable_axes, false);
    for (tv, pos) in positions {
        if calc.graph.is_input(tv) {
            continue;
        }
        let max_pos = calc.get_max_pos_all(tv, best_effort, true);
        let pos = if best_effort {
            pos.min(max_pos)
        } else {
            ensure!(pos <= max_pos, InlinePositionTooDeepSnafu { tensor: tv, pos, max_pos });
            pos
        };
        resolved.push((tv, pos));
    }
    drop(calc);

    for (tv, pos) in resolved {
        if pos > graph.compute_at(tv) {
            // Validated against ndims via get_max_pos_all already.
            let set = graph.set_compute_at(tv, pos as i64);
            debug_assert!(set.is_ok());
        }
    }
    Ok(())
}

/// Inline every tensor at its rightmost allowed position.
pub fn inline_most(graph: &mut Graph, uninlinable_axes: BTreeSet<AxisId>) -> Result<()> {
    let tvs = graph.all_tensor_ids().collect_vec();
    inline_most_selected(graph, &tvs, uninlinable_axes)
}

/// Inline the selected tensors at their rightmost allowed positions.
pub fn inline_most_selected(graph: &mut Graph, tvs: &[TensorId], uninlinable_axes: BTreeSet<AxisId>) -> Result<()> {
    if tvs.is_empty() {
        return Ok(());
    }
    let positions: BTreeMap<TensorId, usize> = tvs.iter().map(|&tv| (tv, graph.ndims(tv))).collect();
    debug!(tensors = positions.len(), "inlining at rightmost positions");
    apply_inline_positions(graph, positions, true, uninlinable_axes)
}

/// Inline every reachable tensor at the position corresponding to
/// `reference_pos` of `reference`.
pub fn inline_all_at(
    graph: &mut Graph,
    reference: TensorId,
    reference_pos: i64,
    best_effort: bool,
    uninlinable_axes: BTreeSet<AxisId>,
) -> Result<()> {
    let positions = positions_mapped_to(graph, reference, reference_pos)?;
    debug!(reference = %reference, reference_pos, tensors = positions.len(), "inlining at mapped positions");
    apply_inline_positions(graph, positions, best_effort, uninlinable_axes)
}

/// Like [`inline_all_at`], but only the selected tensors are written back.
pub fn inline_selected_at(
    graph: &mut Graph,
    selected: &BTreeSet<TensorId>,
    reference: TensorId,
    reference_pos: i64,
    best_effort: bool,
    uninlinable_axes: BTreeSet<AxisId>,
) -> Result<()> {
    let mut positions = positions_mapped_to(graph, reference, reference_pos)?;
    positions.retain(|tv, _| selected.contains(tv));
    apply_inline_positions(graph, positions, best_effort, uninlinable_axes)
}
