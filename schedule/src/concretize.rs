//! Broadcast concretization analysis.
//!
//! Tracks, for every broadcast axis, the set of concrete axes it eventually
//! becomes. A broadcast axis is *concretized* when a downstream op maps it to
//! an axis that is neither broadcast nor reduction; until then its origin set
//! propagates forward through producer/consumer edges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use kiln_ir::{AxisEquivalence, AxisId, Graph, MappingMode, OpId, OpKind, PairwiseDomainMap, TensorId};

use crate::error::*;

/// One-shot analysis over a finished graph.
pub struct ConcretizedBroadcastAxes {
    /// Broadcast axis -> the origin broadcast axes that caused it to exist.
    origin_map: BTreeMap<AxisId, BTreeSet<AxisId>>,
    /// Origin broadcast axis (and its derived axes) -> concretizing axes,
    /// deduplicated under exact equivalence.
    concrete_map: BTreeMap<AxisId, BTreeSet<AxisId>>,
}

impl ConcretizedBroadcastAxes {
    pub fn build(graph: &Graph, exact: &AxisEquivalence) -> Result<Self> {
        let mut analysis = Self { origin_map: BTreeMap::new(), concrete_map: BTreeMap::new() };

        for &input in graph.inputs() {
            for &id in graph.logical_domain(input) {
                if graph.axis(id).is_broadcast() {
                    analysis.origin_map.entry(id).or_insert_with(|| BTreeSet::from([id]));
                }
            }
        }

        for op_id in graph.ops_topo() {
            let op = graph.op(op_id);

            for &output in &op.outputs {
                analysis.seed_output_origins(graph, op_id, output);
            }

            for &producer in &op.inputs {
                let producer_broadcasts: BTreeSet<AxisId> = graph
                    .logical_domain(producer)
                    .iter()
                    .copied()
                    .filter(|&id| graph.axis(id).is_broadcast())
                    .collect();
                if producer_broadcasts.is_empty() {
                    continue;
                }

                for &consumer in &op.outputs {
                    let p2c = PairwiseDomainMap::for_op(graph, op_id, producer, consumer)
                        .map_producer_to_consumer(Some(&producer_broadcasts));
                    for (p_id, c_id) in p2c {
                        analysis.propagate_pair(graph, exact, producer, p_id, c_id)?;
                    }
                }
            }
        }

        debug!(
            origins = analysis.origin_map.len(),
            concretized = analysis.concrete_map.len(),
            "broadcast concretization analysis built"
        );
        Ok(analysis)
    }

    /// Register fresh broadcast origins introduced by the op itself: the
    /// flagged positions of a broadcast op, and logical broadcast axes of a
    /// resize output that are absent from its root domain (truncation to
    /// size one).
    fn seed_output_origins(&mut self, graph: &Graph, op_id: OpId, output: TensorId) {
        if let OpKind::Broadcast { flags } = &graph.op(op_id).kind {
            for (&id, &is_new) in graph.logical_domain(output).iter().zip(flags) {
                if is_new {
                    self.origin_map.entry(id).or_insert_with(|| BTreeSet::from([id]));
                }
            }
        }
        if graph.has_root(output) {
            let root = graph.root_domain(output);
            for &id in graph.logical_domain(output) {
                if graph.axis(id).is_broadcast() && !root.contains(&id) {
                    self.origin_map.entry(id).or_insert_with(|| BTreeSet::from([id]));
                }
            }
        }
    }

    fn propagate_pair(
        &mut self,
        graph: &Graph,
        exact: &AxisEquivalence,
        producer: TensorId,
        p_id: AxisId,
        c_id: AxisId,
    ) -> Result<()> {
        let c_axis = graph.axis(c_id);
        // A trivial-reduction consumer does not concretize.
        let is_concretized = !c_axis.is_broadcast() && !c_axis.is_reduction();

        let producer_origins = self
            .origin_map
            .get(&p_id)
            .cloned()
            .ok_or(Error::MissingBroadcastOrigin { axis: p_id, producer })?;

        if is_concretized {
            for origin in producer_origins {
                self.mark_as_concretized(graph, exact, origin, c_id);
            }
        } else {
            let consumer_origins = self.origin_map.entry(c_id).or_default();
            consumer_origins.extend(producer_origins);
            consumer_origins.insert(c_id);
        }
        Ok(())
    }

    /// Forward BFS from the origin through all of its axis uses, inserting
    /// the concretizing axis at every visited node. Stops expanding once the
    /// insertion is a no-op, which bounds the walk because each node can only
    /// gain finitely many exactly-distinct entries.
    fn mark_as_concretized(&mut self, graph: &Graph, exact: &AxisEquivalence, origin: AxisId, concrete: AxisId) {
        let mut frontier = VecDeque::from([origin]);
        while let Some(child) = frontier.pop_front() {
            let set = self.concrete_map.entry(child).or_default();
            if !insert_unless_exact_duplicate(exact, concrete, set) {
                continue;
            }
            for &use_op in graph.axis_uses(child) {
                frontier.extend(graph.axis_op(use_op).outputs.iter().copied());
            }
        }
    }

    /// All axes that concretize `id`, empty when it never acquires real
    /// shape.
    pub fn all_concretized(&self, id: AxisId) -> BTreeSet<AxisId> {
        self.concrete_map.get(&id).cloned().unwrap_or_default()
    }

    pub fn is_concretized(&self, id: AxisId) -> bool {
        self.concrete_map.get(&id).is_some_and(|s| !s.is_empty())
    }

    pub fn is_uniquely_concretized(&self, id: AxisId) -> bool {
        self.concrete_map.get(&id).is_some_and(|s| s.len() == 1)
    }

    pub fn maybe_non_uniquely_concretized(&self, id: AxisId) -> bool {
        self.concrete_map.get(&id).is_some_and(|s| s.len() > 1)
    }
}

/// Insert `new` unless the set already holds an exactly-equivalent axis.
/// Returns whether anything changed.
fn insert_unless_exact_duplicate(exact: &AxisEquivalence, new: AxisId, set: &mut BTreeSet<AxisId>) -> bool {
    if set.iter().any(|&existing| exact.are_mapped(new, existing, MappingMode::Exact)) {
        return false;
    }
    set.insert(new);
    true
}
