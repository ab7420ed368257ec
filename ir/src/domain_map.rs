//! Axis correspondence between tensor nodes.
//!
//! Two collaborators live here:
//!
//! - [`PairwiseDomainMap`]: best-effort positional correspondence between a
//!   producer's logical domain and a consumer's root domain, independent of
//!   any op-specific mapping table. Broadcast/squeeze flags shift the
//!   alignment and producer reduction axes never map (they have no image in
//!   the consumer).
//! - [`AxisEquivalence`]: the exact/permissive equivalence oracle, a pair of
//!   union-find structures seeded from pairwise correspondences and closed
//!   under identically-parameterized axis ops, so loop axes produced by
//!   replaying the same split/merge sequence on different tensors end up in
//!   the same class.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::*;
use crate::graph::{AxisOpKind, Graph, OpKind};
use crate::types::{AxisId, MappingMode, OpId, TensorId};

/// Pairwise producer/consumer axis mapping for one edge of one tensor op.
pub struct PairwiseDomainMap<'g> {
    graph: &'g Graph,
    producer: TensorId,
    consumer: TensorId,
    op: OpId,
}

impl<'g> PairwiseDomainMap<'g> {
    pub fn new(graph: &'g Graph, producer: TensorId, consumer: TensorId) -> Result<Self> {
        let op = graph
            .definition(consumer)
            .filter(|&op| graph.op(op).inputs.contains(&producer))
            .ok_or(Error::NotProducerConsumer { producer, consumer })?;
        Ok(Self { graph, producer, consumer, op })
    }

    /// Mapping along a known edge of `op`. Infallible; callers iterating an
    /// op's own input/output lists use this form.
    pub fn for_op(graph: &'g Graph, op: OpId, producer: TensorId, consumer: TensorId) -> Self {
        debug_assert!(graph.op(op).inputs.contains(&producer) && graph.op(op).outputs.contains(&consumer));
        Self { graph, producer, consumer, op }
    }

    /// Aligned `(producer logical axis, consumer root axis)` pairs.
    fn aligned_pairs(&self) -> Vec<(AxisId, AxisId)> {
        let op = self.graph.op(self.op);
        let p_logical = self.graph.logical_domain(self.producer);
        let c_root = self.graph.root_domain(self.consumer);

        let p_axes: Vec<AxisId> = p_logical
            .iter()
            .enumerate()
            .filter(|(i, _)| match &op.kind {
                OpKind::Squeeze { flags } => !flags.get(*i).copied().unwrap_or(false),
                _ => true,
            })
            .map(|(_, &a)| a)
            // Reduction axes are folded away; they have no consumer image.
            .filter(|&a| !self.graph.axis(a).is_reduction())
            .collect();

        let c_axes: Vec<AxisId> = c_root
            .iter()
            .enumerate()
            .filter(|(i, _)| match &op.kind {
                OpKind::Broadcast { flags } => !flags.get(*i).copied().unwrap_or(false),
                _ => true,
            })
            .map(|(_, &a)| a)
            .collect();

        // Best effort: rank drift (e.g. the rank-reduced attention stats
        // output) aligns the common prefix.
        p_axes.into_iter().zip(c_axes).collect()
    }

    /// Map producer logical axes to consumer root axes. `filter` restricts
    /// the producer side.
    pub fn map_producer_to_consumer(&self, filter: Option<&BTreeSet<AxisId>>) -> BTreeMap<AxisId, AxisId> {
        self.aligned_pairs()
            .into_iter()
            .filter(|(p, _)| filter.is_none_or(|f| f.contains(p)))
            .collect()
    }

    /// Map consumer root axes back to producer logical axes. `filter`
    /// restricts the consumer side.
    pub fn map_consumer_to_producer(&self, filter: Option<&BTreeSet<AxisId>>) -> BTreeMap<AxisId, AxisId> {
        self.aligned_pairs()
            .into_iter()
            .filter(|(_, c)| filter.is_none_or(|f| f.contains(c)))
            .map(|(p, c)| (c, p))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self { parent: (0..size as u32).collect() }
    }

    fn find(&self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            x = self.parent[x as usize];
        }
        x
    }

    /// Join two classes; the smaller index stays the representative. Returns
    /// whether anything changed.
    fn join(&mut self, a: u32, b: u32) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        let (keep, absorb) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[absorb as usize] = keep;
        true
    }

    fn mapped(&self, a: u32, b: u32) -> bool {
        self.find(a) == self.find(b)
    }
}

/// Exact/permissive axis equivalence over a finished graph.
pub struct AxisEquivalence {
    exact: UnionFind,
    permissive: UnionFind,
}

impl AxisEquivalence {
    /// Build both strictness levels in one pass over the graph.
    pub fn build(graph: &Graph) -> Self {
        let mut exact = UnionFind::new(graph.num_axes());
        let mut permissive = UnionFind::new(graph.num_axes());

        for op_id in graph.ops_topo() {
            let op = graph.op(op_id);
            for &producer in &op.inputs {
                for &consumer in &op.outputs {
                    let pairwise = PairwiseDomainMap::for_op(graph, op_id, producer, consumer);
                    for (p, c) in pairwise.aligned_pairs() {
                        permissive.join(p.0, c.0);
                        // Exact refuses to identify a broadcast axis with the
                        // concrete axis it becomes.
                        if graph.axis(p).is_broadcast() == graph.axis(c).is_broadcast() {
                            exact.join(p.0, c.0);
                        }
                    }
                }
            }
        }

        Self::close_over_axis_ops(graph, &mut exact);
        Self::close_over_axis_ops(graph, &mut permissive);

        Self { exact, permissive }
    }

    /// Fixpoint closure: two axis ops of the same kind whose inputs are
    /// pairwise mapped (and whose parameters provably agree) map their
    /// outputs pairwise. This is how identically replayed loop transforms on
    /// different tensors come to correspond.
    fn close_over_axis_ops(graph: &Graph, uf: &mut UnionFind) {
        let op_ids: Vec<_> = graph.all_axis_op_ids().collect();
        loop {
            let mut changed = false;
            for (i, &a_id) in op_ids.iter().enumerate() {
                for &b_id in &op_ids[i + 1..] {
                    let (a, b) = (graph.axis_op(a_id), graph.axis_op(b_id));
                    if a.kind != b.kind || a.inputs.len() != b.inputs.len() || a.outputs.len() != b.outputs.len() {
                        continue;
                    }
                    let inputs_mapped =
                        a.inputs.iter().zip(&b.inputs).all(|(x, y)| uf.mapped(x.0, y.0));
                    if !inputs_mapped {
                        continue;
                    }
                    let params_agree = match a.kind {
                        // Split factor and resize target are free parameters;
                        // require a proof that they agree.
                        AxisOpKind::Split => graph.axis(a.outputs[1]).extent.prove_eq(&graph.axis(b.outputs[1]).extent)
                            == Some(true),
                        AxisOpKind::Resize => graph.axis(a.outputs[0]).extent.prove_eq(&graph.axis(b.outputs[0]).extent)
                            == Some(true),
                        AxisOpKind::Merge | AxisOpKind::Swizzle => true,
                    };
                    if !params_agree {
                        continue;
                    }
                    for (x, y) in a.outputs.iter().zip(&b.outputs) {
                        changed |= uf.join(x.0, y.0);
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// The axis-equivalence oracle: are two axes provably the same dimension
    /// under the chosen strictness?
    pub fn are_mapped(&self, a: AxisId, b: AxisId, mode: MappingMode) -> bool {
        match mode {
            MappingMode::Exact => self.exact.mapped(a.0, b.0),
            MappingMode::Permissive => self.permissive.mapped(a.0, b.0),
        }
    }

    /// Canonical representative of the exact class (smallest axis handle).
    pub fn exact_representative(&self, a: AxisId) -> AxisId {
        AxisId(self.exact.find(a.0))
    }
}
