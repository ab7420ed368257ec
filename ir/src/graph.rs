//! Arena-based tensor/axis graph.
//!
//! Axes, axis-defining operations, tensor nodes and tensor operations live in
//! flat vectors addressed by stable integer handles; "uses" back-edges are
//! index adjacency lists maintained on insertion. This keeps the structure
//! acyclic in ownership while preserving O(1) traversal in both directions.
//!
//! A tensor node holds three ordered domain views over the same axis set:
//!
//! - root: the raw pre-transform axes (fresh for every tensor),
//! - logical: root after logical-shape transforms (pad/narrow resizes); absent
//!   when identical to root,
//! - loop: logical after scheduling transforms (split/merge/swizzle); starts
//!   out aliasing the logical axes.
//!
//! Construction is append-only and producer-before-consumer, so op insertion
//! order doubles as a topological order.

use itertools::Itertools;
use smallvec::{SmallVec, smallvec};
use snafu::ensure;

use crate::error::*;
use crate::extent::Extent;
use crate::types::{AxisId, AxisOpId, CircularBufferType, IterKind, OpId, ParallelType, TensorId};

/// An axis record. Immutable once created apart from its hardware binding.
#[derive(Debug, Clone)]
pub struct Axis {
    pub extent: Extent,
    pub kind: IterKind,
    pub parallel: ParallelType,
    pub definition: Option<AxisOpId>,
}

impl Axis {
    pub fn is_broadcast(&self) -> bool {
        self.kind == IterKind::Broadcast
    }

    pub fn is_reduction(&self) -> bool {
        self.kind == IterKind::Reduction
    }
}

/// Kind of an axis-defining operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOpKind {
    Split,
    Merge,
    Swizzle,
    Resize,
}

/// An operation in the axis DAG.
#[derive(Debug, Clone)]
pub struct AxisOp {
    pub kind: AxisOpKind,
    pub inputs: SmallVec<[AxisId; 2]>,
    pub outputs: SmallVec<[AxisId; 2]>,
}

/// Kind of a tensor operation. Only what the domain analyses need to map
/// axes pairwise; arithmetic payloads live outside this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Same-rank map over the inputs; may have several uniform outputs.
    Elementwise,
    /// `flags[i]` marks output root position `i` as a fresh broadcast axis.
    Broadcast { flags: Vec<bool> },
    /// `flags[i]` marks producer logical position `i` as dropped.
    Squeeze { flags: Vec<bool> },
    /// Output keeps all positions; the listed ones become reduction axes.
    Reduce { axes: Vec<usize> },
    /// Pad/narrow; the output carries a root->logical resize chain.
    Resize,
    /// Two outputs of differing rank (out, stats); siblings are not uniform.
    Attention,
}

/// A tensor operation: pure function from input tensors to output tensors.
#[derive(Debug, Clone)]
pub struct TensorOp {
    pub kind: OpKind,
    pub inputs: SmallVec<[TensorId; 2]>,
    pub outputs: SmallVec<[TensorId; 2]>,
}

#[derive(Debug, Clone)]
struct Tensor {
    root: Vec<AxisId>,
    logical: Option<Vec<AxisId>>,
    loop_dom: Vec<AxisId>,
    definition: Option<OpId>,
    compute_at: usize,
    circular_buffer: Option<CircularBufferType>,
}

/// The graph arena. Threaded explicitly through every analysis entry point;
/// there is no ambient "current graph".
#[derive(Debug, Default)]
pub struct Graph {
    axes: Vec<Axis>,
    axis_ops: Vec<AxisOp>,
    axis_uses: Vec<SmallVec<[AxisOpId; 2]>>,
    tensors: Vec<Tensor>,
    ops: Vec<TensorOp>,
    tensor_uses: Vec<SmallVec<[OpId; 2]>>,
    inputs: Vec<TensorId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Axis arena
    // =========================================================================

    /// Create a fresh root axis.
    pub fn new_axis(&mut self, extent: Extent, kind: IterKind) -> AxisId {
        self.push_axis(Axis { extent, kind, parallel: ParallelType::Serial, definition: None })
    }

    fn push_axis(&mut self, axis: Axis) -> AxisId {
        let id = AxisId(self.axes.len() as u32);
        self.axes.push(axis);
        self.axis_uses.push(SmallVec::new());
        id
    }

    fn push_axis_op(&mut self, op: AxisOp) -> AxisOpId {
        let id = AxisOpId(self.axis_ops.len() as u32);
        for &input in &op.inputs {
            self.axis_uses[input.index()].push(id);
        }
        for &output in &op.outputs {
            self.axes[output.index()].definition = Some(id);
        }
        self.axis_ops.push(op);
        id
    }

    pub fn axis(&self, id: AxisId) -> &Axis {
        &self.axes[id.index()]
    }

    pub fn axis_op(&self, id: AxisOpId) -> &AxisOp {
        &self.axis_ops[id.index()]
    }

    pub fn all_axis_op_ids(&self) -> impl Iterator<Item = AxisOpId> + '_ {
        (0..self.axis_ops.len() as u32).map(AxisOpId)
    }

    /// Axis ops consuming `id`.
    pub fn axis_uses(&self, id: AxisId) -> &[AxisOpId] {
        &self.axis_uses[id.index()]
    }

    pub fn num_axes(&self) -> usize {
        self.axes.len()
    }

    pub fn all_axis_ids(&self) -> impl Iterator<Item = AxisId> + '_ {
        (0..self.axes.len() as u32).map(AxisId)
    }

    /// Bind an axis to a hardware dimension (or vectorize/unroll it).
    pub fn parallelize(&mut self, id: AxisId, parallel: ParallelType) {
        self.axes[id.index()].parallel = parallel;
    }

    /// Fresh axis with the same extent and kind, no definition. Used for the
    /// root domain of a newly created tensor, which mirrors its producer's
    /// logical domain without sharing axis identity.
    fn mirror_axis(&mut self, src: AxisId) -> AxisId {
        let axis = self.axis(src);
        let (extent, kind) = (axis.extent.clone(), axis.kind);
        self.new_axis(extent, kind)
    }

    // =========================================================================
    // Tensor construction
    // =========================================================================

    fn push_tensor(&mut self, root: Vec<AxisId>, logical: Option<Vec<AxisId>>, definition: Option<OpId>) -> TensorId {
        let loop_dom = logical.clone().unwrap_or_else(|| root.clone());
        let id = TensorId(self.tensors.len() as u32);
        self.tensors
            .push(Tensor { root, logical, loop_dom, definition, compute_at: 0, circular_buffer: None });
        self.tensor_uses.push(SmallVec::new());
        id
    }

    fn push_op(&mut self, op: TensorOp) -> OpId {
        let id = OpId(self.ops.len() as u32);
        for &input in &op.inputs {
            self.tensor_uses[input.index()].push(id);
        }
        for &output in &op.outputs {
            self.tensors[output.index()].definition = Some(id);
        }
        self.ops.push(op);
        id
    }

    /// Register a graph input tensor over the given (root) axes.
    pub fn input_tensor(&mut self, axes: Vec<AxisId>) -> TensorId {
        let id = self.push_tensor(axes, None, None);
        self.inputs.push(id);
        id
    }

    fn mirror_domain(&mut self, src: &[AxisId]) -> Vec<AxisId> {
        src.iter().map(|&a| self.mirror_axis(a)).collect()
    }

    /// Single-output elementwise op (copy, cast, unary math).
    pub fn unary(&mut self, input: TensorId) -> TensorId {
        let src = self.logical_domain(input).to_vec();
        let root = self.mirror_domain(&src);
        let out = self.push_tensor(root, None, None);
        self.push_op(TensorOp { kind: OpKind::Elementwise, inputs: smallvec![input], outputs: smallvec![out] });
        out
    }

    /// Elementwise op with `n_outputs` uniform sibling outputs.
    pub fn multi_unary(&mut self, input: TensorId, n_outputs: usize) -> Vec<TensorId> {
        let src = self.logical_domain(input).to_vec();
        let outputs: Vec<TensorId> = (0..n_outputs)
            .map(|_| {
                let root = self.mirror_domain(&src);
                self.push_tensor(root, None, None)
            })
            .collect();
        self.push_op(TensorOp {
            kind: OpKind::Elementwise,
            inputs: smallvec![input],
            outputs: outputs.iter().copied().collect(),
        });
        outputs
    }

    /// Two-input elementwise op. A broadcast axis meeting a concrete axis
    /// produces a concrete output axis (this is where concretization happens).
    pub fn binary(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId> {
        let lhs_dom = self.logical_domain(lhs).to_vec();
        let rhs_dom = self.logical_domain(rhs).to_vec();
        ensure!(
            lhs_dom.len() == rhs_dom.len(),
            RankMismatchSnafu { lhs, lhs_rank: lhs_dom.len(), rhs, rhs_rank: rhs_dom.len() }
        );
        let root: Vec<AxisId> = lhs_dom
            .iter()
            .zip(&rhs_dom)
            .map(|(&l, &r)| {
                let (la, ra) = (self.axis(l), self.axis(r));
                let (extent, kind) = if la.is_broadcast() && ra.is_broadcast() {
                    (la.extent.clone(), IterKind::Broadcast)
                } else if la.is_broadcast() {
                    (ra.extent.clone(), IterKind::Iteration)
                } else {
                    (la.extent.clone(), IterKind::Iteration)
                };
                self.new_axis(extent, kind)
            })
            .collect();
        let out = self.push_tensor(root, None, None);
        self.push_op(TensorOp { kind: OpKind::Elementwise, inputs: smallvec![lhs, rhs], outputs: smallvec![out] });
        Ok(out)
    }

    /// Insert broadcast axes. `flags` describes the *output* root domain:
    /// `true` positions get a fresh size-one broadcast axis, `false` positions
    /// take the next input logical axis.
    pub fn broadcast(&mut self, input: TensorId, flags: Vec<bool>) -> Result<TensorId> {
        let src = self.logical_domain(input).to_vec();
        let kept = flags.iter().filter(|f| !**f).count();
        ensure!(
            kept == src.len(),
            FlagCountMismatchSnafu { tensor: input, flags: flags.len(), rank: src.len() }
        );
        let mut next_src = 0;
        let root: Vec<AxisId> = flags
            .iter()
            .map(|&is_new| {
                if is_new {
                    self.new_axis(Extent::one(), IterKind::Broadcast)
                } else {
                    let id = src[next_src];
                    next_src += 1;
                    self.mirror_axis(id)
                }
            })
            .collect();
        let out = self.push_tensor(root, None, None);
        self.push_op(TensorOp { kind: OpKind::Broadcast { flags }, inputs: smallvec![input], outputs: smallvec![out] });
        Ok(out)
    }

    /// Drop broadcast axes. `flags` describes the *input* logical domain:
    /// `true` positions are removed from the output.
    pub fn squeeze(&mut self, input: TensorId, flags: Vec<bool>) -> Result<TensorId> {
        let src = self.logical_domain(input).to_vec();
        ensure!(
            flags.len() == src.len(),
            FlagCountMismatchSnafu { tensor: input, flags: flags.len(), rank: src.len() }
        );
        let root: Vec<AxisId> = src
            .iter()
            .zip(&flags)
            .filter(|(_, dropped)| !**dropped)
            .map(|(&a, _)| self.mirror_axis(a))
            .collect();
        let out = self.push_tensor(root, None, None);
        self.push_op(TensorOp { kind: OpKind::Squeeze { flags }, inputs: smallvec![input], outputs: smallvec![out] });
        Ok(out)
    }

    /// Reduction over the listed logical positions. The output keeps every
    /// position; reduced ones become reduction axes.
    pub fn reduce(&mut self, input: TensorId, axes: &[usize]) -> Result<TensorId> {
        let src = self.logical_domain(input).to_vec();
        for &axis in axes {
            ensure!(axis < src.len(), ReduceAxisInvalidSnafu { tensor: input, axis, rank: src.len() });
        }
        let root: Vec<AxisId> = src
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                let mirrored = self.mirror_axis(a);
                if axes.contains(&i) {
                    self.axes[mirrored.index()].kind = IterKind::Reduction;
                }
                mirrored
            })
            .collect();
        let out = self.push_tensor(root, None, None);
        self.push_op(TensorOp {
            kind: OpKind::Reduce { axes: axes.to_vec() },
            inputs: smallvec![input],
            outputs: smallvec![out],
        });
        Ok(out)
    }

    /// Attention-style op with non-uniform siblings: the primary output
    /// mirrors the input, the stats output drops the innermost axis.
    pub fn attention(&mut self, input: TensorId) -> Result<(TensorId, TensorId)> {
        let src = self.logical_domain(input).to_vec();
        ensure!(
            !src.is_empty(),
            FlagCountMismatchSnafu { tensor: input, flags: 0usize, rank: 0usize }
        );
        let out_root = self.mirror_domain(&src);
        let stats_root = self.mirror_domain(&src[..src.len() - 1]);
        let out = self.push_tensor(out_root, None, None);
        let stats = self.push_tensor(stats_root, None, None);
        self.push_op(TensorOp { kind: OpKind::Attention, inputs: smallvec![input], outputs: smallvec![out, stats] });
        Ok((out, stats))
    }

    /// Truncate axis `dim` to `new_extent`. The output's root mirrors the
    /// input and its logical domain carries the resized axis; truncating to a
    /// constant one introduces a fresh logical broadcast axis.
    pub fn narrow(&mut self, input: TensorId, dim: usize, new_extent: Extent) -> Result<TensorId> {
        self.resize_impl(input, dim, new_extent)
    }

    /// Pad axis `dim` by `left`/`right` elements.
    pub fn pad(&mut self, input: TensorId, dim: usize, left: i64, right: i64) -> Result<TensorId> {
        let src = self.logical_domain(input).to_vec();
        ensure!(dim < src.len(), ReduceAxisInvalidSnafu { tensor: input, axis: dim, rank: src.len() });
        let new_extent = self.axis(src[dim]).extent.clone().add(Extent::Const(left + right)).simplify();
        self.resize_impl(input, dim, new_extent)
    }

    fn resize_impl(&mut self, input: TensorId, dim: usize, new_extent: Extent) -> Result<TensorId> {
        let src = self.logical_domain(input).to_vec();
        ensure!(dim < src.len(), ReduceAxisInvalidSnafu { tensor: input, axis: dim, rank: src.len() });
        let root = self.mirror_domain(&src);
        let kind = if new_extent.as_const() == Some(1) { IterKind::Broadcast } else { IterKind::Iteration };
        let resized = self.new_axis(new_extent, kind);
        self.push_axis_op(AxisOp { kind: AxisOpKind::Resize, inputs: smallvec![root[dim]], outputs: smallvec![resized] });
        let mut logical = root.clone();
        logical[dim] = resized;
        let out = self.push_tensor(root, Some(logical), None);
        self.push_op(TensorOp { kind: OpKind::Resize, inputs: smallvec![input], outputs: smallvec![out] });
        Ok(out)
    }

    // =========================================================================
    // Scheduling transforms (loop domain)
    // =========================================================================

    /// Split loop axis `pos` into `(outer, inner)` with inner extent `factor`.
    pub fn split(&mut self, tv: TensorId, pos: usize, factor: i64) -> Result<()> {
        let ndims = self.ndims(tv);
        ensure!(pos < ndims, PositionOutOfRangeSnafu { tensor: tv, pos: pos as i64, ndims });
        let axis = self.tensors[tv.index()].loop_dom[pos];
        let (extent, kind) = {
            let a = self.axis(axis);
            (a.extent.clone(), a.kind)
        };
        let outer = self.new_axis(extent.ceil_div(Extent::Const(factor)).simplify(), kind);
        let inner = self.new_axis(Extent::Const(factor), kind);
        self.push_axis_op(AxisOp { kind: AxisOpKind::Split, inputs: smallvec![axis], outputs: smallvec![outer, inner] });
        let dom = &mut self.tensors[tv.index()].loop_dom;
        dom.splice(pos..=pos, [outer, inner]);
        Ok(())
    }

    /// Merge loop axes `pos` and `pos + 1` into one.
    pub fn merge(&mut self, tv: TensorId, pos: usize) -> Result<()> {
        let ndims = self.ndims(tv);
        ensure!(pos + 1 < ndims, PositionOutOfRangeSnafu { tensor: tv, pos: pos as i64 + 1, ndims });
        let (a, b) = {
            let dom = &self.tensors[tv.index()].loop_dom;
            (dom[pos], dom[pos + 1])
        };
        let (ka, kb) = (self.axis(a).kind, self.axis(b).kind);
        ensure!(
            (ka == IterKind::Reduction) == (kb == IterKind::Reduction),
            IllegalAxisTransformSnafu { axis: a, reason: "cannot merge a reduction axis with an iteration axis" }
        );
        let kind = match (ka, kb) {
            (IterKind::Broadcast, IterKind::Broadcast) => IterKind::Broadcast,
            (IterKind::Reduction, IterKind::Reduction) => IterKind::Reduction,
            _ => IterKind::Iteration,
        };
        let extent = self.axis(a).extent.clone().mul(self.axis(b).extent.clone()).simplify();
        let merged = self.new_axis(extent, kind);
        self.push_axis_op(AxisOp { kind: AxisOpKind::Merge, inputs: smallvec![a, b], outputs: smallvec![merged] });
        let dom = &mut self.tensors[tv.index()].loop_dom;
        dom.splice(pos..=pos + 1, [merged]);
        Ok(())
    }

    /// 2D swizzle of loop axes `pos` and `pos + 1`; extents are preserved.
    pub fn swizzle(&mut self, tv: TensorId, pos: usize) -> Result<()> {
        let ndims = self.ndims(tv);
        ensure!(pos + 1 < ndims, PositionOutOfRangeSnafu { tensor: tv, pos: pos as i64 + 1, ndims });
        let (a, b) = {
            let dom = &self.tensors[tv.index()].loop_dom;
            (dom[pos], dom[pos + 1])
        };
        let out_a = self.mirror_axis(a);
        let out_b = self.mirror_axis(b);
        self.push_axis_op(AxisOp { kind: AxisOpKind::Swizzle, inputs: smallvec![a, b], outputs: smallvec![out_a, out_b] });
        let dom = &mut self.tensors[tv.index()].loop_dom;
        dom[pos] = out_a;
        dom[pos + 1] = out_b;
        Ok(())
    }

    /// Set the compute-at position of a tensor. Negative positions count from
    /// the end, Python style.
    pub fn set_compute_at(&mut self, tv: TensorId, pos: i64) -> Result<usize> {
        let ndims = self.ndims(tv);
        let resolved = if pos < 0 { pos + ndims as i64 + 1 } else { pos };
        ensure!(
            (0..=ndims as i64).contains(&resolved),
            PositionOutOfRangeSnafu { tensor: tv, pos, ndims }
        );
        self.tensors[tv.index()].compute_at = resolved as usize;
        Ok(resolved as usize)
    }

    pub fn compute_at(&self, tv: TensorId) -> usize {
        self.tensors[tv.index()].compute_at
    }

    pub fn set_circular_buffer(&mut self, tv: TensorId, options: CircularBufferType) {
        self.tensors[tv.index()].circular_buffer = Some(options);
    }

    pub fn circular_buffer(&self, tv: TensorId) -> Option<&CircularBufferType> {
        self.tensors[tv.index()].circular_buffer.as_ref()
    }

    // =========================================================================
    // Tensor queries
    // =========================================================================

    pub fn num_tensors(&self) -> usize {
        self.tensors.len()
    }

    pub fn all_tensor_ids(&self) -> impl Iterator<Item = TensorId> + '_ {
        (0..self.tensors.len() as u32).map(TensorId)
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn is_input(&self, tv: TensorId) -> bool {
        self.tensors[tv.index()].definition.is_none()
    }

    pub fn root_domain(&self, tv: TensorId) -> &[AxisId] {
        &self.tensors[tv.index()].root
    }

    /// Logical domain; falls back to root when no logical-shape transform
    /// separates them.
    pub fn logical_domain(&self, tv: TensorId) -> &[AxisId] {
        let t = &self.tensors[tv.index()];
        t.logical.as_deref().unwrap_or(&t.root)
    }

    pub fn loop_domain(&self, tv: TensorId) -> &[AxisId] {
        &self.tensors[tv.index()].loop_dom
    }

    /// True when the tensor has a root domain distinct from its logical one.
    pub fn has_root(&self, tv: TensorId) -> bool {
        self.tensors[tv.index()].logical.is_some()
    }

    pub fn ndims(&self, tv: TensorId) -> usize {
        self.tensors[tv.index()].loop_dom.len()
    }

    /// Every axis associated with the tensor: root, logical and loop views,
    /// deduplicated, in that order.
    pub fn all_axes_of(&self, tv: TensorId) -> Vec<AxisId> {
        let t = &self.tensors[tv.index()];
        t.root
            .iter()
            .chain(t.logical.iter().flatten())
            .chain(&t.loop_dom)
            .copied()
            .unique()
            .collect()
    }

    pub fn definition(&self, tv: TensorId) -> Option<OpId> {
        self.tensors[tv.index()].definition
    }

    pub fn op(&self, id: OpId) -> &TensorOp {
        &self.ops[id.index()]
    }

    /// All tensor ops in topological (insertion) order.
    pub fn ops_topo(&self) -> impl Iterator<Item = OpId> + '_ {
        (0..self.ops.len() as u32).map(OpId)
    }

    /// Ops consuming `tv`.
    pub fn tensor_uses(&self, tv: TensorId) -> &[OpId] {
        &self.tensor_uses[tv.index()]
    }

    pub fn producers_of(&self, tv: TensorId) -> Vec<TensorId> {
        let Some(def) = self.definition(tv) else { return Vec::new() };
        self.op(def).inputs.iter().copied().unique().collect()
    }

    pub fn consumers_of(&self, tv: TensorId) -> Vec<TensorId> {
        self.tensor_uses(tv)
            .iter()
            .flat_map(|&use_op| self.op(use_op).outputs.iter().copied())
            .unique()
            .collect()
    }

    /// Other outputs of the defining op.
    pub fn siblings_of(&self, tv: TensorId) -> Vec<TensorId> {
        let Some(def) = self.definition(tv) else { return Vec::new() };
        self.op(def).outputs.iter().copied().filter(|&o| o != tv).collect()
    }

    /// Sibling outputs are uniform when every output carries the same domain
    /// structure; multi-output ops like attention violate this.
    pub fn has_uniform_siblings(&self, op: OpId) -> bool {
        let outputs = &self.op(op).outputs;
        let Some((&first, rest)) = outputs.split_first() else { return true };
        rest.iter().all(|&o| {
            self.root_domain(o).len() == self.root_domain(first).len()
                && self.logical_domain(o).len() == self.logical_domain(first).len()
                && self.has_root(o) == self.has_root(first)
        })
    }

    // =========================================================================
    // Axis DAG queries
    // =========================================================================

    /// Axis ops lying on any forward path from `from` to `to`, in creation
    /// order. Empty when `to` is not reachable from `from` (or they are the
    /// same axis).
    pub fn axis_ops_between(&self, from: AxisId, to: AxisId) -> Vec<AxisOpId> {
        if from == to {
            return Vec::new();
        }
        let forward = self.axis_descendants(from);
        if !forward.contains(&to) {
            return Vec::new();
        }
        let backward = self.axis_ancestors(to);
        self.axis_ops
            .iter()
            .enumerate()
            .filter(|(_, op)| {
                let consumes = op.inputs.iter().any(|i| *i == from || forward.contains(i));
                let produces = op.outputs.iter().any(|o| *o == to || backward.contains(o));
                consumes && produces
            })
            .map(|(i, _)| AxisOpId(i as u32))
            .collect()
    }

    /// `to` and everything reachable from it through axis uses.
    fn axis_descendants(&self, from: AxisId) -> Vec<AxisId> {
        let mut reached = vec![from];
        let mut frontier = vec![from];
        while let Some(axis) = frontier.pop() {
            for &use_op in self.axis_uses(axis) {
                for &out in &self.axis_op(use_op).outputs {
                    if !reached.contains(&out) {
                        reached.push(out);
                        frontier.push(out);
                    }
                }
            }
        }
        reached
    }

    fn axis_ancestors(&self, to: AxisId) -> Vec<AxisId> {
        let mut reached = vec![to];
        let mut frontier = vec![to];
        while let Some(axis) = frontier.pop() {
            if let Some(def) = self.axis(axis).definition {
                for &input in &self.axis_op(def).inputs {
                    if !reached.contains(&input) {
                        reached.push(input);
                        frontier.push(input);
                    }
                }
            }
        }
        reached
    }
}
