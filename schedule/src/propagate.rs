//! Max-information spanning tree.
//!
//! A scheduling decision made on one reference tensor is replayed onto every
//! reachable tensor via producer, consumer and sibling edges. Edge order is
//! chosen by a variant of Prim's algorithm: among all not-yet-visited
//! destinations, always step to the one whose transferred information about
//! the reference is largest. The engine is generic over the information
//! payload ([`InfoModel`]) and over what "replay" means ([`Propagator`]);
//! an optional [`Selector`] filters edges.

use std::cmp::Ordering;
use std::collections::{BTreeSet, VecDeque};
use std::fmt::Write;

use once_cell::unsync::OnceCell;
use tracing::trace;

use kiln_ir::{Graph, TensorId};

/// Direction of one step of the spanning tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Sibling,
    /// The source acts as producer; the destination is one of its consumers.
    ProducerToConsumer,
    /// The source acts as consumer; the destination is one of its producers.
    ConsumerToProducer,
}

/// One recorded step of the traversal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub from: TensorId,
    pub to: TensorId,
}

/// Edge filter supplied by the caller. Every method defaults to allowing the
/// edge.
pub trait Selector {
    fn allow_c2p(&self, _from: TensorId, _to: TensorId) -> bool {
        true
    }
    fn allow_p2c(&self, _from: TensorId, _to: TensorId) -> bool {
        true
    }
    fn allow_sibling(&self, _from: TensorId, _to: TensorId) -> bool {
        true
    }
}

/// Allow-list selector: producer/consumer steps may only land on selected
/// tensors. Sibling steps are always allowed.
pub struct SetSelector {
    selected: BTreeSet<TensorId>,
}

impl SetSelector {
    pub fn new(selected: BTreeSet<TensorId>) -> Self {
        Self { selected }
    }

    pub fn selected(&self) -> &BTreeSet<TensorId> {
        &self.selected
    }
}

impl Selector for SetSelector {
    fn allow_c2p(&self, _from: TensorId, to: TensorId) -> bool {
        self.selected.contains(&to)
    }

    fn allow_p2c(&self, _from: TensorId, to: TensorId) -> bool {
        self.selected.contains(&to)
    }
}

/// Receiver of the replay callbacks, one per recorded edge.
pub trait Propagator {
    fn set_up(&mut self) {}
    fn tear_down(&mut self) {}
    fn propagate_sibling(&mut self, from: TensorId, to: TensorId);
    fn propagate_p2c(&mut self, from: TensorId, to: TensorId);
    fn propagate_c2p(&mut self, from: TensorId, to: TensorId);
}

/// The information payload carried during path-finding, with its transfer
/// rules. Only the ordering and emptiness of the payload influence the path.
pub trait InfoModel {
    type Info: Clone;

    /// Does the payload still say anything about the reference?
    fn non_empty(info: &Self::Info) -> bool;

    /// Total order modulo ties; incomparable payloads compare `Equal` and the
    /// first-discovered candidate is kept.
    fn compare(a: &Self::Info, b: &Self::Info) -> Ordering;

    fn transfer_p2c(&self, graph: &Graph, from: TensorId, to: TensorId, info: &Self::Info) -> Self::Info;
    fn transfer_c2p(&self, graph: &Graph, from: TensorId, to: TensorId, info: &Self::Info) -> Self::Info;
    fn transfer_sibling(&self, graph: &Graph, from: TensorId, to: TensorId, info: &Self::Info) -> Self::Info;
}

struct Candidate<I> {
    edge: Option<Edge>,
    to: TensorId,
    info: I,
}

/// Prim's-style maximum spanning tree over the tensor graph, rooted at a
/// reference tensor. The computed path is memoized; repeated [`traverse`]
/// calls replay the same path against different propagators, which is sound
/// because the path depends only on the graph and the reference.
///
/// [`traverse`]: MaxInfoSpanningTree::traverse
pub struct MaxInfoSpanningTree<'g, M: InfoModel> {
    graph: &'g Graph,
    model: M,
    reference: TensorId,
    reference_info: M::Info,
    selector: Option<&'g dyn Selector>,
    path: OnceCell<Vec<Edge>>,
}

impl<'g, M: InfoModel> MaxInfoSpanningTree<'g, M> {
    pub fn new(
        graph: &'g Graph,
        model: M,
        reference: TensorId,
        reference_info: M::Info,
        selector: Option<&'g dyn Selector>,
    ) -> Self {
        Self { graph, model, reference, reference_info, selector, path: OnceCell::new() }
    }

    fn allow_c2p(&self, from: TensorId, to: TensorId) -> bool {
        self.selector.is_none_or(|s| s.allow_c2p(from, to))
    }

    fn allow_p2c(&self, from: TensorId, to: TensorId) -> bool {
        self.selector.is_none_or(|s| s.allow_p2c(from, to))
    }

    fn allow_sibling(&self, from: TensorId, to: TensorId) -> bool {
        // Non-uniform siblings (attention-style ops) cannot relabel records
        // positionally, so the edge is disabled outright.
        if let Some(def) = self.graph.definition(from)
            && !self.graph.has_uniform_siblings(def)
        {
            return false;
        }
        self.selector.is_none_or(|s| s.allow_sibling(from, to))
    }

    /// Insert a candidate at its sorted position (ascending information, so
    /// the back holds the best next step). An existing candidate to the same
    /// destination survives unless the new one preserves strictly more.
    fn insert_candidate(candidates: &mut Vec<Candidate<M::Info>>, candidate: Candidate<M::Info>) {
        if let Some(pos) = candidates.iter().position(|c| c.to == candidate.to) {
            if M::compare(&candidates[pos].info, &candidate.info) == Ordering::Less {
                candidates.remove(pos);
            } else {
                return;
            }
        }
        let at = candidates.partition_point(|c| M::compare(&c.info, &candidate.info) != Ordering::Greater);
        candidates.insert(at, candidate);
    }

    fn compute_spanning_tree(&self) -> Vec<Edge> {
        let mut path = Vec::new();
        let mut visited: BTreeSet<TensorId> = BTreeSet::new();
        let mut candidates: Vec<Candidate<M::Info>> =
            vec![Candidate { edge: None, to: self.reference, info: self.reference_info.clone() }];

        while let Some(Candidate { edge, to, info }) = candidates.pop() {
            if let Some(edge) = edge {
                path.push(edge);
            }
            visited.insert(to);

            // With no information left about the reference there is no point
            // extending the search through this node.
            if !M::non_empty(&info) {
                continue;
            }

            for sibling in self.graph.siblings_of(to) {
                if visited.contains(&sibling) || !self.allow_sibling(to, sibling) {
                    continue;
                }
                Self::insert_candidate(&mut candidates, Candidate {
                    edge: Some(Edge { kind: EdgeKind::Sibling, from: to, to: sibling }),
                    to: sibling,
                    info: self.model.transfer_sibling(self.graph, to, sibling, &info),
                });
            }

            for consumer in self.graph.consumers_of(to) {
                if visited.contains(&consumer) || !self.allow_p2c(to, consumer) {
                    continue;
                }
                Self::insert_candidate(&mut candidates, Candidate {
                    edge: Some(Edge { kind: EdgeKind::ProducerToConsumer, from: to, to: consumer }),
                    to: consumer,
                    info: self.model.transfer_p2c(self.graph, to, consumer, &info),
                });
            }

            for producer in self.graph.producers_of(to) {
                if visited.contains(&producer) || !self.allow_c2p(to, producer) {
                    continue;
                }
                Self::insert_candidate(&mut candidates, Candidate {
                    edge: Some(Edge { kind: EdgeKind::ConsumerToProducer, from: to, to: producer }),
                    to: producer,
                    info: self.model.transfer_c2p(self.graph, to, producer, &info),
                });
            }
        }

        trace!(reference = %self.reference, steps = path.len(), "spanning tree computed");
        path
    }

    /// The memoized traversal order.
    pub fn path(&self) -> &[Edge] {
        self.path.get_or_init(|| self.compute_spanning_tree())
    }

    /// Replay the path against a propagator.
    pub fn traverse(&self, propagator: &mut dyn Propagator) {
        let path = self.path();
        propagator.set_up();
        for edge in path {
            match edge.kind {
                EdgeKind::Sibling => propagator.propagate_sibling(edge.from, edge.to),
                EdgeKind::ProducerToConsumer => propagator.propagate_p2c(edge.from, edge.to),
                EdgeKind::ConsumerToProducer => propagator.propagate_c2p(edge.from, edge.to),
            }
        }
        propagator.tear_down();
    }
}

/// Trace propagator: renders each step as text, for debugging schedules.
#[derive(Default)]
pub struct SpanningTreePrinter {
    out: String,
}

impl SpanningTreePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn record(&mut self, label: &str, from: TensorId, to: TensorId) {
        // Writing to a String cannot fail.
        let _ = writeln!(self.out, "{label}\n  from: {from}\n  to: {to}");
    }
}

impl Propagator for SpanningTreePrinter {
    fn propagate_sibling(&mut self, from: TensorId, to: TensorId) {
        self.record("propagateSibling", from, to);
    }

    fn propagate_p2c(&mut self, from: TensorId, to: TensorId) {
        self.record("propagateP2C", from, to);
    }

    fn propagate_c2p(&mut self, from: TensorId, to: TensorId) {
        self.record("propagateC2P", from, to);
    }
}

/// Breadth-first tensor traversal from a reference, ignoring information
/// content. Used by callers that only need reachability.
pub fn reachable_tensors(graph: &Graph, reference: TensorId) -> Vec<TensorId> {
    let mut seen = BTreeSet::from([reference]);
    let mut order = vec![reference];
    let mut frontier = VecDeque::from([reference]);
    while let Some(tv) = frontier.pop_front() {
        let neighbors = graph
            .siblings_of(tv)
            .into_iter()
            .chain(graph.consumers_of(tv))
            .chain(graph.producers_of(tv));
        for next in neighbors {
            if seen.insert(next) {
                order.push(next);
                frontier.push_back(next);
            }
        }
    }
    order
}
