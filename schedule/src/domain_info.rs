//! Root/logical domain information.
//!
//! The concrete payload propagated by the spanning tree: an ordered list of
//! records, one per reference axis that is still traceable, each holding the
//! set of axes currently standing in for it, whether every reference axis
//! found a counterpart, and whether the record is expressed in the root or
//! the logical basis of its tensor.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use smallvec::SmallVec;
use snafu::ensure;

use kiln_ir::{AxisId, AxisOpKind, Graph, PairwiseDomainMap, TensorId};

use crate::error::*;
use crate::propagate::InfoModel;

/// What is known about one reference axis at some tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisInfo {
    /// Axes of the current tensor carrying the reference axis's information.
    pub mapped: BTreeSet<AxisId>,
    /// False once any axis failed to map along the way.
    pub is_complete: bool,
    /// Basis of `mapped`: logical domain when true, root domain when false.
    pub is_logical: bool,
}

/// Ordered collection of [`AxisInfo`] records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainInfo {
    pub records: SmallVec<[AxisInfo; 4]>,
}

impl DomainInfo {
    pub fn non_empty(&self) -> bool {
        !self.records.is_empty()
    }

    fn complete_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_complete).count()
    }

    /// More records, then more complete records, count as strictly more
    /// information. Everything else is a tie.
    pub fn cmp_info(&self, other: &Self) -> Ordering {
        self.records
            .len()
            .cmp(&other.records.len())
            .then_with(|| self.complete_count().cmp(&other.complete_count()))
    }

    /// Reference payload over the whole root domain: one complete root-basis
    /// record per axis.
    pub fn from_reference(graph: &Graph, tv: TensorId) -> Self {
        let records = graph
            .root_domain(tv)
            .iter()
            .map(|&id| AxisInfo { mapped: BTreeSet::from([id]), is_complete: true, is_logical: false })
            .collect();
        Self { records }
    }

    /// Reference payload for "inline up to `loop_pos`": one record per
    /// logical axis reachable from the loop axes left of the position.
    /// Negative positions count from the end.
    pub fn from_reference_at(graph: &Graph, tv: TensorId, loop_pos: i64, through_resize: bool) -> Result<Self> {
        let pos = resolve_loop_pos(graph, tv, loop_pos)?;
        let selected: BTreeSet<AxisId> = graph.loop_domain(tv)[..pos].iter().copied().collect();
        let mut records = SmallVec::new();
        for &id in graph.logical_domain(tv) {
            let reachable = selected.contains(&id)
                || selected
                    .iter()
                    .any(|&sel| reaches(graph, id, sel, through_resize));
            if reachable {
                records.push(AxisInfo { mapped: BTreeSet::from([id]), is_complete: true, is_logical: true });
            }
        }
        Ok(Self { records })
    }
}

/// Resolve a possibly-negative loop position against a tensor's rank.
pub fn resolve_loop_pos(graph: &Graph, tv: TensorId, pos: i64) -> Result<usize> {
    let ndims = graph.ndims(tv);
    let resolved = if pos < 0 { pos + ndims as i64 + 1 } else { pos };
    ensure!(
        (0..=ndims as i64).contains(&resolved),
        PositionOutOfRangeSnafu { tensor: tv, pos, ndims }
    );
    Ok(resolved as usize)
}

/// Is `to` derived from `from` in the axis DAG, honoring the resize-skip
/// policy?
fn reaches(graph: &Graph, from: AxisId, to: AxisId, through_resize: bool) -> bool {
    let ops = graph.axis_ops_between(from, to);
    !ops.is_empty()
        && (through_resize || ops.iter().all(|&op| graph.axis_op(op).kind != AxisOpKind::Resize))
}

/// Promote root-basis axes of `tv` to the logical axes derived from them.
fn map_root_to_logical(
    graph: &Graph,
    tv: TensorId,
    root_ids: &BTreeSet<AxisId>,
    through_resize: bool,
) -> BTreeSet<AxisId> {
    let mut mapped = BTreeSet::new();
    for &id in graph.logical_domain(tv) {
        if root_ids.contains(&id) {
            mapped.insert(id);
            continue;
        }
        if root_ids.iter().any(|&root| reaches(graph, root, id, through_resize)) {
            mapped.insert(id);
        }
    }
    mapped
}

/// Pull logical-basis axes of `tv` back to the root axes they derive from.
fn map_logical_to_root(
    graph: &Graph,
    tv: TensorId,
    logical_ids: &BTreeSet<AxisId>,
    through_resize: bool,
) -> BTreeSet<AxisId> {
    let mut mapped = BTreeSet::new();
    for &id in graph.root_domain(tv) {
        if logical_ids.contains(&id) {
            mapped.insert(id);
            continue;
        }
        if logical_ids.iter().any(|&logical| reaches(graph, id, logical, through_resize)) {
            mapped.insert(id);
        }
    }
    mapped
}

/// The root/logical information model. `through_resize` controls whether
/// resize chains transport information.
#[derive(Debug, Clone, Copy)]
pub struct LogicalDomainModel {
    pub through_resize: bool,
}

impl LogicalDomainModel {
    pub fn new(through_resize: bool) -> Self {
        Self { through_resize }
    }
}

impl InfoModel for LogicalDomainModel {
    type Info = DomainInfo;

    fn non_empty(info: &DomainInfo) -> bool {
        info.non_empty()
    }

    fn compare(a: &DomainInfo, b: &DomainInfo) -> Ordering {
        a.cmp_info(b)
    }

    // Records arrive in the producer's root or logical basis. Root-basis
    // records are first promoted to the logical basis, then mapped pairwise;
    // the result lives in the consumer's root basis, which holds the
    // consumer's raw information.
    fn transfer_p2c(&self, graph: &Graph, from: TensorId, to: TensorId, info: &DomainInfo) -> DomainInfo {
        let (producer, consumer) = (from, to);
        let Ok(pairwise) = PairwiseDomainMap::new(graph, producer, consumer) else {
            debug_assert!(false, "p2c transfer along a non-edge");
            return DomainInfo::default();
        };
        let p2c = pairwise.map_producer_to_consumer(None);

        let mut result = DomainInfo::default();
        for record in &info.records {
            let producer_logical = if graph.has_root(producer) && !record.is_logical {
                map_root_to_logical(graph, producer, &record.mapped, self.through_resize)
            } else {
                record.mapped.clone()
            };

            let mut consumer_record =
                AxisInfo { mapped: BTreeSet::new(), is_complete: record.is_complete, is_logical: false };
            for producer_id in producer_logical {
                match p2c.get(&producer_id) {
                    Some(&consumer_id) => {
                        consumer_record.mapped.insert(consumer_id);
                    }
                    None => consumer_record.is_complete = false,
                }
            }
            if !consumer_record.mapped.is_empty() {
                result.records.push(consumer_record);
            }
        }
        result
    }

    // Mirror image of `transfer_p2c`, except the result stops at the
    // producer's logical basis. Pulling further back to the producer root
    // would wrongly widen a reference axis through merges: in a C->P->C'
    // path the correct route is C(root) -> P(logical) -> C'(root), never
    // through P(root).
    fn transfer_c2p(&self, graph: &Graph, from: TensorId, to: TensorId, info: &DomainInfo) -> DomainInfo {
        let (consumer, producer) = (from, to);
        let Ok(pairwise) = PairwiseDomainMap::new(graph, producer, consumer) else {
            debug_assert!(false, "c2p transfer along a non-edge");
            return DomainInfo::default();
        };
        let c2p = pairwise.map_consumer_to_producer(None);

        let mut result = DomainInfo::default();
        for record in &info.records {
            let consumer_root = if record.is_logical && graph.has_root(consumer) {
                map_logical_to_root(graph, consumer, &record.mapped, self.through_resize)
            } else {
                record.mapped.clone()
            };

            let mut producer_record =
                AxisInfo { mapped: BTreeSet::new(), is_complete: record.is_complete, is_logical: true };
            for consumer_id in consumer_root {
                match c2p.get(&consumer_id) {
                    Some(&producer_id) => {
                        producer_record.mapped.insert(producer_id);
                    }
                    None => producer_record.is_complete = false,
                }
            }
            if !producer_record.mapped.is_empty() {
                result.records.push(producer_record);
            }
        }
        result
    }

    // Siblings share domain structure by construction (the engine gates
    // non-uniform ones), so this is a pure positional relabeling.
    fn transfer_sibling(&self, graph: &Graph, from: TensorId, to: TensorId, info: &DomainInfo) -> DomainInfo {
        debug_assert_eq!(graph.root_domain(from).len(), graph.root_domain(to).len());
        debug_assert_eq!(graph.logical_domain(from).len(), graph.logical_domain(to).len());

        let mut id_map: std::collections::BTreeMap<AxisId, AxisId> = graph
            .logical_domain(from)
            .iter()
            .zip(graph.logical_domain(to))
            .map(|(&f, &t)| (f, t))
            .collect();
        if graph.has_root(from) {
            id_map.extend(graph.root_domain(from).iter().zip(graph.root_domain(to)).map(|(&f, &t)| (f, t)));
        }

        let records = info
            .records
            .iter()
            .map(|record| AxisInfo {
                mapped: record.mapped.iter().filter_map(|id| id_map.get(id).copied()).collect(),
                is_complete: record.is_complete,
                is_logical: record.is_logical,
            })
            .collect();
        DomainInfo { records }
    }
}
