//! Parallel dimension map.
//!
//! For each hardware thread/block dimension, the extent every bound axis
//! agrees on (or the maximum of them), an exactness flag, and the
//! adjustments for warp padding and warp specialization with register
//! sharing. Built once per finished, scheduled graph; queried by launch
//! configuration and bounds checking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use snafu::ensure;
use tracing::debug;

use kiln_ir::{
    AxisEquivalence, AxisId, CircularBufferType, Extent, Graph, PARALLEL_TYPE_THREADS, PARALLEL_TYPE_TIDS,
    ParallelType,
};

use crate::error::*;

pub const WARP_SIZE: i64 = 32;

/// Register sharing swaps registers between warp groups of 128 threads.
const REGISTER_SHARING_GROUP: i64 = 128;

/// Externally supplied warp-padding flags, resolved by the reduction
/// scheduler before this map is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarpPadInfo {
    pub is_tidx_padded: bool,
    pub is_tidx_single_warp: bool,
    pub has_warp_reduction: bool,
}

#[derive(Debug)]
pub struct ParallelDimensionMap {
    dim_map: BTreeMap<ParallelType, Extent>,
    exact_types: BTreeSet<ParallelType>,
    warp_specialized_types: BTreeSet<ParallelType>,
    /// Dimension carrying the register-sharing pad, and the pad amount.
    register_sharing: Option<(ParallelType, i64)>,
}

impl ParallelDimensionMap {
    pub fn build(graph: &Graph, equivalence: &AxisEquivalence, warp_pad: &WarpPadInfo) -> Result<Self> {
        let mut warp_specialized_types = BTreeSet::new();
        let mut register_sharing_on = None;

        // Order-stable unique (dimension, representative axis) pairs.
        let mut all_bound: Vec<(ParallelType, AxisId)> = Vec::new();
        for tv in graph.all_tensor_ids() {
            if let Some(CircularBufferType::WarpSpecialized { on, num_registers }) = graph.circular_buffer(tv) {
                warp_specialized_types.insert(*on);
                if num_registers.is_some() {
                    register_sharing_on = Some(*on);
                }
            }
            for id in graph.all_axes_of(tv) {
                let ptype = graph.axis(id).parallel;
                if !ptype.is_thread_dim() {
                    continue;
                }
                let representative = equivalence.exact_representative(id);
                if graph.axis(representative).is_broadcast() {
                    // Broadcast representatives say nothing about shape.
                    continue;
                }
                if !all_bound.contains(&(ptype, representative)) {
                    all_bound.push((ptype, representative));
                }
            }
        }

        let mut dim_map: BTreeMap<ParallelType, Extent> = BTreeMap::new();
        let mut exact_types = BTreeSet::new();
        for &(ptype, representative) in &all_bound {
            // Assume exact now; cleaned up below.
            exact_types.insert(ptype);
            let extent = &graph.axis(representative).extent;
            dim_map
                .entry(ptype)
                .and_modify(|dim| *dim = Extent::max_expr(dim, extent))
                .or_insert_with(|| extent.clone());
        }
        for dim in dim_map.values_mut() {
            *dim = dim.simplify();
        }

        for &(ptype, representative) in &all_bound {
            if dim_map[&ptype].prove_eq(&graph.axis(representative).extent) != Some(true) {
                exact_types.remove(&ptype);
            }
        }

        let mut map = Self { dim_map, exact_types, warp_specialized_types, register_sharing: None };
        map.adjust_for_warp_padding(warp_pad)?;
        map.adjust_for_warp_specialization(register_sharing_on)?;
        debug!(dims = map.dim_map.len(), exact = map.exact_types.len(), "parallel dimension map built");
        Ok(map)
    }

    fn adjust_for_warp_padding(&mut self, warp_pad: &WarpPadInfo) -> Result<()> {
        // threadIdx.x is only really padded when a warp reduction exists.
        if !(warp_pad.is_tidx_padded && warp_pad.has_warp_reduction) {
            return Ok(());
        }
        let tidx = ParallelType::TIDx;
        let Some(tidx_dim) = self.dim_map.get(&tidx).cloned() else {
            return Err(Error::WarpPaddingUnboundTidx);
        };

        // Strictly blockDim.x is a multiple of the warp by definition.
        if tidx_dim == Extent::ParallelDim(tidx) {
            return Ok(());
        }
        if tidx_dim.is_multiple_of(WARP_SIZE) == Some(true) {
            return Ok(());
        }

        let padded = if warp_pad.is_tidx_single_warp {
            Extent::Const(WARP_SIZE)
        } else {
            tidx_dim.ceil_div(Extent::Const(WARP_SIZE)).mul(Extent::Const(WARP_SIZE)).simplify()
        };
        self.dim_map.insert(tidx, padded);
        self.exact_types.remove(&tidx);
        Ok(())
    }

    fn adjust_for_warp_specialization(&mut self, register_sharing_on: Option<ParallelType>) -> Result<()> {
        let Some(on) = register_sharing_on else {
            // Without register sharing, one extra thread layer selects the
            // specialized role.
            let types: Vec<ParallelType> = self.warp_specialized_types.iter().copied().collect();
            for pt in types {
                let dim = match self.dim_map.get(&pt) {
                    None => Extent::Const(2),
                    // Deliberately left unsimplified so `get_raw_compute` can
                    // recover the original extent by adding the negated pad.
                    Some(dim) => Extent::Add(Box::new(dim.clone()), Box::new(Extent::Const(1))),
                };
                self.dim_map.insert(pt, dim);
                self.exact_types.remove(&pt);
            }
            return Ok(());
        };

        // Register sharing requires a contiguous group of 128 threads issuing
        // the same setreg, with threads linearized as
        // index = TIDx + TIDy * bdimx + TIDz * bdimx * bdimy.
        let pad_n_threads;
        let after_pad;
        match on {
            ParallelType::TIDx => {
                pad_n_threads = REGISTER_SHARING_GROUP;
                after_pad = self.threads_in_dim(on, ParallelType::TIDx)? + pad_n_threads;
                ensure!(
                    after_pad % REGISTER_SHARING_GROUP == 0,
                    RegisterSharingMisalignedSnafu { on, threads: after_pad }
                );
            }
            ParallelType::TIDy => {
                let bdimx = self.threads_in_dim(on, ParallelType::TIDx)?;
                pad_n_threads = safe_div(REGISTER_SHARING_GROUP, bdimx);
                after_pad = self.threads_in_dim(on, ParallelType::TIDy)? + pad_n_threads;
                ensure!(
                    (after_pad * bdimx) % REGISTER_SHARING_GROUP == 0,
                    RegisterSharingMisalignedSnafu { on, threads: after_pad * bdimx }
                );
            }
            ParallelType::TIDz => {
                let bdimx = self.threads_in_dim(on, ParallelType::TIDx)?;
                let bdimy = self.threads_in_dim(on, ParallelType::TIDy)?;
                pad_n_threads = safe_div(REGISTER_SHARING_GROUP, bdimx * bdimy);
                after_pad = self.threads_in_dim(on, ParallelType::TIDz)? + pad_n_threads;
                ensure!(
                    (after_pad * bdimx * bdimy) % REGISTER_SHARING_GROUP == 0,
                    RegisterSharingMisalignedSnafu { on, threads: after_pad * bdimx * bdimy }
                );
            }
            _ => return Err(Error::RegisterSharingUnsupported { on }),
        }

        self.register_sharing = Some((on, pad_n_threads));
        let current = self.dim_map.get(&on).cloned().unwrap_or(Extent::Const(1));
        // Unsimplified, as above.
        self.dim_map.insert(on, Extent::Add(Box::new(current), Box::new(Extent::Const(pad_n_threads))));
        self.exact_types.remove(&on);
        Ok(())
    }

    /// Thread count along `dim`: 1 when unused, its constant extent
    /// otherwise. Dynamic extents cannot satisfy the 128-thread proof and
    /// are rejected eagerly.
    fn threads_in_dim(&self, on: ParallelType, dim: ParallelType) -> Result<i64> {
        match self.dim_map.get(&dim) {
            None => Ok(1),
            Some(extent) => extent
                .simplify()
                .as_const()
                .ok_or(Error::RegisterSharingDynamicDim { on, dim }),
        }
    }

    /// The raw extent bound to a dimension, if any axis uses it.
    pub fn get_raw(&self, pt: ParallelType) -> Option<&Extent> {
        debug_assert!(pt.is_thread_dim());
        self.dim_map.get(&pt)
    }

    /// Extent for launch configuration: the launch scalar itself when the
    /// bound extent is not a compile-time constant.
    pub fn get(&self, pt: ParallelType) -> Option<Extent> {
        let raw = self.get_raw(pt)?;
        if raw.simplify().is_const() {
            Some(raw.clone())
        } else {
            Some(Extent::ParallelDim(pt))
        }
    }

    /// Every axis bound to `pt` provably has the mapped extent.
    pub fn is_exact(&self, pt: ParallelType) -> bool {
        self.exact_types.contains(&pt)
    }

    /// Threads along `pt` available to the compute warp groups, with the
    /// warp-specialization pad removed.
    pub fn get_raw_compute(&self, pt: ParallelType) -> Result<Option<Extent>> {
        let Some(raw) = self.get_raw(pt) else { return Ok(None) };
        if self.warp_specialized_types.contains(&pt) {
            let pad = self.warp_specialization_padded_val(pt)?;
            return Ok(Some(raw.clone().add(Extent::Const(-pad)).simplify()));
        }
        Ok(Some(raw.clone()))
    }

    /// Threads along `pt` available to the load warp group.
    pub fn get_raw_load(&self, pt: ParallelType) -> Result<Option<Extent>> {
        if self.warp_specialized_types.contains(&pt) {
            let pad = self.warp_specialization_padded_val(pt)?;
            return Ok(Some(Extent::Const(pad)));
        }
        Ok(self.get_raw(pt).cloned())
    }

    /// Product of the per-block compute thread counts.
    pub fn get_num_compute_threads_each_block(&self) -> Result<Extent> {
        let mut num_threads = Extent::one();
        for pt in PARALLEL_TYPE_TIDS {
            let Some(dim) = self.get_raw_compute(pt)? else { continue };
            num_threads = num_threads.mul(dim).simplify();
        }
        Ok(num_threads)
    }

    /// How many threads along `pt` are reserved for the specialized role.
    pub fn warp_specialization_padded_val(&self, pt: ParallelType) -> Result<i64> {
        ensure!(self.warp_specialized_types.contains(&pt), NotWarpSpecializedSnafu { dim: pt });
        match self.register_sharing {
            None => Ok(1),
            Some((on, pad)) if on == pt => Ok(pad),
            Some(_) => Err(Error::NotWarpSpecialized { dim: pt }),
        }
    }
}

fn safe_div(x: i64, y: i64) -> i64 {
    (x / y).max(1)
}

impl fmt::Display for ParallelDimensionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pt in PARALLEL_TYPE_THREADS {
            write!(f, "{pt}: ")?;
            match self.get_raw(pt) {
                Some(dim) => {
                    let exact = if self.is_exact(pt) { "exact" } else { "non-exact" };
                    writeln!(f, "{dim}, {exact}")?;
                }
                None => writeln!(f, "unused")?,
            }
        }
        Ok(())
    }
}
