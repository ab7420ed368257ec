//! Fundamental type definitions: arena handles, axis kinds, parallel types.

use std::fmt;

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_handle!(
    /// Handle of an axis record in the graph arena.
    AxisId, "i"
);
arena_handle!(
    /// Handle of an axis-defining operation (split/merge/swizzle/resize).
    AxisOpId, "iop"
);
arena_handle!(
    /// Handle of a tensor node.
    TensorId, "t"
);
arena_handle!(
    /// Handle of a tensor operation.
    OpId, "op"
);

/// Kind of iteration an axis represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IterKind {
    /// A regular data-parallel axis.
    Iteration,
    /// A size-one axis that stands for a yet-unknown real extent.
    Broadcast,
    /// An axis folded away by a reduction.
    Reduction,
}

/// Hardware binding of an axis.
///
/// `Serial` is the default. The six thread/block kinds are the ones the
/// parallel dimension map tracks; `Vectorize` and `Unroll` only matter for
/// inlining legality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParallelType {
    Serial,
    Vectorize,
    Unroll,
    BIDx,
    BIDy,
    BIDz,
    TIDx,
    TIDy,
    TIDz,
}

/// The three block (CTA-local) thread dimensions, in canonical x->y->z order.
pub const PARALLEL_TYPE_TIDS: [ParallelType; 3] = [ParallelType::TIDx, ParallelType::TIDy, ParallelType::TIDz];

/// All six hardware dimensions, block dims first.
pub const PARALLEL_TYPE_THREADS: [ParallelType; 6] = [
    ParallelType::BIDx,
    ParallelType::BIDy,
    ParallelType::BIDz,
    ParallelType::TIDx,
    ParallelType::TIDy,
    ParallelType::TIDz,
];

impl ParallelType {
    /// True for the six dimensions bound to hardware thread/block indices.
    pub fn is_thread_dim(self) -> bool {
        matches!(
            self,
            Self::BIDx | Self::BIDy | Self::BIDz | Self::TIDx | Self::TIDy | Self::TIDz
        )
    }

    /// True for the three block-local thread dimensions.
    pub fn is_tid(self) -> bool {
        matches!(self, Self::TIDx | Self::TIDy | Self::TIDz)
    }

    /// Launch-configuration name of the dimension (`blockDim.x` style).
    pub fn dim_name(self) -> &'static str {
        match self {
            Self::BIDx => "gridDim.x",
            Self::BIDy => "gridDim.y",
            Self::BIDz => "gridDim.z",
            Self::TIDx => "blockDim.x",
            Self::TIDy => "blockDim.y",
            Self::TIDz => "blockDim.z",
            _ => "serial",
        }
    }
}

impl fmt::Display for ParallelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Serial => "serial",
            Self::Vectorize => "V",
            Self::Unroll => "UR",
            Self::BIDx => "blockIdx.x",
            Self::BIDy => "blockIdx.y",
            Self::BIDz => "blockIdx.z",
            Self::TIDx => "threadIdx.x",
            Self::TIDy => "threadIdx.y",
            Self::TIDz => "threadIdx.z",
        };
        f.write_str(s)
    }
}

/// Strictness of the axis equivalence oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MappingMode {
    /// Provably identical extent and identity; broadcast axes never map to
    /// concrete axes.
    Exact,
    /// Broader structural correspondence; broadcast-to-concrete pairs map.
    Permissive,
}

/// Circular buffering configuration of a tensor.
///
/// Only the warp-specialized variant influences the analyses in this layer;
/// the plain pipelined variant is carried so schedulers can round-trip it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CircularBufferType {
    Pipelined { stages: u32 },
    WarpSpecialized {
        /// Hardware dimension used to select the specialized warp role.
        on: ParallelType,
        /// `(compute, load)` register counts; `Some` requests register
        /// sharing and triggers the 128-thread padding rule.
        num_registers: Option<(u32, u32)>,
    },
}
