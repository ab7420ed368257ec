use snafu::Snafu;

use kiln_ir::{AxisId, ParallelType, TensorId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Loop position outside the tensor's valid range.
    #[snafu(display("position {pos} is outside the valid range [0, {ndims}] of {tensor}"))]
    PositionOutOfRange { tensor: TensorId, pos: i64, ndims: usize },

    /// Internal invariant: a producer broadcast axis was reached before its
    /// origin was recorded. The graph is malformed.
    #[snafu(display("broadcast origin not found for axis {axis} of producer {producer}"))]
    MissingBroadcastOrigin { axis: AxisId, producer: TensorId },

    /// Requested inline position exceeds what producers/consumers can honor.
    #[snafu(display("cannot inline {tensor} at position {pos}: maximum allowed is {max_pos}"))]
    InlinePositionTooDeep { tensor: TensorId, pos: usize, max_pos: usize },

    /// Warp padding requested while nothing is bound to threadIdx.x.
    #[snafu(display("warp padding requested but no axis is bound to threadIdx.x"))]
    WarpPaddingUnboundTidx,

    /// Register sharing requires contiguous groups of 128 threads.
    #[snafu(display("illegal register sharing on {on}: {threads} threads is not a multiple of 128"))]
    RegisterSharingMisaligned { on: ParallelType, threads: i64 },

    /// Register sharing on a dimension whose extent is not a compile-time
    /// constant; the 128-thread rule cannot be checked.
    #[snafu(display("register sharing on {on} requires a constant extent for {dim}"))]
    RegisterSharingDynamicDim { on: ParallelType, dim: ParallelType },

    /// Register sharing requested on a non-thread dimension.
    #[snafu(display("unsupported dimension for register sharing: {on}"))]
    RegisterSharingUnsupported { on: ParallelType },

    /// Padding amount queried for a dimension that is not warp specialized
    /// (or does not carry the register-sharing pad).
    #[snafu(display("{dim} carries no warp-specialization padding"))]
    NotWarpSpecialized { dim: ParallelType },
}
