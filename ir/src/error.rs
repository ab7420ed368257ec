use snafu::Snafu;

use crate::types::{AxisId, TensorId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Loop-domain position outside the tensor's rank.
    #[snafu(display("position {pos} is outside the valid range [0, {ndims}] of {tensor}"))]
    PositionOutOfRange { tensor: TensorId, pos: i64, ndims: usize },

    /// Tensor operation constructed with mismatched operand ranks.
    #[snafu(display("rank mismatch: {lhs} has rank {lhs_rank}, {rhs} has rank {rhs_rank}"))]
    RankMismatch { lhs: TensorId, lhs_rank: usize, rhs: TensorId, rhs_rank: usize },

    /// Flag vector length does not match the domain it describes.
    #[snafu(display("flag count mismatch for {tensor}: {flags} flags for a rank-{rank} domain"))]
    FlagCountMismatch { tensor: TensorId, flags: usize, rank: usize },

    /// Reduction axis index outside the tensor's logical rank.
    #[snafu(display("reduction axis {axis} is invalid for {tensor} with rank {rank}"))]
    ReduceAxisInvalid { tensor: TensorId, axis: usize, rank: usize },

    /// Pairwise domain map requested for tensors without a producer/consumer
    /// edge.
    #[snafu(display("{producer} is not a producer of {consumer}"))]
    NotProducerConsumer { producer: TensorId, consumer: TensorId },

    /// Scheduling transform applied to a reduction or broadcast axis where it
    /// is not defined.
    #[snafu(display("axis {axis} cannot be transformed: {reason}"))]
    IllegalAxisTransform { axis: AxisId, reason: &'static str },
}
