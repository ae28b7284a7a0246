//! Error type for control-domain operations.
//!
//! Nothing on the render path returns these. A node that sees bad input
//! during a quantum writes silence instead.

use thiserror::Error;

use crate::node::NodeId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// `maxDelayTime` must lie strictly between 0 and 180 seconds.
    #[error("maximum delay time {0}s is out of range (must be > 0 and < 180)")]
    DelayTimeOutOfRange(f64),

    /// Analysis windows must hold an even number of samples, at least two.
    #[error("window size {0} is invalid (must be even and at least 2)")]
    InvalidWindowSize(usize),

    /// The id does not refer to a node in this graph (it may have been removed).
    #[error("no node with id {0:?} in the graph")]
    InvalidNode(NodeId),

    /// The node is a source, or all of its inputs are taken.
    #[error("node {0:?} has no free input")]
    InputUnavailable(NodeId),

    #[error("nodes are already connected")]
    AlreadyConnected,

    #[error("nodes are not connected")]
    NotConnected,

    /// Feedback loops need explicit delay compensation, which the graph does not do.
    #[error("connection would create a cycle")]
    CycleDetected,

    /// The destination and the internal render root can't be removed.
    #[error("node {0:?} is owned by the context and cannot be removed")]
    ProtectedNode(NodeId),
}
