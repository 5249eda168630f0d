//! Error types for the adaptive engine.

use crate::node::NodeId;
use crate::timestamp::Timestamp;

/// Precondition violations detected by the engine.
///
/// None of these are recoverable in the sense of retrying: they mean the caller broke
/// an engine invariant. The infallible API (`read`, `write`, `propagate`, ...) panics
/// with the error's message; the `try_*` variants hand it back instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdaptiveError {
    /// A timestamp that is not live on the timeline was used as an anchor.
    #[error("timestamp {0:?} is not live on the timeline")]
    UnknownTimestamp(Timestamp),

    /// `delete_range` was given bounds in the wrong order.
    #[error("invalid timeline range: {from:?} is after {to:?}")]
    InvalidRange {
        /// Lower bound passed by the caller.
        from: Timestamp,
        /// Upper bound passed by the caller.
        to: Timestamp,
    },

    /// A node was read before its first write.
    #[error("node {0:?} was read before it was written")]
    Uninitialized(NodeId),

    /// The node handle refers to a slot that has been removed.
    #[error("node {0:?} has been removed from the engine")]
    StaleNode(NodeId),

    /// The engine that created the node no longer exists.
    #[error("the adaptive engine owning this node has been dropped")]
    EngineDropped,

    /// The stored value does not have the type the handle expects.
    #[error("node {0:?} holds a value of an unexpected type")]
    TypeMismatch(NodeId),

    /// `propagate` was called from inside a re-execution.
    #[error("propagate called while propagation is already running")]
    ReentrantPropagation,

    /// An array change addressed an index outside the array.
    #[error("array change index {index} out of bounds for length {len}")]
    ChangeOutOfBounds {
        /// Index carried by the change.
        index: usize,
        /// Length of the array the change was applied to.
        len: usize,
    },
}

/// Abort on a broken precondition.
#[track_caller]
pub(crate) fn fatal<T>(result: Result<T, AdaptiveError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{}", err),
    }
}
