//! Tracer trait for observing change propagation.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! what the engine does. The default [`NoopTracer`] costs nothing; [`LogTracer`]
//! forwards every event to the `tracing` crate.
//!
//! # Example
//!
//! ```
//! use adaptive::{Adaptive, Tracer, NodeId};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! struct CountReplays(Rc<Cell<usize>>);
//!
//! impl Tracer for CountReplays {
//!     fn on_edge_replayed(&self, _node: NodeId, _start: &adaptive::Timestamp) {
//!         self.0.set(self.0.get() + 1);
//!     }
//! }
//!
//! let replays = Rc::new(Cell::new(0));
//! let engine = Adaptive::builder()
//!     .tracer(CountReplays(replays.clone()))
//!     .build();
//! let input = engine.value(1);
//! input.read(|_| {});
//! input.write(2);
//! engine.propagate();
//! assert_eq!(replays.get(), 1);
//! ```

use crate::node::NodeId;
use crate::timestamp::Timestamp;

/// Why a queued edge was dropped instead of replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// The edge's start was reclaimed by an enclosing re-execution.
    StaleStart,
    /// The node the edge reads has been removed.
    RemovedNode,
}

/// Observer of engine activity.
///
/// All methods have default empty implementations, so you only need to override
/// the events you're interested in.
///
/// The engine is single-threaded, so tracers need not be `Send` or `Sync`.
pub trait Tracer: 'static {
    /// Called when a node slot is allocated.
    #[inline]
    fn on_node_created(&self, _node: NodeId) {}

    /// Called on every write. `changed` is false when the equality predicate short-circuited it.
    #[inline]
    fn on_write(&self, _node: NodeId, _changed: bool) {}

    /// Called when a read finishes and its edge is attached to the node.
    #[inline]
    fn on_edge_recorded(&self, _node: NodeId, _start: &Timestamp, _end: &Timestamp) {}

    /// Called when a write schedules one of the node's edges for replay.
    #[inline]
    fn on_edge_enqueued(&self, _node: NodeId, _start: &Timestamp) {}

    /// Called right before an edge's reader is re-executed.
    #[inline]
    fn on_edge_replayed(&self, _node: NodeId, _start: &Timestamp) {}

    /// Called when a queued edge is dropped without replay.
    #[inline]
    fn on_edge_discarded(&self, _node: NodeId, _start: &Timestamp, _reason: DiscardReason) {}

    /// Called after the timestamps of a stale execution were reclaimed.
    #[inline]
    fn on_range_deleted(&self, _from: &Timestamp, _to: &Timestamp, _removed: usize) {}

    /// Called when a propagation pass begins with `pending` edges queued.
    #[inline]
    fn on_propagate_start(&self, _pending: usize) {}

    /// Called when a propagation pass drains the queue.
    #[inline]
    fn on_propagate_end(&self, _replayed: usize) {}

    /// Called when a node slot is removed.
    #[inline]
    fn on_node_removed(&self, _node: NodeId) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`Adaptive`](crate::Adaptive).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Tracer that emits every event through the `tracing` crate.
///
/// Propagation boundaries are logged at `debug`, per-edge activity at `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn on_node_created(&self, node: NodeId) {
        tracing::trace!(?node, "node created");
    }

    fn on_write(&self, node: NodeId, changed: bool) {
        tracing::trace!(?node, changed, "write");
    }

    fn on_edge_recorded(&self, node: NodeId, start: &Timestamp, end: &Timestamp) {
        tracing::trace!(?node, ?start, ?end, "edge recorded");
    }

    fn on_edge_enqueued(&self, node: NodeId, start: &Timestamp) {
        tracing::trace!(?node, ?start, "edge enqueued");
    }

    fn on_edge_replayed(&self, node: NodeId, start: &Timestamp) {
        tracing::trace!(?node, ?start, "edge replayed");
    }

    fn on_edge_discarded(&self, node: NodeId, start: &Timestamp, reason: DiscardReason) {
        tracing::trace!(?node, ?start, ?reason, "edge discarded");
    }

    fn on_range_deleted(&self, from: &Timestamp, to: &Timestamp, removed: usize) {
        tracing::trace!(?from, ?to, removed, "timeline range deleted");
    }

    fn on_propagate_start(&self, pending: usize) {
        tracing::debug!(pending, "propagation started");
    }

    fn on_propagate_end(&self, replayed: usize) {
        tracing::debug!(replayed, "propagation finished");
    }

    fn on_node_removed(&self, node: NodeId) {
        tracing::debug!(?node, "node removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingTracer {
        writes: Cell<usize>,
        unchanged: Cell<usize>,
    }

    impl Tracer for CountingTracer {
        fn on_write(&self, _node: NodeId, changed: bool) {
            self.writes.set(self.writes.get() + 1);
            if !changed {
                self.unchanged.set(self.unchanged.get() + 1);
            }
        }
    }

    #[test]
    fn test_default_methods_are_noops() {
        let tracer = NoopTracer;
        let origin = Timestamp::origin();
        tracer.on_edge_replayed(NodeId::new(0, 0), &origin);
        tracer.on_propagate_end(0);
    }

    #[test]
    fn test_counting_tracer() {
        let tracer = CountingTracer {
            writes: Cell::new(0),
            unchanged: Cell::new(0),
        };
        tracer.on_write(NodeId::new(1, 0), true);
        tracer.on_write(NodeId::new(1, 0), false);
        assert_eq!(tracer.writes.get(), 2);
        assert_eq!(tracer.unchanged.get(), 1);
    }

    #[test]
    fn test_log_tracer_without_subscriber() {
        let tracer = LogTracer;
        let origin = Timestamp::origin();
        tracer.on_range_deleted(&origin, &origin, 0);
        tracer.on_edge_discarded(NodeId::new(2, 1), &origin, DiscardReason::StaleStart);
    }
}
