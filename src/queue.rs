//! Recorded reads and the queue of reads awaiting replay.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::AdaptiveError;
use crate::node::NodeId;
use crate::runtime::Adaptive;
use crate::timestamp::Timestamp;

/// Re-executes one recorded read against the engine that owns it, given the
/// span it was recorded with.
pub(crate) type Reader = Rc<dyn Fn(&Adaptive, &Timestamp, &Timestamp) -> Result<(), AdaptiveError>>;

/// A recorded dependency: the execution between `start` and `end` read `node`.
#[derive(Clone)]
pub(crate) struct Edge {
    pub node: NodeId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub reader: Reader,
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("node", &self.node)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish_non_exhaustive()
    }
}

/// Edges waiting for replay, ordered strictly by `start`.
///
/// Every read allocates its own start, so two queued edges with the same start are
/// the same read scheduled twice; the later one replaces the earlier.
#[derive(Debug, Default)]
pub(crate) struct EdgeQueue {
    pending: BTreeMap<Timestamp, Edge>,
}

impl EdgeQueue {
    pub fn push(&mut self, edge: Edge) {
        self.pending.insert(edge.start.clone(), edge);
    }

    /// Remove the edge with the smallest start.
    pub fn pop(&mut self) -> Option<Edge> {
        self.pending.pop_first().map(|(_, edge)| edge)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Timeline;

    fn edge(node: usize, start: &Timestamp, end: &Timestamp) -> Edge {
        Edge {
            node: NodeId::new(node, 0),
            start: start.clone(),
            end: end.clone(),
            reader: Rc::new(|_, _, _| Ok(())),
        }
    }

    #[test]
    fn test_pops_in_start_order() {
        let mut timeline = Timeline::default();
        let a = timeline.insert_after(&timeline.origin()).unwrap();
        let c = timeline.insert_after(&a).unwrap();
        let b = timeline.insert_after(&a).unwrap();

        let mut queue = EdgeQueue::default();
        queue.push(edge(3, &c, &c));
        queue.push(edge(1, &a, &c));
        queue.push(edge(2, &b, &c));

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.node.key())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_same_start_is_scheduled_once() {
        let mut timeline = Timeline::default();
        let a = timeline.insert_after(&timeline.origin()).unwrap();
        let b = timeline.insert_after(&a).unwrap();

        let mut queue = EdgeQueue::default();
        queue.push(edge(1, &a, &b));
        queue.push(edge(1, &a, &b));
        assert_eq!(queue.len(), 1);
    }
}
