use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{fatal, AdaptiveError};
use crate::queue::Edge;
use crate::runtime::{Adaptive, Continuation, WeakAdaptive};
use crate::timeline::Timeline;
use crate::timestamp::Timestamp;

/// Identifies a node slot inside the engine's arena.
///
/// Slot keys are re-used after removal, so the generation tells a live node apart
/// from an earlier occupant of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    key: usize,
    generation: u64,
}

impl NodeId {
    pub(crate) fn new(key: usize, generation: u64) -> Self {
        Self { key, generation }
    }

    /// Arena key of the slot.
    pub fn key(&self) -> usize {
        self.key
    }

    /// Generation of the slot at the time this node was allocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// How the next write to a node behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteState {
    /// Never written. The first write stores the value and advances time.
    Uninitialized,
    /// Written at least once. Later writes are compared with the current value.
    Steady {
        /// Cursor position of the last write that changed the value.
        written_at: Timestamp,
    },
}

pub(crate) type EqFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Arena-owned state of one node.
pub(crate) struct Slot {
    pub generation: u64,
    pub value: Option<Rc<dyn Any>>,
    pub state: WriteState,
    pub eq: EqFn,
    /// Reads recorded against this node, in insertion order.
    pub edges: Vec<Edge>,
}

impl Slot {
    pub fn new(generation: u64, eq: EqFn) -> Self {
        Self {
            generation,
            value: None,
            state: WriteState::Uninitialized,
            eq,
            edges: Vec::new(),
        }
    }

    /// Attach a freshly recorded read, replacing the read it supersedes.
    pub fn record_edge(&mut self, edge: Edge, timeline: &Timeline) {
        self.edges
            .retain(|e| e.start != edge.start && timeline.contains(&e.start));
        self.edges.push(edge);
    }

    /// Drop edges whose execution was reclaimed and return the rest.
    pub fn live_edges(&mut self, timeline: &Timeline) -> &[Edge] {
        self.edges.retain(|e| timeline.contains(&e.start));
        &self.edges
    }
}

/// A typed handle to a mutable cell owned by an [`Adaptive`] engine.
///
/// The handle holds no strong reference to the engine, so nodes stored inside
/// values or continuations never keep the engine alive. Clone is cheap.
pub struct Node<A> {
    id: NodeId,
    engine: WeakAdaptive,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Node<A> {
    pub(crate) fn new(id: NodeId, engine: WeakAdaptive) -> Self {
        Self {
            id,
            engine,
            _marker: PhantomData,
        }
    }

    /// The arena identity of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The engine that owns this node, if it is still alive.
    pub fn adaptive(&self) -> Option<Adaptive> {
        self.engine.upgrade()
    }

    pub(crate) fn try_adaptive(&self) -> Result<Adaptive, AdaptiveError> {
        self.engine.upgrade().ok_or(AdaptiveError::EngineDropped)
    }
}

impl<A: 'static> Node<A> {
    /// Subscribe `continuation` to this node's value.
    ///
    /// The continuation runs immediately with the current value and again, in
    /// original execution order, whenever a propagation pass finds that the value
    /// it saw has changed.
    pub fn try_read<F>(&self, continuation: F) -> Result<(), AdaptiveError>
    where
        F: Fn(&A) + 'static,
    {
        let continuation: Continuation<A> = Rc::new(move |_: &Adaptive, value: &A| {
            continuation(value);
            Ok(())
        });
        self.try_adaptive()?.read_node(self.id, continuation)
    }

    /// Infallible [`try_read`](Self::try_read).
    ///
    /// # Panics
    ///
    /// Panics if the node was never written, was removed, or outlived its engine.
    #[track_caller]
    pub fn read<F>(&self, continuation: F)
    where
        F: Fn(&A) + 'static,
    {
        fatal(self.try_read(continuation))
    }

    /// Store `value`, scheduling dependent reads for the next propagation if it differs.
    pub fn try_write(&self, value: A) -> Result<(), AdaptiveError> {
        self.try_adaptive()?.write_node(self.id, value)
    }

    /// Infallible [`try_write`](Self::try_write).
    ///
    /// # Panics
    ///
    /// Panics if the node was removed or outlived its engine.
    #[track_caller]
    pub fn write(&self, value: A) {
        fatal(self.try_write(value))
    }

    /// The current write state.
    pub fn try_state(&self) -> Result<WriteState, AdaptiveError> {
        self.try_adaptive()?.state_of(self.id)
    }
}

impl<A: Clone + 'static> Node<A> {
    /// Clone the current value without recording a dependency.
    pub fn try_get(&self) -> Result<A, AdaptiveError> {
        let value = self.try_adaptive()?.value_of::<A>(self.id)?;
        Ok(A::clone(&value))
    }

    /// Infallible [`try_get`](Self::try_get).
    ///
    /// # Panics
    ///
    /// Panics if the node was never written, was removed, or outlived its engine.
    #[track_caller]
    pub fn get(&self) -> A {
        fatal(self.try_get())
    }
}

impl<A> Clone for Node<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            engine: self.engine.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A> PartialEq for Node<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.engine.ptr_eq(&other.engine)
    }
}

impl<A> Eq for Node<A> {}

impl<A> Hash for Node<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<A> fmt::Debug for Node<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}v{})", self.id.key, self.id.generation)
    }
}
