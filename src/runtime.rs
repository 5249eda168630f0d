use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use slab::Slab;

use crate::error::{fatal, AdaptiveError};
use crate::node::{EqFn, Node, NodeId, Slot, WriteState};
use crate::queue::{Edge, EdgeQueue, Reader};
use crate::timeline::{Timeline, TimelineConfig};
use crate::timestamp::Timestamp;
use crate::tracer::{DiscardReason, NoopTracer, Tracer};

/// Continuation registered by a read. It is handed the engine running it.
pub(crate) type Continuation<A> = Rc<dyn Fn(&Adaptive, &A) -> Result<(), AdaptiveError>>;

/// A read whose continuation has run but whose span is still open.
struct OpenRead {
    id: NodeId,
    start: Timestamp,
    end: Option<Timestamp>,
    reader: Reader,
}

/// A read issued by a continuation, run after that continuation returns.
type TailRead = Box<dyn FnOnce(&Adaptive) -> Result<OpenRead, AdaptiveError>>;

enum Work {
    Begin(TailRead),
    Close(OpenRead),
}

/// Adaptive is the engine that owns the timeline, the edge queue and every node.
///
/// This is cheap to clone, so you can pass it around by just cloning it. Clones
/// share the same graph.
///
/// # Example
///
/// ```
/// use adaptive::Adaptive;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let engine = Adaptive::new();
/// let input = engine.value(2);
/// let doubled = engine.map_node(&input, |x| x * 2);
///
/// let seen = Rc::new(Cell::new(0));
/// let sink = seen.clone();
/// doubled.read(move |x| sink.set(*x));
/// assert_eq!(seen.get(), 4);
///
/// input.write(5);
/// engine.propagate();
/// assert_eq!(seen.get(), 10);
/// ```
#[derive(Clone)]
pub struct Adaptive {
    inner: Rc<Inner>,
}

/// A non-owning handle to an [`Adaptive`] engine.
///
/// Continuations that need the engine should capture this rather than an
/// `Adaptive`: edges live inside the engine, so a strong handle would keep it alive.
#[derive(Clone, Default)]
pub struct WeakAdaptive {
    inner: Weak<Inner>,
}

impl WeakAdaptive {
    /// Get the engine back if it is still alive.
    pub fn upgrade(&self) -> Option<Adaptive> {
        self.inner.upgrade().map(|inner| Adaptive { inner })
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

struct Inner {
    state: RefCell<State>,
    tracer: Box<dyn Tracer>,
}

struct State {
    timeline: Timeline,
    cursor: Timestamp,
    queue: EdgeQueue,
    nodes: Slab<Slot>,
    next_generation: u64,
    propagating: bool,
    tail_reads: Vec<TailRead>,
}

fn slot_mut(nodes: &mut Slab<Slot>, id: NodeId) -> Result<&mut Slot, AdaptiveError> {
    nodes
        .get_mut(id.key())
        .filter(|slot| slot.generation == id.generation())
        .ok_or(AdaptiveError::StaleNode(id))
}

impl State {
    fn slot(&self, id: NodeId) -> Result<&Slot, AdaptiveError> {
        self.nodes
            .get(id.key())
            .filter(|slot| slot.generation == id.generation())
            .ok_or(AdaptiveError::StaleNode(id))
    }

    /// Move the cursor onto a freshly allocated timestamp.
    fn advance(&mut self) -> Result<Timestamp, AdaptiveError> {
        let next = self.timeline.insert_after(&self.cursor)?;
        self.cursor = next.clone();
        Ok(next)
    }
}

/// Counters describing the engine's current footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Node slots currently held by the arena.
    pub nodes: usize,
    /// Live timestamps, the origin included.
    pub timestamps: usize,
    /// Edges queued for the next propagation.
    pub pending_edges: usize,
}

/// Builder for an [`Adaptive`] engine.
///
/// # Example
///
/// ```
/// use adaptive::{Adaptive, LogTracer, TimelineConfig};
///
/// let engine = Adaptive::builder()
///     .tracer(LogTracer)
///     .timeline(TimelineConfig { tail_stride: 1 << 8 })
///     .build();
/// let node = engine.value("hello");
/// assert_eq!(node.get(), "hello");
/// ```
pub struct AdaptiveBuilder {
    tracer: Box<dyn Tracer>,
    timeline: TimelineConfig,
}

impl Default for AdaptiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tracer: Box::new(NoopTracer),
            timeline: TimelineConfig::default(),
        }
    }

    /// Install a tracer observing every engine event.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Configure timestamp allocation.
    pub fn timeline(mut self, config: TimelineConfig) -> Self {
        self.timeline = config;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Adaptive {
        let timeline = Timeline::new(self.timeline);
        let cursor = timeline.origin();
        Adaptive {
            inner: Rc::new(Inner {
                state: RefCell::new(State {
                    timeline,
                    cursor,
                    queue: EdgeQueue::default(),
                    nodes: Slab::new(),
                    next_generation: 0,
                    propagating: false,
                    tail_reads: Vec::new(),
                }),
                tracer: self.tracer,
            }),
        }
    }
}

impl Default for Adaptive {
    fn default() -> Self {
        Self::new()
    }
}

impl Adaptive {
    /// Create a new engine with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for customizing the engine.
    pub fn builder() -> AdaptiveBuilder {
        AdaptiveBuilder::new()
    }

    /// A handle that does not keep the engine alive.
    pub fn downgrade(&self) -> WeakAdaptive {
        WeakAdaptive {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Create a node compared with `eq`, establishing its value with `initializer`.
    ///
    /// The initializer runs exactly once, before this returns. It is expected to
    /// write the node, usually from inside reads of the node's dependencies.
    pub fn new_node_with<A, E, F>(&self, eq: E, initializer: F) -> Node<A>
    where
        A: 'static,
        E: Fn(&A, &A) -> bool + 'static,
        F: FnOnce(&Node<A>),
    {
        let eq: EqFn = Rc::new(move |old: &dyn Any, new: &dyn Any| {
            match (old.downcast_ref::<A>(), new.downcast_ref::<A>()) {
                (Some(old), Some(new)) => eq(old, new),
                _ => false,
            }
        });
        let id = {
            let mut state = self.inner.state.borrow_mut();
            state.next_generation += 1;
            let generation = state.next_generation;
            NodeId::new(state.nodes.insert(Slot::new(generation, eq)), generation)
        };
        self.inner.tracer.on_node_created(id);
        let node = Node::new(id, self.downgrade());
        initializer(&node);
        node
    }

    /// Create a node compared with `PartialEq`.
    pub fn new_node<A, F>(&self, initializer: F) -> Node<A>
    where
        A: PartialEq + 'static,
        F: FnOnce(&Node<A>),
    {
        self.new_node_with(|old: &A, new: &A| old == new, initializer)
    }

    /// Create an input node holding `value`.
    pub fn value<A: PartialEq + 'static>(&self, value: A) -> Node<A> {
        self.new_node(move |node| node.write(value))
    }

    /// Create a node that always holds `transform` applied to `source`'s value.
    pub fn map_node<A, B, F>(&self, source: &Node<A>, transform: F) -> Node<B>
    where
        A: 'static,
        B: PartialEq + 'static,
        F: Fn(&A) -> B + 'static,
    {
        let source = source.clone();
        self.new_node(move |destination: &Node<B>| {
            let destination = destination.clone();
            source.read(move |value| destination.write(transform(value)));
        })
    }

    /// Replay every read invalidated by the writes since the last pass.
    ///
    /// Edges are replayed in the order their reads originally executed. Before an
    /// edge is replayed, every timestamp its previous execution allocated is
    /// reclaimed, which silently retires the reads nested inside it. The cursor is
    /// left where it was found. Returns the number of replayed edges.
    pub fn try_propagate(&self) -> Result<usize, AdaptiveError> {
        let guard = PropagationGuard::enter(&self.inner)?;
        let pending = self.inner.state.borrow().queue.len();
        self.inner.tracer.on_propagate_start(pending);

        let mut replayed = 0;
        loop {
            let Some(edge) = self.inner.state.borrow_mut().queue.pop() else {
                break;
            };
            let removed = {
                let mut state = self.inner.state.borrow_mut();
                if state.slot(edge.node).is_err() {
                    Err(DiscardReason::RemovedNode)
                } else if !state.timeline.contains(&edge.start) {
                    Err(DiscardReason::StaleStart)
                } else {
                    let removed = state.timeline.delete_range(&edge.start, &edge.end)?;
                    state.cursor = edge.start.clone();
                    Ok(removed)
                }
            };
            match removed {
                Err(reason) => {
                    self.inner
                        .tracer
                        .on_edge_discarded(edge.node, &edge.start, reason);
                }
                Ok(removed) => {
                    self.inner
                        .tracer
                        .on_range_deleted(&edge.start, &edge.end, removed);
                    self.inner.tracer.on_edge_replayed(edge.node, &edge.start);
                    (edge.reader)(self, &edge.start, &edge.end)?;
                    replayed += 1;
                }
            }
        }

        drop(guard);
        self.inner.tracer.on_propagate_end(replayed);
        Ok(replayed)
    }

    /// Infallible [`try_propagate`](Self::try_propagate).
    ///
    /// # Panics
    ///
    /// Panics when called from inside a re-execution, or when a replayed read
    /// breaks an engine precondition.
    #[track_caller]
    pub fn propagate(&self) -> usize {
        fatal(self.try_propagate())
    }

    /// Drop a node from the arena. Returns false if it was already gone.
    ///
    /// Reads of the node still waiting in the queue are discarded when reached.
    pub fn remove<A>(&self, node: &Node<A>) -> bool {
        self.remove_where(node.id(), |_, _| true)
    }

    /// Drop a node only if no live read is recorded against it.
    pub fn remove_if_unused<A>(&self, node: &Node<A>) -> bool {
        self.remove_where(node.id(), |slot, timeline| {
            slot.live_edges(timeline).is_empty()
        })
    }

    fn remove_where(
        &self,
        id: NodeId,
        predicate: impl FnOnce(&mut Slot, &Timeline) -> bool,
    ) -> bool {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let removable = match slot_mut(&mut state.nodes, id) {
                Ok(slot) => predicate(slot, &state.timeline),
                Err(_) => false,
            };
            removable.then(|| state.nodes.remove(id.key()))
        };
        match removed {
            Some(slot) => {
                // Values and continuations may own arbitrary data; drop them unborrowed.
                drop(slot);
                self.inner.tracer.on_node_removed(id);
                true
            }
            None => false,
        }
    }

    /// The current position of execution on the timeline.
    pub fn cursor(&self) -> Timestamp {
        self.inner.state.borrow().cursor.clone()
    }

    /// Returns true while a propagation pass is running.
    pub fn is_propagating(&self) -> bool {
        self.inner.state.borrow().propagating
    }

    /// Current counters.
    pub fn stats(&self) -> Stats {
        let state = self.inner.state.borrow();
        Stats {
            nodes: state.nodes.len(),
            timestamps: state.timeline.len(),
            pending_edges: state.queue.len(),
        }
    }

    pub(crate) fn value_of<A: 'static>(&self, id: NodeId) -> Result<Rc<A>, AdaptiveError> {
        let value = self
            .inner
            .state
            .borrow()
            .slot(id)?
            .value
            .clone()
            .ok_or(AdaptiveError::Uninitialized(id))?;
        value
            .downcast::<A>()
            .map_err(|_| AdaptiveError::TypeMismatch(id))
    }

    pub(crate) fn state_of(&self, id: NodeId) -> Result<WriteState, AdaptiveError> {
        Ok(self.inner.state.borrow().slot(id)?.state.clone())
    }

    pub(crate) fn read_node<A: 'static>(
        &self,
        id: NodeId,
        continuation: Continuation<A>,
    ) -> Result<(), AdaptiveError> {
        let start = self.inner.state.borrow_mut().advance()?;
        self.run_read(id, start, None, continuation)
    }

    /// Issue a read to run once the calling continuation returns.
    ///
    /// The read still nests inside the caller's span, exactly as if it had been the
    /// continuation's last action. Only valid from inside a continuation: the
    /// enclosing [`run_read`](Self::run_read) drains it before returning.
    pub(crate) fn tail_read<A: 'static>(&self, id: NodeId, continuation: Continuation<A>) {
        let tail: TailRead = Box::new(move |engine: &Adaptive| {
            let start = engine.inner.state.borrow_mut().advance()?;
            engine.begin_read(id, start, None, continuation)
        });
        self.inner.state.borrow_mut().tail_reads.push(tail);
    }

    /// Run a read and every tail read it issues, then close their spans innermost first.
    ///
    /// Chains of tail reads run in a loop, so list combinators use constant stack
    /// whatever the length of the list.
    fn run_read<A: 'static>(
        &self,
        id: NodeId,
        start: Timestamp,
        end: Option<Timestamp>,
        continuation: Continuation<A>,
    ) -> Result<(), AdaptiveError> {
        let scope = TailScope::enter(&self.inner);
        let open = self.begin_read(id, start, end, continuation)?;
        let mut work = vec![Work::Close(open)];
        scope.schedule(&mut work);
        while let Some(item) = work.pop() {
            match item {
                Work::Close(open) => self.close_read(open)?,
                Work::Begin(tail) => {
                    let open = tail(self)?;
                    work.push(Work::Close(open));
                    scope.schedule(&mut work);
                }
            }
        }
        Ok(())
    }

    /// Run `continuation` on the node's value and build the reader replaying it.
    fn begin_read<A: 'static>(
        &self,
        id: NodeId,
        start: Timestamp,
        end: Option<Timestamp>,
        continuation: Continuation<A>,
    ) -> Result<OpenRead, AdaptiveError> {
        let value = self.value_of::<A>(id)?;
        continuation(self, &*value)?;
        drop(value);

        let reader: Reader = Rc::new(
            move |engine: &Adaptive, start: &Timestamp, end: &Timestamp| {
                engine.run_read(id, start.clone(), Some(end.clone()), continuation.clone())
            },
        );
        Ok(OpenRead {
            id,
            start,
            end,
            reader,
        })
    }

    /// Record the edge of a finished read.
    ///
    /// A first execution closes its span with a fresh end marker, so every timestamp
    /// allocated by the continuation lies strictly inside `(start, end)`. A replay
    /// keeps the end it was recorded with.
    fn close_read(&self, open: OpenRead) -> Result<(), AdaptiveError> {
        let OpenRead {
            id,
            start,
            end,
            reader,
        } = open;
        let end = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let end = match end {
                Some(end) => {
                    state.cursor = end.clone();
                    end
                }
                None => state.advance()?,
            };
            let edge = Edge {
                node: id,
                start: start.clone(),
                end: end.clone(),
                reader,
            };
            slot_mut(&mut state.nodes, id)?.record_edge(edge, &state.timeline);
            end
        };
        self.inner.tracer.on_edge_recorded(id, &start, &end);
        Ok(())
    }

    pub(crate) fn write_node<A: 'static>(&self, id: NodeId, value: A) -> Result<(), AdaptiveError> {
        let (current, eq) = {
            let state = self.inner.state.borrow();
            let slot = state.slot(id)?;
            match slot.state {
                WriteState::Uninitialized => (None, slot.eq.clone()),
                WriteState::Steady { .. } => (slot.value.clone(), slot.eq.clone()),
            }
        };

        let Some(current) = current else {
            let mut state = self.inner.state.borrow_mut();
            let written_at = state.advance()?;
            let slot = slot_mut(&mut state.nodes, id)?;
            slot.value = Some(Rc::new(value));
            slot.state = WriteState::Steady { written_at };
            drop(state);
            self.inner.tracer.on_write(id, true);
            return Ok(());
        };

        if eq(current.as_ref(), &value) {
            self.inner.tracer.on_write(id, false);
            return Ok(());
        }
        drop(current);

        let (previous, enqueued) = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let written_at = state.cursor.clone();
            let slot = slot_mut(&mut state.nodes, id)?;
            let previous = slot.value.replace(Rc::new(value));
            slot.state = WriteState::Steady { written_at };
            let edges: Vec<Edge> = slot.live_edges(&state.timeline).to_vec();
            let enqueued: Vec<Timestamp> = edges.iter().map(|e| e.start.clone()).collect();
            for edge in edges {
                state.queue.push(edge);
            }
            (previous, enqueued)
        };
        drop(previous);

        self.inner.tracer.on_write(id, true);
        for start in &enqueued {
            self.inner.tracer.on_edge_enqueued(id, start);
        }
        Ok(())
    }
}

/// Marks a propagation pass; restores the cursor however the pass ends.
struct PropagationGuard<'a> {
    inner: &'a Inner,
    saved: Timestamp,
}

impl<'a> PropagationGuard<'a> {
    fn enter(inner: &'a Inner) -> Result<Self, AdaptiveError> {
        let mut state = inner.state.borrow_mut();
        if state.propagating {
            return Err(AdaptiveError::ReentrantPropagation);
        }
        state.propagating = true;
        let saved = state.cursor.clone();
        Ok(Self { inner, saved })
    }
}

impl Drop for PropagationGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            state.cursor = self.saved.clone();
            state.propagating = false;
        }
    }
}

/// Tail reads issued above `base` belong to the innermost running read.
///
/// Dropping the scope discards any that were left behind by an error or a panic.
struct TailScope<'a> {
    inner: &'a Inner,
    base: usize,
}

impl<'a> TailScope<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let base = inner.state.borrow().tail_reads.len();
        Self { inner, base }
    }

    /// Move the pending tail reads onto `work` so the first issued runs first.
    fn schedule(&self, work: &mut Vec<Work>) {
        let issued: Vec<TailRead> = self
            .inner
            .state
            .borrow_mut()
            .tail_reads
            .drain(self.base..)
            .collect();
        work.extend(issued.into_iter().rev().map(Work::Begin));
    }
}

impl Drop for TailScope<'_> {
    fn drop(&mut self) {
        let leftover = match self.inner.state.try_borrow_mut() {
            Ok(mut state) if state.tail_reads.len() > self.base => {
                state.tail_reads.split_off(self.base)
            }
            _ => Vec::new(),
        };
        // Continuations may own arbitrary data; drop them unborrowed.
        drop(leftover);
    }
}
