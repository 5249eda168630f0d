//! Incremental lists and the combinators over them.
//!
//! An [`AList`] is a cons list whose tail is itself a [`Node`]. Writing to a tail
//! node only invalidates the reads that walked past it, so extending a list at its
//! end replays the suffix of every derived computation and nothing else.

use std::rc::Rc;

use crate::error::{fatal, AdaptiveError};
use crate::node::{Node, NodeId};
use crate::runtime::{Adaptive, Continuation};

/// An incremental cons list.
///
/// Two cells are equal when both are empty, or when their heads are equal and
/// their tails are the same node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AList<A> {
    /// The end of the list.
    Empty,
    /// An element followed by the node holding the rest of the list.
    Cons(A, Node<AList<A>>),
}

impl<A> AList<A> {
    /// Returns true for the end of the list.
    pub fn is_empty(&self) -> bool {
        matches!(self, AList::Empty)
    }

    /// The element of a cons cell.
    pub fn head(&self) -> Option<&A> {
        match self {
            AList::Empty => None,
            AList::Cons(head, _) => Some(head),
        }
    }

    /// The node holding the rest of the list.
    pub fn tail(&self) -> Option<&Node<AList<A>>> {
        match self {
            AList::Empty => None,
            AList::Cons(_, tail) => Some(tail),
        }
    }
}

impl<A: Clone + 'static> Node<AList<A>> {
    /// Walk the list from this node and clone its elements, recording no dependency.
    pub fn try_to_vec(&self) -> Result<Vec<A>, AdaptiveError> {
        let mut elements = Vec::new();
        let mut cell = self.try_get()?;
        while let AList::Cons(head, tail) = cell {
            elements.push(head);
            cell = tail.try_get()?;
        }
        Ok(elements)
    }

    /// Infallible [`try_to_vec`](Self::try_to_vec).
    ///
    /// # Panics
    ///
    /// Panics if a node of the list was removed or never written.
    #[track_caller]
    pub fn to_vec(&self) -> Vec<A> {
        fatal(self.try_to_vec())
    }
}

impl Adaptive {
    /// Build a list holding `sequence` in order.
    ///
    /// Returns the head node and the empty node terminating the list. Writing a
    /// cons cell to the terminating node extends the list.
    ///
    /// # Stack depth
    ///
    /// Cells are allocated in a loop; the length of `sequence` does not grow the stack.
    pub fn from_sequence<A, I>(&self, sequence: I) -> (Node<AList<A>>, Node<AList<A>>)
    where
        A: PartialEq + 'static,
        I: IntoIterator<Item = A>,
    {
        let elements: Vec<A> = sequence.into_iter().collect();
        let tail = self.value(AList::Empty);
        let head = elements
            .into_iter()
            .rev()
            .fold(tail.clone(), |rest, element| {
                self.value(AList::Cons(element, rest))
            });
        (head, tail)
    }

    /// A list holding `transform` applied to every element of `list`.
    ///
    /// Each cell of the result depends on exactly one cell of the source, so a change
    /// to the source replays only the mapping from that cell onwards.
    ///
    /// # Stack depth
    ///
    /// The read of cell `i + 1` nests inside the read of cell `i`, so a list of
    /// length `n` yields `n` nested read spans on the timeline. The engine runs that
    /// chain in a loop rather than by recursion, so the stack used does not depend
    /// on `n`, neither when the list is first mapped nor when a cell is replayed.
    pub fn map<A, B, F>(&self, list: &Node<AList<A>>, transform: F) -> Node<AList<B>>
    where
        A: 'static,
        B: PartialEq + 'static,
        F: Fn(&A) -> B + 'static,
    {
        let source = list.id();
        let transform: Rc<dyn Fn(&A) -> B> = Rc::new(transform);
        self.new_node(move |destination: &Node<AList<B>>| {
            fatal(self.read_node(source, map_step(destination.clone(), transform)))
        })
    }

    /// Fold `list` into a single value, compared with `PartialEq`.
    ///
    /// When a replayed step produces a result equal to the previous one, propagation
    /// stops there.
    ///
    /// # Stack depth
    ///
    /// As with [`map`](Self::map), the `n` reads of a list of length `n` nest on the
    /// timeline but run in a loop, so the stack used does not depend on `n`.
    pub fn reduce<A, R, F>(&self, list: &Node<AList<A>>, initial: R, transform: F) -> Node<R>
    where
        A: 'static,
        R: PartialEq + Clone + 'static,
        F: Fn(&R, &A) -> R + 'static,
    {
        self.reduce_with(|old: &R, new: &R| old == new, list, initial, transform)
    }

    /// [`reduce`](Self::reduce) with a caller-supplied equality on the result.
    pub fn reduce_with<A, R, E, F>(
        &self,
        eq: E,
        list: &Node<AList<A>>,
        initial: R,
        transform: F,
    ) -> Node<R>
    where
        A: 'static,
        R: Clone + 'static,
        E: Fn(&R, &R) -> bool + 'static,
        F: Fn(&R, &A) -> R + 'static,
    {
        let source = list.id();
        self.new_node_with(eq, move |destination: &Node<R>| {
            let fold = Rc::new(Fold {
                destination: destination.id(),
                transform: Box::new(transform),
            });
            fatal(self.read_node(source, reduce_step(fold, initial)))
        })
    }
}

/// Continuation mapping one source cell into `destination`.
fn map_step<A, B>(
    destination: Node<AList<B>>,
    transform: Rc<dyn Fn(&A) -> B>,
) -> Continuation<AList<A>>
where
    A: 'static,
    B: PartialEq + 'static,
{
    Rc::new(move |engine: &Adaptive, cell: &AList<A>| match cell {
        AList::Empty => engine.write_node(destination.id(), AList::<B>::Empty),
        AList::Cons(head, tail) => {
            let rest = engine.new_node(|rest: &Node<AList<B>>| {
                engine.tail_read(tail.id(), map_step(rest.clone(), transform.clone()));
            });
            engine.write_node(destination.id(), AList::Cons(transform(head), rest))
        }
    })
}

/// The parts of a reduction shared by every step.
struct Fold<A, R> {
    destination: NodeId,
    transform: Box<dyn Fn(&R, &A) -> R>,
}

/// Continuation folding one source cell into `accumulated`.
fn reduce_step<A, R>(fold: Rc<Fold<A, R>>, accumulated: R) -> Continuation<AList<A>>
where
    A: 'static,
    R: Clone + 'static,
{
    Rc::new(move |engine: &Adaptive, cell: &AList<A>| match cell {
        AList::Empty => engine.write_node(fold.destination, accumulated.clone()),
        AList::Cons(head, tail) => {
            let next = (fold.transform)(&accumulated, head);
            engine.tail_read(tail.id(), reduce_step(fold.clone(), next));
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alist_equality_uses_tail_identity() {
        let engine = Adaptive::new();
        let tail = engine.value(AList::<i32>::Empty);
        let other = engine.value(AList::<i32>::Empty);
        assert_eq!(AList::<i32>::Empty, AList::Empty);
        assert_eq!(AList::Cons(1, tail.clone()), AList::Cons(1, tail.clone()));
        assert_ne!(AList::Cons(1, tail.clone()), AList::Cons(2, tail.clone()));
        assert_ne!(AList::Cons(1, tail), AList::Cons(1, other));
    }

    #[test]
    fn test_from_sequence_preserves_order() {
        let engine = Adaptive::new();
        let (head, tail) = engine.from_sequence(vec!['a', 'b', 'c']);
        assert_eq!(head.to_vec(), vec!['a', 'b', 'c']);
        assert!(tail.get().is_empty());
    }

    #[test]
    fn test_from_empty_sequence() {
        let engine = Adaptive::new();
        let (head, tail) = engine.from_sequence(Vec::<u8>::new());
        assert_eq!(head, tail);
        assert!(head.to_vec().is_empty());
    }

    #[test]
    fn test_accessors() {
        let engine = Adaptive::new();
        let (head, tail) = engine.from_sequence([9]);
        let cell = head.get();
        assert_eq!(cell.head(), Some(&9));
        assert_eq!(cell.tail(), Some(&tail));
        assert_eq!(tail.get().head(), None);
    }
}
