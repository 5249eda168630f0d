//! Arrays whose state is the fold of an incremental change log.

use std::mem;
use std::rc::Rc;

use crate::error::{fatal, AdaptiveError};
use crate::list::AList;
use crate::node::Node;
use crate::runtime::Adaptive;

/// One edit of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Change<E> {
    /// Insert `element` so that it ends up at index `at`.
    Insert {
        /// The inserted element.
        element: E,
        /// Index of the element after insertion; may equal the length.
        at: usize,
    },
    /// Remove the element at index `at`.
    Remove {
        /// Index of the removed element.
        at: usize,
    },
    /// Push an element onto the end.
    Append(E),
}

impl<E: Clone> Change<E> {
    /// Apply this change to `elements` in place.
    pub fn apply(&self, elements: &mut Vec<E>) -> Result<(), AdaptiveError> {
        let len = elements.len();
        match self {
            Change::Insert { element, at } if *at <= len => elements.insert(*at, element.clone()),
            Change::Remove { at } if *at < len => {
                elements.remove(*at);
            }
            Change::Insert { at, .. } | Change::Remove { at } => {
                return Err(AdaptiveError::ChangeOutOfBounds { index: *at, len })
            }
            Change::Append(element) => elements.push(element.clone()),
        }
        Ok(())
    }
}

/// The history of an array: its initial contents and every change since.
///
/// Histories are persistent. Each step shares its predecessor through `Rc`, and
/// the resulting contents are memoized in the step.
#[derive(Debug, Clone)]
pub enum ArrayHistory<E> {
    /// The contents before any change.
    Initial(Rc<Vec<E>>),
    /// `change` applied on top of `previous`, giving `latest`.
    Changed {
        /// History before this change.
        previous: Rc<ArrayHistory<E>>,
        /// The change that was applied.
        change: Change<E>,
        /// Contents after the change.
        latest: Rc<Vec<E>>,
    },
}

impl<E> ArrayHistory<E> {
    /// Start a history from `elements`.
    pub fn initial(elements: Vec<E>) -> Self {
        ArrayHistory::Initial(Rc::new(elements))
    }

    /// The current contents.
    pub fn latest(&self) -> &[E] {
        match self {
            ArrayHistory::Initial(elements) => elements.as_slice(),
            ArrayHistory::Changed { latest, .. } => latest.as_slice(),
        }
    }

    /// Number of changes applied since the initial contents.
    pub fn len_changes(&self) -> usize {
        let mut count = 0;
        let mut current = self;
        while let ArrayHistory::Changed { previous, .. } = current {
            count += 1;
            current = previous;
        }
        count
    }
}

impl<E: Clone> ArrayHistory<E> {
    /// Every change in the order it was applied.
    pub fn changes(&self) -> Vec<Change<E>> {
        let mut changes = Vec::new();
        let mut current = self;
        while let ArrayHistory::Changed {
            previous, change, ..
        } = current
        {
            changes.push(change.clone());
            current = previous;
        }
        changes.reverse();
        changes
    }

    /// The history extended by `change`.
    pub fn push(&self, change: Change<E>) -> Result<Self, AdaptiveError> {
        let mut latest = self.latest().to_vec();
        change.apply(&mut latest)?;
        Ok(ArrayHistory::Changed {
            previous: Rc::new(self.clone()),
            change,
            latest: Rc::new(latest),
        })
    }
}

impl<E: PartialEq> PartialEq for ArrayHistory<E> {
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        loop {
            match (a, b) {
                (ArrayHistory::Initial(a), ArrayHistory::Initial(b)) => return a == b,
                (
                    ArrayHistory::Changed {
                        previous: previous_a,
                        change: change_a,
                        latest: latest_a,
                    },
                    ArrayHistory::Changed {
                        previous: previous_b,
                        change: change_b,
                        latest: latest_b,
                    },
                ) => {
                    if latest_a != latest_b || change_a != change_b {
                        return false;
                    }
                    if Rc::ptr_eq(previous_a, previous_b) {
                        return true;
                    }
                    a = previous_a.as_ref();
                    b = previous_b.as_ref();
                }
                _ => return false,
            }
        }
    }
}

impl<E: Eq> Eq for ArrayHistory<E> {}

impl<E> Drop for ArrayHistory<E> {
    // Unlink the chain iteratively; the derived drop recurses once per change.
    fn drop(&mut self) {
        let ArrayHistory::Changed { previous, .. } = self else {
            return;
        };
        if Rc::strong_count(previous) > 1 {
            return;
        }
        let detached = Rc::new(ArrayHistory::Initial(Rc::new(Vec::new())));
        let mut next = mem::replace(previous, detached.clone());
        while let Ok(mut history) = Rc::try_unwrap(next) {
            match &mut history {
                ArrayHistory::Changed { previous, .. } => {
                    next = mem::replace(previous, detached.clone());
                }
                ArrayHistory::Initial(_) => break,
            }
        }
    }
}

/// Appends changes to the log behind an array node.
///
/// Changes become visible in the array node after the next propagation.
pub struct ArrayMutator<E> {
    tail: Node<AList<Change<E>>>,
}

impl<E: PartialEq + 'static> ArrayMutator<E> {
    /// Append `change` to the log.
    pub fn try_apply(&mut self, change: Change<E>) -> Result<(), AdaptiveError> {
        let engine = self.tail.try_adaptive()?;
        let next = engine.value(AList::Empty);
        self.tail.try_write(AList::Cons(change, next.clone()))?;
        self.tail = next;
        Ok(())
    }

    /// Infallible [`try_apply`](Self::try_apply).
    ///
    /// # Panics
    ///
    /// Panics if the engine owning the array has been dropped.
    #[track_caller]
    pub fn apply(&mut self, change: Change<E>) {
        fatal(self.try_apply(change))
    }
}

impl Adaptive {
    /// An array node folding an ever-growing change log over `initial`.
    ///
    /// Returns the node and the mutator that extends the log.
    ///
    /// # Panics
    ///
    /// Propagation panics when a logged `Insert` or `Remove` is out of bounds for
    /// the array it is applied to.
    ///
    /// # Example
    ///
    /// ```
    /// use adaptive::{Adaptive, Change};
    ///
    /// let engine = Adaptive::new();
    /// let (array, mut mutator) = engine.array(vec![1, 2, 3]);
    /// mutator.apply(Change::Append(4));
    /// mutator.apply(Change::Remove { at: 0 });
    /// engine.propagate();
    /// assert_eq!(array.get().latest(), &[2, 3, 4]);
    /// ```
    pub fn array<E>(&self, initial: Vec<E>) -> (Node<ArrayHistory<E>>, ArrayMutator<E>)
    where
        E: Clone + PartialEq + 'static,
    {
        let (changes, tail) = self.from_sequence(Vec::<Change<E>>::new());
        let history = self.reduce(
            &changes,
            ArrayHistory::initial(initial),
            |history: &ArrayHistory<E>, change: &Change<E>| fatal(history.push(change.clone())),
        );
        (history, ArrayMutator { tail })
    }
}
