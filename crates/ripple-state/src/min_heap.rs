use std::collections::BinaryHeap;

/// Trait for elements that have a priority and can be used in a [MinHeap].
pub trait HasPriority {
    type Priority: Ord + std::fmt::Debug;

    /// Return the priority of a given item.
    ///
    /// Must not change while the item is in the heap.
    fn priority(&self) -> Self::Priority;
}

struct PriorityElement<T: HasPriority> {
    priority: T::Priority,
    element: T,
}

impl<T: HasPriority> PriorityElement<T> {
    fn new(element: T) -> Self {
        let priority = element.priority();
        Self { priority, element }
    }
}

impl<T: HasPriority> PartialEq for PriorityElement<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl<T: HasPriority> Eq for PriorityElement<T> {}

impl<T: HasPriority> PartialOrd for PriorityElement<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: HasPriority> Ord for PriorityElement<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.priority.cmp(&self.priority)
    }
}

/// A min-heap over the priority of the elements.
///
/// Elements with equal priority are popped in an unspecified order, so
/// callers that need determinism include a sequence number in the priority.
pub struct MinHeap<T: HasPriority>(BinaryHeap<PriorityElement<T>>);

impl<T: HasPriority> Default for MinHeap<T> {
    fn default() -> Self {
        Self(BinaryHeap::new())
    }
}

impl<T: HasPriority> MinHeap<T> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, element: T) {
        self.0.push(PriorityElement::new(element))
    }

    pub fn pop(&mut self) -> Option<T> {
        self.0.pop().map(|t| {
            debug_assert_eq!(
                t.priority,
                t.element.priority(),
                "Priority changed while element was in heap"
            );
            t.element
        })
    }

    /// Pop the minimum element if `predicate` holds for its priority.
    pub fn pop_if(&mut self, predicate: impl FnOnce(&T::Priority) -> bool) -> Option<T> {
        if self.0.peek().is_some_and(|top| predicate(&top.priority)) {
            self.pop()
        } else {
            None
        }
    }

    pub fn peek(&self) -> Option<&T> {
        self.0.peek().map(|element| &element.element)
    }

    pub fn peek_priority(&self) -> Option<&T::Priority> {
        self.0.peek().map(|element| &element.priority)
    }

    /// Iterate over the elements in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.0.iter().map(|element| &element.element)
    }

    /// Return the elements in priority order.
    pub fn into_sorted_vec(self) -> Vec<T> {
        // `BinaryHeap::into_sorted_vec` is ascending in `Ord`, which is
        // descending in priority.
        let mut sorted: Vec<_> = self
            .0
            .into_sorted_vec()
            .into_iter()
            .map(|element| element.element)
            .collect();
        sorted.reverse();
        sorted
    }
}

impl<T: HasPriority + std::fmt::Debug> std::fmt::Debug for MinHeap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: HasPriority> std::iter::FromIterator<T> for MinHeap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(PriorityElement::new).collect())
    }
}

impl<T> From<Vec<T>> for MinHeap<T>
where
    T: HasPriority,
{
    fn from(input: Vec<T>) -> Self {
        input.into_iter().collect()
    }
}
