//! Doubly linked sequence stored in a flat arena with permanent indices.
//!
//! Every element keeps the index it was created with.  Merging an element with its
//! successor clears the successor's slot and relinks around it, so surviving indices
//! never shift and a retired index can never be resolved again.

use crate::error::{BytepairError, Result};

/// Link value meaning "no neighbour".
const NONE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: usize,
    next: usize,
}

/// Sequence whose elements can be fused pairwise in `O(1)` without renumbering.
#[derive(Debug, Clone)]
pub struct LinkedArray<T> {
    slots: Vec<Option<Node<T>>>,
    head: usize,
    len: usize,
}

impl<T> Default for LinkedArray<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            head: NONE,
            len: 0,
        }
    }
}

impl<T> LinkedArray<T> {
    /// Creates an empty sequence; populate it with [`LinkedArray::fill`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one element per value with indices `0..n` and links them in order.
    ///
    /// Only valid once, on an empty sequence.
    pub fn fill<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        if !self.slots.is_empty() {
            return Err(BytepairError::AlreadyFilled);
        }
        self.slots = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                Some(Node {
                    value,
                    prev: if index == 0 { NONE } else { index - 1 },
                    next: index + 1,
                })
            })
            .collect();
        if let Some(Some(last)) = self.slots.last_mut() {
            last.next = NONE;
        }
        self.len = self.slots.len();
        self.head = if self.len == 0 { NONE } else { 0 };
        Ok(())
    }

    /// Logical length: the number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no element is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots allocated by [`LinkedArray::fill`], live or retired.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the first live element.
    #[must_use]
    pub fn head(&self) -> Option<usize> {
        (self.head != NONE).then_some(self.head)
    }

    /// Returns true when `index` refers to a live element.
    #[must_use]
    pub fn is_live(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Value stored at `index`.
    pub fn get(&self, index: usize) -> Result<&T> {
        self.node(index).map(|node| &node.value)
    }

    /// Index of the element before `index`.
    pub fn prev_index(&self, index: usize) -> Result<usize> {
        match self.node(index)?.prev {
            NONE => Err(BytepairError::NoPredecessor(index)),
            prev => Ok(prev),
        }
    }

    /// Index of the element after `index`.
    pub fn next_index(&self, index: usize) -> Result<usize> {
        match self.node(index)?.next {
            NONE => Err(BytepairError::NoSuccessor(index)),
            next => Ok(next),
        }
    }

    /// Index of the element two positions after `index`.
    pub fn second_next_index(&self, index: usize) -> Result<usize> {
        let next = self.next_index(index)?;
        match self.node(next)?.next {
            NONE => Err(BytepairError::NoSuccessor(index)),
            after => Ok(after),
        }
    }

    /// Fuses the element at `index` with its successor.
    ///
    /// The element at `index` takes `value`; the successor's slot is cleared and
    /// `index` is linked to what followed the successor.
    pub fn merge_at(&mut self, index: usize, value: T) -> Result<()> {
        let next = self.next_index(index)?;
        let retired = self.slots[next]
            .take()
            .ok_or(BytepairError::RetiredIndex(next))?;
        if retired.next != NONE {
            let after = self.node_mut(retired.next)?;
            after.prev = index;
        }
        let node = self.node_mut(index)?;
        node.value = value;
        node.next = retired.next;
        self.len -= 1;
        Ok(())
    }

    /// Iterates over the live indices from head to tail.
    #[must_use]
    pub fn indices(&self) -> Indices<'_, T> {
        Indices {
            array: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Iterates over the live values from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.indices()
            .filter_map(move |index| self.slots[index].as_ref().map(|node| &node.value))
    }

    fn node(&self, index: usize) -> Result<&Node<T>> {
        match self.slots.get(index) {
            Some(Some(node)) => Ok(node),
            Some(None) => Err(BytepairError::RetiredIndex(index)),
            None => Err(BytepairError::IndexOutOfRange {
                index,
                capacity: self.slots.len(),
            }),
        }
    }

    fn node_mut(&mut self, index: usize) -> Result<&mut Node<T>> {
        let capacity = self.slots.len();
        match self.slots.get_mut(index) {
            Some(Some(node)) => Ok(node),
            Some(None) => Err(BytepairError::RetiredIndex(index)),
            None => Err(BytepairError::IndexOutOfRange { index, capacity }),
        }
    }
}

impl<T: Copy> LinkedArray<T> {
    /// Copy of the value stored at `index`.
    pub fn at(&self, index: usize) -> Result<T> {
        self.get(index).copied()
    }

    /// Collects the live values in order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().copied().collect()
    }
}

/// One-pass walk over the live indices of a [`LinkedArray`].
#[derive(Debug)]
pub struct Indices<'a, T> {
    array: &'a LinkedArray<T>,
    cursor: usize,
    remaining: usize,
}

impl<T> Iterator for Indices<'_, T> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == NONE {
            return None;
        }
        let index = self.cursor;
        self.cursor = match self.array.slots.get(index) {
            Some(Some(node)) => node.next,
            _ => NONE,
        };
        self.remaining = self.remaining.saturating_sub(1);
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(values: &[u32]) -> LinkedArray<u32> {
        let mut array = LinkedArray::new();
        array.fill(values.iter().copied()).expect("fill empty array");
        array
    }

    #[test]
    fn fill_links_neighbours() {
        let array = filled(&[10, 20, 30]);
        assert_eq!(array.len(), 3);
        assert_eq!(array.head(), Some(0));
        assert_eq!(array.next_index(0).unwrap(), 1);
        assert_eq!(array.prev_index(2).unwrap(), 1);
        assert_eq!(array.second_next_index(0).unwrap(), 2);
        assert_eq!(array.to_vec(), vec![10, 20, 30]);
    }

    #[test]
    fn fill_twice_is_rejected() {
        let mut array = filled(&[1]);
        assert!(matches!(
            array.fill([2, 3]),
            Err(BytepairError::AlreadyFilled)
        ));
    }

    #[test]
    fn navigation_off_either_end_fails() {
        let array = filled(&[1, 2]);
        assert!(matches!(
            array.prev_index(0),
            Err(BytepairError::NoPredecessor(0))
        ));
        assert!(matches!(
            array.next_index(1),
            Err(BytepairError::NoSuccessor(1))
        ));
        assert!(matches!(
            array.second_next_index(0),
            Err(BytepairError::NoSuccessor(0))
        ));
        assert!(matches!(
            array.at(5),
            Err(BytepairError::IndexOutOfRange {
                index: 5,
                capacity: 2
            })
        ));
    }

    #[test]
    fn merge_retires_successor_and_keeps_other_indices() {
        let mut array = filled(&[1, 2, 3, 4]);
        array.merge_at(1, 99).unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.to_vec(), vec![1, 99, 4]);
        assert!(matches!(array.at(2), Err(BytepairError::RetiredIndex(2))));
        assert!(!array.is_live(2));
        assert_eq!(array.at(3).unwrap(), 4);
        assert_eq!(array.next_index(1).unwrap(), 3);
        assert_eq!(array.prev_index(3).unwrap(), 1);
        assert_eq!(array.second_next_index(0).unwrap(), 3);
    }

    #[test]
    fn merge_at_tail_fails() {
        let mut array = filled(&[1, 2]);
        array.merge_at(0, 7).unwrap();
        assert!(matches!(
            array.merge_at(0, 8),
            Err(BytepairError::NoSuccessor(0))
        ));
        assert!(matches!(
            array.merge_at(1, 8),
            Err(BytepairError::RetiredIndex(1))
        ));
        assert_eq!(array.to_vec(), vec![7]);
    }

    #[test]
    fn repeated_merges_collapse_to_single_element() {
        let mut array = filled(&[1, 1, 1, 1]);
        array.merge_at(0, 2).unwrap();
        array.merge_at(2, 2).unwrap();
        assert_eq!(array.indices().collect::<Vec<_>>(), vec![0, 2]);
        array.merge_at(0, 3).unwrap();
        assert_eq!(array.to_vec(), vec![3]);
        assert_eq!(array.len(), 1);
        assert_eq!(array.capacity(), 4);
    }

    #[test]
    fn empty_array_iterates_nothing() {
        let array = filled(&[]);
        assert!(array.is_empty());
        assert_eq!(array.head(), None);
        assert_eq!(array.iter().count(), 0);
    }
}
