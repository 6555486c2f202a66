//! Indexed binary max-heap keyed by a mutable value.
//!
//! [`HeapMap`] couples a `Vec` laid out as a binary heap with a key → slot index so any
//! entry can be found, mutated, or removed in `O(log n)`.  Ordering comes from a weight
//! function over the stored value, evaluated on demand, so a value may only be mutated
//! through [`HeapMap::update`], which re-balances afterwards.

use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::error::{BytepairError, Result};

/// Map from unique keys to values with `O(1)` access to the maximum-weight entry.
///
/// Ties between equal weights are resolved by heap position: the entry that reached the
/// root first stays there until something strictly heavier arrives.
pub struct HeapMap<K, V, W> {
    heap: Vec<(K, V)>,
    slots: FxHashMap<K, usize>,
    weight: W,
}

impl<K, V, W> HeapMap<K, V, W>
where
    K: Hash + Eq + Clone + Debug,
    W: Fn(&V) -> usize,
{
    /// Creates an empty map ordered by `weight`.
    pub fn new(weight: W) -> Self {
        Self::with_capacity(0, weight)
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize, weight: W) -> Self {
        let mut slots = FxHashMap::default();
        slots.reserve(capacity);
        Self {
            heap: Vec::with_capacity(capacity),
            slots,
            weight,
        }
    }

    /// Inserts a new entry.
    ///
    /// Fails with [`BytepairError::DuplicateKey`] and leaves the map untouched when the key
    /// is already present.
    pub fn push(&mut self, key: K, value: V) -> Result<()> {
        if self.slots.contains_key(&key) {
            return Err(BytepairError::DuplicateKey(format!("{key:?}")));
        }
        let slot = self.heap.len();
        self.slots.insert(key.clone(), slot);
        self.heap.push((key, value));
        self.sift_up(slot);
        Ok(())
    }

    /// Mutates the value stored under `key` in place and restores heap order.
    ///
    /// Returns whatever `mutator` returns.
    pub fn update<F, R>(&mut self, key: &K, mutator: F) -> Result<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let slot = self.slot_of(key)?;
        let output = mutator(&mut self.heap[slot].1);
        // The weight may have moved either way.
        let slot = self.sift_up(slot);
        self.sift_down(slot);
        Ok(output)
    }

    /// Read-only access to the value stored under `key`.
    pub fn view(&self, key: &K) -> Result<&V> {
        let slot = self.slot_of(key)?;
        Ok(&self.heap[slot].1)
    }

    /// Removes `key` and returns its entry.
    pub fn erase(&mut self, key: &K) -> Result<(K, V)> {
        let slot = self.slot_of(key)?;
        let last = self.heap.len() - 1;
        self.swap(slot, last);
        let entry = self
            .heap
            .pop()
            .ok_or_else(|| BytepairError::Internal("heap emptied during erase".into()))?;
        self.slots.remove(&entry.0);
        if slot < self.heap.len() {
            let slot = self.sift_up(slot);
            self.sift_down(slot);
        }
        Ok(entry)
    }

    /// Returns true when `key` is present.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true when the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The maximum-weight entry, without removing it.
    pub fn max(&self) -> Result<&(K, V)> {
        self.heap.first().ok_or(BytepairError::EmptyQueue)
    }

    /// Weight of the value stored under `key`.
    pub fn weight_of(&self, key: &K) -> Result<usize> {
        self.view(key).map(|value| (self.weight)(value))
    }

    /// Iterates over all entries in heap order (not sorted).
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.heap.iter().map(|(key, value)| (key, value))
    }

    /// Checks that the slot index and the heap array agree and that heap order holds.
    pub fn check_invariants(&self) -> Result<()> {
        if self.slots.len() != self.heap.len() {
            return Err(BytepairError::Internal(format!(
                "heap holds {} entries but index holds {}",
                self.heap.len(),
                self.slots.len()
            )));
        }
        for (slot, (key, value)) in self.heap.iter().enumerate() {
            if self.slots.get(key) != Some(&slot) {
                return Err(BytepairError::Internal(format!(
                    "key {key:?} lives in slot {slot} but is indexed at {:?}",
                    self.slots.get(key)
                )));
            }
            if slot > 0 && (self.weight)(value) > (self.weight)(&self.heap[parent(slot)].1) {
                return Err(BytepairError::Internal(format!(
                    "key {key:?} in slot {slot} outweighs its parent"
                )));
            }
        }
        Ok(())
    }

    fn slot_of(&self, key: &K) -> Result<usize> {
        self.slots
            .get(key)
            .copied()
            .ok_or_else(|| BytepairError::MissingKey(format!("{key:?}")))
    }

    fn weight_at(&self, slot: usize) -> usize {
        (self.weight)(&self.heap[slot].1)
    }

    /// Swaps two slots and re-points both keys at their new positions.
    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        if let Some(slot) = self.slots.get_mut(&self.heap[a].0) {
            *slot = a;
        }
        if let Some(slot) = self.slots.get_mut(&self.heap[b].0) {
            *slot = b;
        }
    }

    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let up = parent(slot);
            if self.weight_at(slot) <= self.weight_at(up) {
                break;
            }
            self.swap(slot, up);
            slot = up;
        }
        slot
    }

    fn sift_down(&mut self, mut slot: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut largest = slot;
            if left < len && self.weight_at(left) > self.weight_at(largest) {
                largest = left;
            }
            if right < len && self.weight_at(right) > self.weight_at(largest) {
                largest = right;
            }
            if largest == slot {
                return slot;
            }
            self.swap(slot, largest);
            slot = largest;
        }
    }
}

impl<K: Debug, V: Debug, W> Debug for HeapMap<K, V, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapMap")
            .field("len", &self.heap.len())
            .field("max", &self.heap.first())
            .finish_non_exhaustive()
    }
}

const fn parent(slot: usize) -> usize {
    (slot - 1) / 2
}
