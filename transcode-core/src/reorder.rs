//! Bounded timestamp reordering.
//!
//! Some decode paths deliver pictures in the right order but with their
//! timestamps scrambled (`2 3 1 5 6 4` instead of `1 2 3 4 5 6`). A
//! [`ReorderQueue`] corrects this with a fixed-capacity delay ring of pictures
//! and a min-heap of their timestamps: when a new picture arrives, the oldest
//! picture in the ring leaves with the smallest pending timestamp.
//!
//! The correction is exact whenever no timestamp arrives more than
//! `capacity - 1` positions after its place in presentation order. Larger
//! disorder is not corrected, but never corrupts the structure.
//!
//! ```
//! use transcode_core::reorder::ReorderQueue;
//!
//! let mut queue: ReorderQueue<i64, &str> = ReorderQueue::new(4);
//! let mut out = Vec::new();
//! for (pts, pic) in [(2, "a"), (3, "b"), (1, "c"), (5, "d"), (6, "e"), (4, "f")] {
//!     out.extend(queue.push(pts, pic));
//! }
//! out.extend(queue.flush());
//! let pts: Vec<i64> = out.iter().map(|(pts, _)| *pts).collect();
//! assert_eq!(pts, vec![1, 2, 3, 4, 5, 6]);
//! // pictures keep their arrival order
//! assert_eq!(out[0].1, "a");
//! ```

use serde::{Deserialize, Serialize};

/// Default capacity; larger than the reorder distance of any known decoder.
pub const DEFAULT_REORDER_CAPACITY: usize = 8;

/// Reorder engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderConfig {
    /// Delay ring and heap capacity.
    pub capacity: usize,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_REORDER_CAPACITY,
        }
    }
}

impl ReorderConfig {
    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.capacity < 2 || !self.capacity.is_power_of_two() {
            return Err(crate::Error::Config(format!(
                "reorder capacity must be a power of two >= 2, got {}",
                self.capacity
            )));
        }
        Ok(())
    }
}

/// A binary min-heap with a fixed capacity.
///
/// Pushing onto a full heap is a caller error and panics.
#[derive(Debug, Clone)]
pub struct TimestampHeap<K> {
    items: Vec<K>,
    capacity: usize,
}

impl<K: Ord + Copy> TimestampHeap<K> {
    /// Create an empty heap.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "heap capacity must be non-zero");
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a value.
    ///
    /// # Panics
    ///
    /// Panics if the heap already holds `capacity` values.
    pub fn push(&mut self, value: K) {
        assert!(
            self.items.len() < self.capacity,
            "timestamp heap overflow (capacity {})",
            self.capacity
        );

        // Open a hole at the bottom and move parents down until the value fits.
        self.items.push(value);
        let mut child = self.items.len() - 1;
        while child > 0 {
            let parent = (child - 1) / 2;
            if self.items[parent] <= value {
                break;
            }
            self.items[child] = self.items[parent];
            child = parent;
        }
        self.items[child] = value;
    }

    /// Remove and return the smallest value.
    pub fn pop(&mut self) -> Option<K> {
        let last = self.items.pop()?;
        if self.items.is_empty() {
            return Some(last);
        }
        let result = self.items[0];

        // Sift the former last element down from the root.
        let len = self.items.len();
        let mut parent = 0;
        loop {
            let mut child = 2 * parent + 1;
            if child >= len {
                break;
            }
            if child + 1 < len && self.items[child + 1] < self.items[child] {
                child += 1;
            }
            if last <= self.items[child] {
                break;
            }
            self.items[parent] = self.items[child];
            parent = child;
        }
        self.items[parent] = last;
        Some(result)
    }

    /// The smallest value without removing it.
    pub fn peek(&self) -> Option<K> {
        self.items.first().copied()
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the heap is at capacity.
    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    /// Maximum number of values.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every value.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Delay ring + timestamp heap kept in lock-step.
///
/// Every occupied ring slot has exactly one timestamp on the heap. Items
/// leave in arrival order, each paired with the smallest pending timestamp.
#[derive(Debug)]
pub struct ReorderQueue<K, T> {
    heap: TimestampHeap<K>,
    delay: Vec<Option<T>>,
    /// Items ever pushed; the ring index of the next arrival.
    pushed: u64,
    occupied: usize,
}

impl<K: Ord + Copy, T> ReorderQueue<K, T> {
    /// Create a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: TimestampHeap::with_capacity(capacity),
            delay: (0..capacity).map(|_| None).collect(),
            pushed: 0,
            occupied: 0,
        }
    }

    /// Create a queue from a validated configuration.
    pub fn from_config(config: &ReorderConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self::new(config.capacity))
    }

    /// Capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.delay.len()
    }

    /// Number of items waiting in the ring.
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Items pushed so far. Also the sequence number the next push receives.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Whether the ring has filled up at least once.
    pub fn is_primed(&self) -> bool {
        self.pushed >= self.delay.len() as u64
    }

    /// Insert an item with its (possibly scrambled) timestamp.
    ///
    /// If the item's ring slot is occupied, the previous occupant is
    /// released together with the smallest pending timestamp.
    pub fn push(&mut self, key: K, item: T) -> Option<(K, T)> {
        let slot = (self.pushed % self.delay.len() as u64) as usize;
        let released = self.release(slot);

        self.delay[slot] = Some(item);
        self.occupied += 1;
        self.heap.push(key);
        self.pushed += 1;
        self.check_lockstep();
        released
    }

    /// Release every remaining item, oldest first.
    pub fn flush(&mut self) -> Vec<(K, T)> {
        let capacity = self.delay.len() as u64;
        let oldest = self.pushed.wrapping_sub(self.occupied as u64) % capacity;
        let mut out = Vec::with_capacity(self.occupied);
        for i in 0..capacity {
            let slot = ((oldest + i) % capacity) as usize;
            if let Some(released) = self.release(slot) {
                out.push(released);
            }
        }
        assert!(self.heap.is_empty(), "timestamp heap not drained by flush");
        out
    }

    /// Discard every waiting item (seek / discontinuity).
    pub fn clear(&mut self) {
        self.delay.iter_mut().for_each(|slot| *slot = None);
        self.heap.clear();
        self.occupied = 0;
    }

    fn release(&mut self, slot: usize) -> Option<(K, T)> {
        let item = self.delay[slot].take()?;
        self.occupied -= 1;
        match self.heap.pop() {
            Some(key) => Some((key, item)),
            None => panic!("reorder heap empty while delay slot {slot} is occupied"),
        }
    }

    fn check_lockstep(&self) {
        assert_eq!(
            self.heap.len(),
            self.occupied,
            "timestamp heap and delay ring out of step"
        );
    }
}
