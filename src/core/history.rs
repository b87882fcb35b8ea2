use std::collections::VecDeque;

pub const DEFAULT_HISTORY_SIZE: usize = 60;
/// One day of one-second samples
pub const MAX_HISTORY_SIZE: usize = 86_400;

/// Circular buffer of recent samples (for sparklines)
///
/// `len() <= capacity()` holds after every operation; the oldest entry is
/// evicted when a push would overflow.
#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> HistoryRing<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    /// A zero capacity is bumped to one so the ring can always hold the latest sample.
    /// Storage grows with use; only the bound is fixed up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, value: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> HistoryRing<T> {
    /// Copy of the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Default for HistoryRing<T> {
    fn default() -> Self {
        Self::new()
    }
}
