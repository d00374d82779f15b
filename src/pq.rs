use std::fmt;

use crate::error::QueueError;

/// Array-backed binary min-heap ordered by a caller-supplied "less-than".
///
/// Every non-root element compares greater than or equal to its parent.
/// The comparator must define a strict weak ordering. Equal elements come
/// out in no particular order.
pub struct OrderedQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    items: Vec<T>,
    less: F,
}

impl<T, F> OrderedQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    pub fn new(less: F) -> Self {
        Self::with_capacity(0, less)
    }

    pub fn with_capacity(capacity: usize, less: F) -> Self {
        OrderedQueue {
            items: Vec::with_capacity(capacity),
            less,
        }
    }

    /// Insert an item, O(log n)
    pub fn insert(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Borrow the minimum without removing it
    pub fn peek_min(&self) -> Result<&T, QueueError> {
        self.items.first().ok_or(QueueError::Empty)
    }

    /// Remove and return the minimum, O(log n)
    pub fn remove_min(&mut self) -> Result<T, QueueError> {
        if self.items.is_empty() {
            return Err(QueueError::Empty);
        }
        let min = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Ok(min)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take every item out, leaving the queue empty. Order is unspecified.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !(self.less)(&self.items[idx], &self.items[parent]) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && (self.less)(&self.items[left], &self.items[smallest]) {
                smallest = left;
            }
            if right < len && (self.less)(&self.items[right], &self.items[smallest]) {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.items.swap(idx, smallest);
            idx = smallest;
        }
    }
}

impl<T, F> fmt::Debug for OrderedQueue<T, F>
where
    T: fmt::Debug,
    F: Fn(&T, &T) -> bool,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedQueue")
            .field("len", &self.items.len())
            .field("min", &self.items.first())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_heap() -> OrderedQueue<u32, fn(&u32, &u32) -> bool> {
        OrderedQueue::new(|a, b| a < b)
    }

    #[test]
    fn test_empty_queue_errors() {
        let mut queue = min_heap();
        assert_eq!(queue.peek_min(), Err(QueueError::Empty));
        assert_eq!(queue.remove_min(), Err(QueueError::Empty));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_min_yields_sorted_sequence() {
        let mut queue = min_heap();
        for v in [42, 7, 19, 3, 88, 7, 0, 56, 23, 11] {
            queue.insert(v);
        }
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.peek_min(), Ok(&0));

        let mut out = Vec::new();
        while let Ok(v) = queue.remove_min() {
            out.push(v);
        }
        assert_eq!(out, vec![0, 3, 7, 7, 11, 19, 23, 42, 56, 88]);
    }

    #[test]
    fn test_comparator_controls_order() {
        let mut queue = OrderedQueue::new(|a: &String, b: &String| a.len() > b.len());
        queue.insert("ab".to_string());
        queue.insert("abcd".to_string());
        queue.insert("a".to_string());

        assert_eq!(queue.remove_min().unwrap(), "abcd");
        assert_eq!(queue.remove_min().unwrap(), "ab");
        assert_eq!(queue.remove_min().unwrap(), "a");
    }

    #[test]
    fn test_interleaved_insert_and_remove() {
        let mut queue = min_heap();
        queue.insert(10);
        queue.insert(5);
        assert_eq!(queue.remove_min(), Ok(5));
        queue.insert(1);
        queue.insert(20);
        assert_eq!(queue.peek_min(), Ok(&1));
        assert_eq!(queue.remove_min(), Ok(1));
        assert_eq!(queue.remove_min(), Ok(10));
        assert_eq!(queue.remove_min(), Ok(20));
        assert_eq!(queue.remove_min(), Err(QueueError::Empty));
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = min_heap();
        for v in 0..5 {
            queue.insert(v);
        }
        let mut drained: Vec<u32> = queue.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }
}
