//! Bounded drop-oldest queue

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Default queue depth per station (~5 hours at one reading per 5 minutes)
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Bounded FIFO for one station's pending items
///
/// Pushing into a full queue evicts the oldest item, favoring freshness
/// over completeness. Single consumer.
pub struct StationQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    available: Notify,
    closed: AtomicBool,
    overflowed: AtomicU64,
}

impl<T> StationQueue<T> {
    /// Create a queue; capacity is at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            closed: AtomicBool::new(false),
            overflowed: AtomicU64::new(0),
        }
    }

    /// Enqueue an item, returning the evicted oldest item if the queue was full
    pub fn push(&self, item: T) -> Option<T> {
        let dropped = {
            let mut items = self.lock();
            let dropped = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            dropped
        };
        if dropped.is_some() {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
        dropped
    }

    /// Take the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait for the next item; `None` once closed and drained
    pub async fn pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.available.notified().await;
        }
    }

    /// Stop accepting waits; queued items can still be popped
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items evicted so far
    pub fn overflow_count(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = StationQueue::new(4);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = StationQueue::new(2);
        assert_eq!(queue.push("a"), None);
        assert_eq!(queue.push("b"), None);
        assert_eq!(queue.push("c"), Some("a"));
        assert_eq!(queue.overflow_count(), 1);
        assert_eq!(queue.try_pop(), Some("b"));
        assert_eq!(queue.try_pop(), Some("c"));
        assert_eq!(queue.try_pop(), None);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(StationQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(42);
        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = StationQueue::new(4);
        queue.push(1);
        queue.close();
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, None);
    }

    proptest! {
        #[test]
        fn prop_keeps_newest_within_capacity(
            capacity in 1usize..16,
            items in proptest::collection::vec(any::<u32>(), 0..64),
        ) {
            let queue = StationQueue::new(capacity);
            for item in &items {
                queue.push(*item);
                prop_assert!(queue.len() <= capacity);
            }

            let expected_drops = items.len().saturating_sub(capacity);
            prop_assert_eq!(queue.overflow_count(), expected_drops as u64);

            let remaining: Vec<u32> = std::iter::from_fn(|| queue.try_pop()).collect();
            prop_assert_eq!(remaining, items[expected_drops..].to_vec());
        }
    }
}
