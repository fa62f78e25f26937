//! FIFO relay queues between pipeline stages.
//!
//! Each queue has one producing stage and one consuming stage. A waiting
//! side parks on a [`Notify`]; `notify_one` stores a permit when nobody is
//! waiting yet, so a wakeup that races with the check is never lost.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A single-producer, single-consumer FIFO queue.
///
/// Bounded queues suspend the producer while full; unbounded queues never
/// refuse an item and can be emptied with [`clear()`](Self::clear).
pub struct RelayQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> RelayQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Creates a queue with no size limit.
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: None,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Returns the capacity, or `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Appends an item, suspending while the queue is full.
    pub async fn push(&self, item: T) {
        let mut item = item;
        loop {
            match self.try_push(item) {
                Ok(()) => return,
                Err(rejected) => {
                    item = rejected;
                    self.not_full.notified().await;
                }
            }
        }
    }

    /// Appends an item if there is room.
    ///
    /// # Errors
    ///
    /// Returns the item back if the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        {
            let mut items = self.items.lock();
            if self.capacity.is_some_and(|cap| items.len() >= cap) {
                return Err(item);
            }
            items.push_back(item);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, suspending while the queue is empty.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.not_empty.notified().await;
        }
    }

    /// Removes the oldest item if there is one.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Discards every queued item and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut items = self.items.lock();
            let dropped = items.len();
            items.clear();
            dropped
        };
        if dropped > 0 {
            self.not_full.notify_one();
        }
        dropped
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = RelayQueue::unbounded();
        for i in 0..5 {
            queue.push(i).await;
        }
        for i in 0..5 {
            assert_eq!(queue.pop().await, i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bounded_try_push_rejects_when_full() {
        let queue = RelayQueue::bounded(2);
        assert!(queue.try_push(1).is_ok());
        assert!(queue.try_push(2).is_ok());
        assert_eq!(queue.try_push(3), Err(3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let queue: RelayQueue<u8> = RelayQueue::bounded(0);
        assert_eq!(queue.capacity(), Some(1));
    }

    #[tokio::test]
    async fn test_push_suspends_until_space() {
        let queue = Arc::new(RelayQueue::bounded(1));
        queue.push(1).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop().await, 1);
        producer.await.unwrap();
        assert_eq!(queue.pop().await, 2);
    }

    #[tokio::test]
    async fn test_pop_suspends_until_item() {
        let queue = Arc::new(RelayQueue::unbounded());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.push("frame").await;
        assert_eq!(consumer.await.unwrap(), "frame");
    }

    #[tokio::test]
    async fn test_clear_empties_and_counts() {
        let queue = RelayQueue::unbounded();
        for i in 0..4 {
            queue.push(i).await;
        }
        assert_eq!(queue.clear(), 4);
        assert!(queue.is_empty());
        assert!(queue.try_pop().is_none());
        assert_eq!(queue.clear(), 0);
    }

    #[tokio::test]
    async fn test_clear_releases_blocked_producer() {
        let queue = Arc::new(RelayQueue::bounded(1));
        queue.push(1).await;

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.clear();
        producer.await.unwrap();
        assert_eq!(queue.try_pop(), Some(2));
    }

    #[tokio::test]
    async fn test_no_loss_under_slow_consumer() {
        let queue = Arc::new(RelayQueue::bounded(5));

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                for i in 0..50u32 {
                    queue.push(i).await;
                }
            })
        };

        let mut received = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!(queue.len() <= 5);
            received.push(queue.pop().await);
        }
        producer.await.unwrap();

        assert_eq!(received, (0..50).collect::<Vec<_>>());
    }
}
