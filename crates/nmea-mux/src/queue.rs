//! Bounded drop-oldest queues
//!
//! Every queue in the multiplexer (the shared ingest queue and each sink's
//! outbound queue) is a [`BoundedQueue`]. Producers never block: when the
//! queue is full the oldest entry is evicted to make room for the newest.
//! The single consumer waits with a timeout so it can still service timers
//! and shutdown between frames.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use nmea_protocol::Frame;
use tokio::sync::Notify;
use tracing::warn;

/// Queue of sentences flowing between channels and the dispatcher
pub type FrameQueue = BoundedQueue<Frame>;

/// Result of a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// Item queued without eviction
    Queued,
    /// Queue was full; the returned oldest item was evicted
    Evicted(T),
    /// Queue is closed; the item was discarded
    Closed,
}

/// Fixed-capacity FIFO with drop-oldest overflow
///
/// Storage is a lock-free [`ArrayQueue`]; [`Notify`] only wakes a consumer
/// parked in [`pop_timeout`](Self::pop_timeout).
#[derive(Debug)]
pub struct BoundedQueue<T> {
    name: String,
    items: ArrayQueue<T>,
    closed: AtomicBool,
    dropped: AtomicU64,
    available: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue; `capacity` is clamped to at least 1
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            items: ArrayQueue::new(capacity.max(1)),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            available: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of items evicted by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueue without blocking, evicting the oldest item if full
    pub fn push(&self, item: T) -> PushOutcome<T> {
        if self.is_closed() {
            return PushOutcome::Closed;
        }

        let outcome = match self.items.force_push(item) {
            Some(old) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "{}: queue full ({}), dropping oldest frame ({} dropped so far)",
                    self.name,
                    self.items.capacity(),
                    dropped
                );
                PushOutcome::Evicted(old)
            }
            None => PushOutcome::Queued,
        };

        self.available.notify_one();
        outcome
    }

    /// Dequeue without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.items.pop()
    }

    /// Dequeue, waiting up to `timeout` for an item
    ///
    /// Returns `None` on timeout, or immediately once the queue is closed
    /// and drained.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a push in between still wakes us
            let notified = self.available.notified();
            if let Some(item) = self.items.pop() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Close the queue: pending items are discarded and later pushes rejected
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        while self.items.pop().is_some() {}
        self.available.notify_waiters();
        self.available.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new("test", 4);
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_overflow_drops_exactly_the_oldest() {
        let queue = BoundedQueue::new("test", 3);
        for i in 0..3 {
            assert_eq!(queue.push(i), PushOutcome::Queued);
        }

        assert_eq!(queue.push(3), PushOutcome::Evicted(0));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);

        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let queue = BoundedQueue::new("test", 0);
        assert_eq!(queue.capacity(), 1);
        queue.push('a');
        assert_eq!(queue.push('b'), PushOutcome::Evicted('a'));
        assert_eq!(queue.try_pop(), Some('b'));
    }

    #[test]
    fn test_closed_queue_rejects_pushes() {
        let queue = BoundedQueue::new("test", 2);
        queue.push(1);
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.is_empty());
        assert_eq!(queue.push(2), PushOutcome::Closed);
    }

    #[test]
    fn test_concurrent_producers_account_for_every_item() {
        let queue = Arc::new(BoundedQueue::new("test", 16));

        let producers: Vec<_> = (0..4u32)
            .map(|p| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(p * 1000 + i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(queue.len(), 16);
        assert_eq!(queue.dropped(), 1000 - 16);
    }

    #[tokio::test]
    async fn test_pop_timeout_returns_none_when_idle() {
        let queue: BoundedQueue<u8> = BoundedQueue::new("test", 2);
        let start = tokio::time::Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(BoundedQueue::new("test", 2));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(42);

        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue: Arc<BoundedQueue<u8>> = Arc::new(BoundedQueue::new("test", 2));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pushes_before_wait_are_not_lost() {
        let queue = BoundedQueue::new("test", 8);
        queue.push(1);
        queue.push(2);

        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, Some(1));
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, Some(2));
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, None);
    }

    proptest! {
        #[test]
        fn prop_length_never_exceeds_capacity(
            capacity in 1usize..32,
            items in proptest::collection::vec(any::<u16>(), 0..200),
        ) {
            let queue = BoundedQueue::new("prop", capacity);
            for item in &items {
                queue.push(*item);
                prop_assert!(queue.len() <= capacity);
            }

            // The survivors are exactly the newest `capacity` items, in order
            let keep = items.len().min(capacity);
            let expected: Vec<u16> = items[items.len() - keep..].to_vec();
            let drained: Vec<u16> = std::iter::from_fn(|| queue.try_pop()).collect();
            prop_assert_eq!(drained, expected);
            prop_assert_eq!(queue.dropped(), (items.len() - keep) as u64);
        }
    }
}
