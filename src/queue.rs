use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A blocking, bounded FIFO queue shared between producer and consumer
/// threads. `push` blocks while the queue already holds more than
/// `capacity` items, and `pop` blocks while the queue is empty — the same
/// off-by-one behaviour as the original `BlockingQueue` (an item is only
/// ever rejected once the queue is strictly over capacity, so the true
/// headroom is `capacity + 1`).
///
/// End-of-stream is signalled by pushing `None`; consumers treat a
/// received `None` as "this producer is done" and stop popping.
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<Option<T>>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::new()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Blocks while the queue is over capacity, then appends `item`.
    pub fn push(&self, item: Option<T>) {
        let mut q = self.inner.lock().unwrap();
        while q.len() > self.capacity {
            q = self.not_full.wait(q).unwrap();
        }
        q.push_back(item);
        self.not_empty.notify_one();
    }

    /// Blocks while the queue is empty, then pops the front item.
    pub fn pop(&self) -> Option<T> {
        let mut q = self.inner.lock().unwrap();
        while q.is_empty() {
            q = self.not_empty.wait(q).unwrap();
        }
        let item = q.pop_front().unwrap();
        self.not_full.notify_one();
        item
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_is_preserved() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.push(Some(1));
        q.push(Some(2));
        q.push(Some(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    fn none_sentinel_round_trips() {
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.push(Some(1));
        q.push(None);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_tolerates_one_over_capacity_then_blocks() {
        // capacity N allows N+1 items to sit in the queue without a waiting
        // pusher being unblocked by a pop.
        let q: BoundedQueue<i32> = BoundedQueue::new(2);
        q.push(Some(1));
        q.push(Some(2));
        q.push(Some(3)); // len() == 3 == capacity + 1, still allowed.
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn blocked_push_wakes_up_after_pop() {
        let q = Arc::new(BoundedQueue::new(1));
        let q2 = Arc::clone(&q);
        q.push(Some(1));
        q.push(Some(2)); // fills to capacity + 1

        let handle = thread::spawn(move || {
            q2.push(Some(3));
        });

        // Give the spawned push a moment to block on a full queue.
        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        handle.join().unwrap();
        assert_eq!(q.len(), 2);
    }
}
