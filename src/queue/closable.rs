//! A bounded FIFO queue with a terminal closed state.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A FIFO queue with one producer role and one consumer role that can be
/// closed.
///
/// Closing wakes every waiter: producers stop waiting for room and get
/// `false`, consumers drain what is left and then get `None` instead of
/// blocking forever.
///
/// A capacity of 0 means unbounded.
///
/// # Examples
///
/// ```rust
/// use streamfan::queue::ClosableQueue;
///
/// # tokio_test::block_on(async {
/// let queue = ClosableQueue::new(2);
/// assert!(queue.put(1).await);
/// queue.close();
///
/// assert!(!queue.put(2).await);
/// assert_eq!(queue.get().await, Some(1));
/// assert_eq!(queue.get().await, None);
/// # });
/// ```
pub struct ClosableQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> ClosableQueue<T> {
    /// Create a queue holding at most `capacity` items (0 = unbounded)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Create a queue without a capacity limit
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Enqueue an item, waiting while the queue is full.
    ///
    /// Returns `false` without enqueuing if the queue is closed, either on
    /// entry or while waiting for room.
    pub async fn put(&self, item: T) -> bool {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return false;
                }
                if !self.full(&inner) {
                    inner.items.push_back(item);
                    drop(inner);
                    self.not_empty.notify_one();
                    return true;
                }
            }

            notified.await;
        }
    }

    /// Dequeue the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark the queue closed and wake all waiters. Idempotent.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// The capacity limit (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.full(&self.inner.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Closed and drained: every further `get` returns `None` immediately
    pub fn is_exhausted(&self) -> bool {
        let inner = self.inner.lock();
        inner.closed && inner.items.is_empty()
    }

    fn full(&self, inner: &Inner<T>) -> bool {
        self.capacity > 0 && inner.items.len() >= self.capacity
    }
}

impl<T> Default for ClosableQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> fmt::Debug for ClosableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ClosableQueue")
            .field("len", &inner.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}
