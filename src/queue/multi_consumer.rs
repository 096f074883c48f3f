//! A shared buffer read by many independently paced consumers.
//!
//! Every consumer owns a read position into one shared window of items. An
//! item stays in the window until the slowest registered consumer has read
//! it, so a stalled consumer bounds memory for everyone; the window capacity
//! then pushes back on the producer instead of dropping items.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::core::{Error, Result};

/// Identifies one consumer of a [`MultiConsumerQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerKey(pub u64);

impl fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Inner<T> {
    buffer: VecDeque<T>,
    /// Absolute index of `buffer[0]`
    head: u64,
    /// Absolute read position per consumer
    offsets: HashMap<ConsumerKey, u64>,
    next_key: u64,
    closed: bool,
}

impl<T> Inner<T> {
    fn tail(&self) -> u64 {
        self.head + self.buffer.len() as u64
    }

    fn offset(&self, key: ConsumerKey) -> Result<u64> {
        self.offsets.get(&key).copied().ok_or(Error::UnknownKey(key))
    }

    /// Register `key` at the start of the current window.
    fn insert_consumer(&mut self, key: ConsumerKey) {
        let head = self.head;
        self.offsets.insert(key, head);
    }

    fn generate_key(&mut self) -> ConsumerKey {
        loop {
            let candidate = ConsumerKey(self.next_key);
            self.next_key += 1;
            if !self.offsets.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Drop the prefix every registered consumer has already read.
    ///
    /// Returns whether anything was removed.
    fn trim(&mut self) -> bool {
        let Some(min) = self.offsets.values().copied().min() else {
            return false;
        };
        let consumed = (min - self.head) as usize;
        if consumed == 0 {
            return false;
        }
        self.buffer.drain(..consumed);
        self.head = min;
        true
    }
}

/// A bounded buffer with many consumers, each seeing every item.
///
/// The queue is full when the shared window holds `capacity` items, no
/// matter how far individual consumers have read. A fast consumer can
/// therefore wait on an empty view while a slow one still has a backlog.
///
/// # Examples
///
/// ```rust
/// use streamfan::queue::MultiConsumerQueue;
///
/// # tokio_test::block_on(async {
/// let queue = MultiConsumerQueue::new(2).unwrap();
/// let a = queue.register(None).unwrap();
/// let b = queue.register(None).unwrap();
///
/// queue.put("x").await;
/// assert_eq!(queue.get(a).await.unwrap(), Some("x"));
/// assert_eq!(queue.buffer_len(), 1); // `b` has not read it yet
/// assert_eq!(queue.get(b).await.unwrap(), Some("x"));
/// assert_eq!(queue.buffer_len(), 0);
/// # });
/// ```
pub struct MultiConsumerQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> MultiConsumerQueue<T> {
    /// Create a queue whose shared window holds at most `capacity` items.
    ///
    /// Fails with [`Error::InvalidCapacity`] for a capacity of 0.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        Ok(Self::with_capacity(capacity))
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(capacity),
                head: 0,
                offsets: HashMap::new(),
                next_key: 0,
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Register a consumer positioned at the start of the current window.
    ///
    /// A key is generated when `key` is `None`. Registering a key twice
    /// fails with [`Error::DuplicateKey`].
    pub fn register(&self, key: Option<ConsumerKey>) -> Result<ConsumerKey> {
        let mut inner = self.inner.lock();
        let key = match key {
            Some(key) => {
                if inner.offsets.contains_key(&key) {
                    return Err(Error::DuplicateKey(key));
                }
                key
            }
            None => inner.generate_key(),
        };
        inner.insert_consumer(key);
        Ok(key)
    }

    /// Remove a consumer and release whatever only it was holding.
    pub fn unregister(&self, key: ConsumerKey) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.offsets.remove(&key).is_none() {
                return Err(Error::UnknownKey(key));
            }
            inner.trim();
        }
        self.not_full.notify_waiters();
        // A reader parked on this key must observe the unregistration.
        self.not_empty.notify_waiters();
        Ok(())
    }

    /// Append an item, waiting while the shared window is full.
    ///
    /// Returns `false` without appending if the queue is closed.
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
                if inner.buffer.len() < self.capacity {
                    inner.buffer.push_back(item);
                    drop(inner);
                    self.not_empty.notify_waiters();
                    return true;
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

    /// Whether the shared window is at capacity
    pub fn is_full(&self) -> bool {
        self.inner.lock().buffer.len() >= self.capacity
    }

    /// Whether `key` has read everything currently in the window
    pub fn is_empty(&self, key: ConsumerKey) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner.offset(key)? >= inner.tail())
    }

    /// Number of items `key` has not read yet
    pub fn len(&self, key: ConsumerKey) -> Result<usize> {
        let inner = self.inner.lock();
        Ok((inner.tail() - inner.offset(key)?) as usize)
    }

    /// Number of items physically held in the shared window
    pub fn buffer_len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of registered consumers
    pub fn consumers(&self) -> usize {
        self.inner.lock().offsets.len()
    }

    /// Absolute read position of `key`, counting every item ever put
    pub fn position(&self, key: ConsumerKey) -> Result<u64> {
        self.inner.lock().offset(key)
    }

    /// Register a consumer wrapped in a handle that unregisters on drop
    pub fn consumer(self: &Arc<Self>) -> Consumer<T> {
        let key = {
            let mut inner = self.inner.lock();
            let key = inner.generate_key();
            inner.insert_consumer(key);
            key
        };
        Consumer {
            queue: Arc::clone(self),
            key,
        }
    }
}

impl<T: Clone> MultiConsumerQueue<T> {
    /// Read the next item for `key`, waiting while it is caught up.
    ///
    /// Returns `Ok(None)` once the queue is closed and `key` has read
    /// everything. Fails with [`Error::UnknownKey`] if `key` is not (or no
    /// longer) registered.
    pub async fn get(&self, key: ConsumerKey) -> Result<Option<T>> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                let offset = inner.offset(key)?;
                if offset < inner.tail() {
                    let item = inner.buffer[(offset - inner.head) as usize].clone();
                    inner.offsets.insert(key, offset + 1);
                    let trimmed = inner.trim();
                    drop(inner);
                    if trimmed {
                        self.not_full.notify_waiters();
                    }
                    return Ok(Some(item));
                }
                if inner.closed {
                    return Ok(None);
                }
            }

            notified.await;
        }
    }
}

impl<T> Default for MultiConsumerQueue<T> {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl<T> fmt::Debug for MultiConsumerQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MultiConsumerQueue")
            .field("buffer_len", &inner.buffer.len())
            .field("capacity", &self.capacity)
            .field("consumers", &inner.offsets.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

/// A registered consumer of a [`MultiConsumerQueue`].
///
/// Dropping the handle unregisters the key and trims the window, so an
/// abandoned consumer never pins old items in memory.
pub struct Consumer<T> {
    queue: Arc<MultiConsumerQueue<T>>,
    key: ConsumerKey,
}

impl<T> Consumer<T> {
    pub fn key(&self) -> ConsumerKey {
        self.key
    }

    /// Number of items this consumer has not read yet
    pub fn len(&self) -> usize {
        self.queue.len(self.key).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty(self.key).unwrap_or(true)
    }

    /// Whether the shared window is full.
    ///
    /// This can be true while [`Consumer::is_empty`] is also true: the window
    /// is held by slower consumers.
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }
}

impl<T: Clone> Consumer<T> {
    /// Read the next item, or `None` once the queue is closed and drained
    pub async fn get(&mut self) -> Result<Option<T>> {
        self.queue.get(self.key).await
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        let _ = self.queue.unregister(self.key);
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("key", &self.key).finish()
    }
}
