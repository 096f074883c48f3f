//! Fan-out: broadcast one source to any number of readers.
//!
//! A single background task pulls from the source and appends to a shared
//! [`MultiConsumerQueue`]. Every reader is a consumer of that queue with its
//! own read position, so every reader sees every item produced after it
//! joined. The window capacity bounds how far the fastest reader may run
//! ahead of the slowest one.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{FailurePolicy, Outcome};
use crate::core::{BoxSource, Error, Result, Source};
use crate::queue::{Consumer, MultiConsumerQueue};
use crate::util::telemetry;

/// Configuration for a [`Split`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SplitConfig {
    /// Size of the shared window; must be at least 1
    pub capacity: usize,
    /// What to do when the source fails
    pub failure_policy: FailurePolicy,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            failure_policy: FailurePolicy::Propagate,
        }
    }
}

impl SplitConfig {
    /// Set the shared window capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// The source together with the item a cancelled task was about to publish.
struct Feed<T> {
    source: BoxSource<T>,
    pending: Option<T>,
    done: bool,
}

#[derive(Default)]
struct SplitState {
    readers: usize,
    task: Option<JoinHandle<()>>,
    token: Option<CancellationToken>,
    starts: usize,
    exhausted: bool,
    failure: Option<Error>,
}

struct Shared<T> {
    queue: Arc<MultiConsumerQueue<T>>,
    feed: tokio::sync::Mutex<Feed<T>>,
    state: Mutex<SplitState>,
    handle: Handle,
    policy: FailurePolicy,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn acquire(self: &Arc<Self>) -> Consumer<T> {
        let consumer = self.queue.consumer();

        let mut state = self.state.lock();
        state.readers += 1;
        let idle = state.token.as_ref().map_or(true, |t| t.is_cancelled());
        if idle && !state.exhausted {
            let token = CancellationToken::new();
            state.starts += 1;
            tracing::debug!(start = state.starts, "starting split task");
            let task = forward(Arc::clone(self), token.clone())
                .instrument(tracing::debug_span!("split_source", start = state.starts));
            state.task = Some(self.handle.spawn(task));
            state.token = Some(token);
        }
        consumer
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers > 0 {
            return;
        }
        if let Some(token) = state.token.as_ref().filter(|t| !t.is_cancelled()) {
            tracing::debug!("last split reader released, cancelling task");
            token.cancel();
        }
    }

    /// Mark the source as done for good and close the queue.
    fn finish(&self, failure: Option<Error>) {
        {
            let mut state = self.state.lock();
            state.exhausted = true;
            if state.failure.is_none() {
                state.failure = failure;
            }
        }
        self.queue.close();
    }

    fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Exhausted => {
                tracing::debug!("split source exhausted");
                self.finish(None);
            }
            Outcome::Cancelled => {
                tracing::debug!("split task cancelled");
                telemetry::task_cancelled("split");
            }
            Outcome::Failed(error) => {
                tracing::warn!(%error, "split source failed");
                telemetry::source_failed("split");
                self.finish(Some(error));
            }
        }
    }

    fn fatal(&self) -> Option<Error> {
        if self.policy != FailurePolicy::Propagate {
            return None;
        }
        self.state.lock().failure.clone()
    }
}

/// Closes the queue if the task is aborted before reaching an outcome.
struct ExitGuard<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
    clean: bool,
}

impl<T: Clone + Send + 'static> Drop for ExitGuard<T> {
    fn drop(&mut self) {
        if !self.clean {
            tracing::warn!("split task ended abnormally, closing queue");
            self.shared.finish(None);
        }
    }
}

async fn forward<T: Clone + Send + 'static>(shared: Arc<Shared<T>>, token: CancellationToken) {
    let mut guard = ExitGuard {
        shared: Arc::clone(&shared),
        clean: false,
    };

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::Cancelled,
        result = AssertUnwindSafe(pump(&shared)).catch_unwind() => Outcome::from_pump(result),
    };
    shared.record(outcome);
    guard.clean = true;
}

async fn pump<T: Clone + Send + 'static>(shared: &Shared<T>) -> Result<()> {
    // A previous, cancelled task may still hold the feed.
    let mut feed = shared.feed.lock().await;

    loop {
        if feed.done {
            return Ok(());
        }
        let item = match feed.pending.take() {
            Some(item) => item,
            None => match feed.source.next().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    feed.done = true;
                    return Ok(());
                }
                Err(error) => {
                    feed.done = true;
                    return Err(error);
                }
            },
        };

        feed.pending = Some(item.clone());
        if !shared.queue.put(item).await {
            return Ok(());
        }
        feed.pending = None;
        tracing::trace!("item broadcast");
        telemetry::item_forwarded("split");
    }
}

/// Fan-out over a single source.
///
/// The background task starts when the first reader is acquired and is
/// cancelled when the last reader is dropped. A later reader resumes the
/// source where the cancelled task stopped: an item already pulled and
/// waiting for room is kept, but a pull interrupted inside the source's own
/// `next` is dropped with its future, so resumption is lossless only for
/// cancel-safe sources. Once the source is exhausted, has failed or has
/// panicked, new readers drain what is left in the window and end.
///
/// # Examples
///
/// ```rust
/// use streamfan::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let split = Split::new(
///         &tokio::runtime::Handle::current(),
///         VecSource::new(vec!["a", "b", "c"]).boxed(),
///     );
///     let (mut left, mut right) = split.split_pair();
///
///     let (l, r) = tokio::join!(left.collect(), right.collect());
///     assert_eq!(l?, vec!["a", "b", "c"]);
///     assert_eq!(r?, vec!["a", "b", "c"]);
///     Ok(())
/// }
/// ```
pub struct Split<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Split<T> {
    /// Split `source` with a window of one item, spawning on `handle`
    pub fn new(handle: &Handle, source: BoxSource<T>) -> Self {
        let config = SplitConfig::default();
        Self::build(
            handle,
            source,
            MultiConsumerQueue::default(),
            config.failure_policy,
        )
    }

    /// Split with an explicit configuration.
    ///
    /// Fails with [`Error::InvalidCapacity`] if the capacity is 0.
    pub fn with_config(handle: &Handle, source: BoxSource<T>, config: SplitConfig) -> Result<Self> {
        let queue = MultiConsumerQueue::new(config.capacity)?;
        Ok(Self::build(handle, source, queue, config.failure_policy))
    }

    fn build(
        handle: &Handle,
        source: BoxSource<T>,
        queue: MultiConsumerQueue<T>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Arc::new(queue),
                feed: tokio::sync::Mutex::new(Feed {
                    source,
                    pending: None,
                    done: false,
                }),
                state: Mutex::new(SplitState::default()),
                handle: handle.clone(),
                policy,
            }),
        }
    }

    /// Register a new reader, starting the background task if needed
    pub fn reader(&self) -> SplitReader<T> {
        SplitReader {
            consumer: Some(self.shared.acquire()),
            shared: Arc::clone(&self.shared),
            reported: false,
        }
    }

    /// Two readers registered back to back, so both see the same items
    pub fn split_pair(&self) -> (SplitReader<T>, SplitReader<T>) {
        (self.reader(), self.reader())
    }

    /// Number of live readers
    pub fn readers(&self) -> usize {
        self.shared.state.lock().readers
    }

    /// Whether a background task is currently running
    pub fn is_running(&self) -> bool {
        self.shared
            .state
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Whether the source has ended, normally or by failing
    pub fn is_exhausted(&self) -> bool {
        self.shared.state.lock().exhausted
    }

    /// Number of items held in the shared window
    pub fn buffer_len(&self) -> usize {
        self.shared.queue.buffer_len()
    }

    /// The failure that ended the source, if any
    pub fn failure(&self) -> Option<Error> {
        self.shared.state.lock().failure.clone()
    }
}

impl<T> Clone for Split<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Split<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Split")
            .field("readers", &state.readers)
            .field("starts", &state.starts)
            .field("exhausted", &state.exhausted)
            .field("queue", &self.shared.queue)
            .finish()
    }
}

/// Split `source` on `handle` with the default configuration
pub fn split<T: Clone + Send + 'static>(handle: &Handle, source: BoxSource<T>) -> Split<T> {
    Split::new(handle, source)
}

/// A broadcast reader of a [`Split`].
///
/// Dropping the handle unregisters its consumer; dropping the last one
/// cancels the background task.
pub struct SplitReader<T: Clone + Send + 'static> {
    consumer: Option<Consumer<T>>,
    shared: Arc<Shared<T>>,
    reported: bool,
}

impl<T: Clone + Send + 'static> SplitReader<T> {
    /// Items buffered for this reader and not read yet
    pub fn backlog(&self) -> usize {
        self.consumer.as_ref().map_or(0, Consumer::len)
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Source for SplitReader<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>> {
        let Some(consumer) = self.consumer.as_mut() else {
            return Ok(None);
        };
        if let Some(item) = consumer.get().await? {
            return Ok(Some(item));
        }
        if !self.reported {
            self.reported = true;
            if let Some(error) = self.shared.fatal() {
                return Err(error);
            }
        }
        Ok(None)
    }
}

impl<T: Clone + Send + 'static> Drop for SplitReader<T> {
    fn drop(&mut self) {
        drop(self.consumer.take());
        self.shared.release();
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for SplitReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitReader")
            .field("consumer", &self.consumer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceExt;
    use crate::sources::{IterSource, VecSource};
    use crate::util::from_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_split_broadcasts_to_both_readers() {
        let split = Split::new(
            &Handle::current(),
            VecSource::new(vec!["a", "b", "c", "d"]).boxed(),
        );
        let (mut left, mut right) = split.split_pair();

        let (l, r) = tokio::join!(left.collect(), right.collect());
        assert_eq!(l.unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(r.unwrap(), vec!["a", "b", "c", "d"]);
        assert!(split.is_exhausted());
    }

    #[tokio::test]
    async fn test_slow_reader_holds_back_fast_reader() {
        let split = Split::with_config(
            &Handle::current(),
            IterSource::new(0..10).boxed(),
            SplitConfig::default().capacity(2),
        )
        .unwrap();
        let (mut fast, mut slow) = split.split_pair();

        assert_eq!(fast.next().await.unwrap(), Some(0));
        assert_eq!(fast.next().await.unwrap(), Some(1));
        wait_until(|| split.buffer_len() == 2).await;

        // The window is full of items `slow` has not read.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(split.buffer_len(), 2);
        assert_eq!(fast.backlog(), 0);
        assert_eq!(slow.backlog(), 2);

        let (s, f) = tokio::join!(slow.collect(), fast.collect());
        assert_eq!(s.unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(f.unwrap(), (2..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_reaches_every_reader_once() {
        let mut n = 0;
        let source = from_fn(move || {
            n += 1;
            let current = n;
            async move {
                if current > 2 {
                    Err(Error::custom("source broke"))
                } else {
                    Ok(Some(current))
                }
            }
        });
        let split = Split::with_config(
            &Handle::current(),
            source.boxed(),
            SplitConfig::default().capacity(4),
        )
        .unwrap();
        let (mut left, mut right) = split.split_pair();

        for reader in [&mut left, &mut right] {
            assert_eq!(reader.next().await.unwrap(), Some(1));
            assert_eq!(reader.next().await.unwrap(), Some(2));
            let err = reader.next().await.unwrap_err();
            assert_eq!(err.to_string(), "source broke");
            assert_eq!(reader.next().await.unwrap(), None);
        }
        assert!(split.is_exhausted());
        assert!(split.failure().is_some());
    }

    #[tokio::test]
    async fn test_panicking_source_reaches_readers_as_error() {
        let mut calls = 0;
        let source = from_fn(move || {
            calls += 1;
            let call = calls;
            async move {
                if call == 1 {
                    Ok(Some(100))
                } else {
                    panic!("sensor exploded")
                }
            }
        });
        let split = Split::new(&Handle::current(), source.boxed());

        let mut reader = split.reader();
        assert_eq!(reader.next().await.unwrap(), Some(100));
        let err = reader.next().await.unwrap_err();
        assert!(err.to_string().contains("source task panicked"));
        assert_eq!(reader.next().await.unwrap(), None);

        assert!(split.is_exhausted());
        assert!(split.failure().is_some());
    }

    #[tokio::test]
    async fn test_log_policy_ends_quietly() {
        let source = VecSource::new(vec![1])
            .chain(from_fn(|| async { Err::<Option<i32>, _>(Error::custom("late")) }));
        let split = Split::with_config(
            &Handle::current(),
            source.boxed(),
            SplitConfig::default().failure_policy(FailurePolicy::Log),
        )
        .unwrap();

        let mut reader = split.reader();
        assert_eq!(reader.collect().await.unwrap(), vec![1]);
        assert_eq!(split.failure().unwrap().to_string(), "late");
    }

    #[tokio::test]
    async fn test_restart_after_cancel_resumes_source() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pulled);
        let source = from_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n < 6).then_some(n)) }
        });
        let split = Split::new(&Handle::current(), source.boxed());

        let mut first = split.reader();
        assert_eq!(first.next().await.unwrap(), Some(0));
        assert_eq!(first.next().await.unwrap(), Some(1));
        drop(first);

        wait_until(|| !split.is_running()).await;
        assert!(!split.is_exhausted());
        assert_eq!(split.readers(), 0);

        // Whatever the cancelled task had pulled is still delivered.
        let mut second = split.reader();
        let rest = second.collect().await.unwrap();
        assert_eq!(rest, (2..6).collect::<Vec<_>>());
        assert_eq!(pulled.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_reader_after_exhaustion_ends_immediately() {
        let split = Split::new(&Handle::current(), VecSource::new(vec![1, 2]).boxed());
        assert_eq!(split.reader().collect().await.unwrap(), vec![1, 2]);
        wait_until(|| !split.is_running()).await;

        let mut late = split.reader();
        assert_eq!(late.next().await.unwrap(), None);
        assert!(!split.is_running());
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let result = Split::with_config(
            &Handle::current(),
            VecSource::new(vec![1]).boxed(),
            SplitConfig::default().capacity(0),
        );
        assert!(matches!(result, Err(Error::InvalidCapacity(0))));
    }

    #[tokio::test]
    async fn test_readers_are_counted() {
        let split = VecSource::new(vec![1]).split(&Handle::current());
        assert_eq!(split.readers(), 0);
        assert!(!split.is_running());

        let a = split.reader();
        let b = split.reader();
        assert_eq!(split.readers(), 2);
        drop(a);
        assert_eq!(split.readers(), 1);
        drop(b);
        assert_eq!(split.readers(), 0);
    }
}
