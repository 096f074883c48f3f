//! Fan-in: merge several sources into one stream of arrivals.
//!
//! Each source is drained by its own background task into a single shared
//! [`ClosableQueue`]. The queue is closed once every task has finished, for
//! whatever reason, and readers see end-of-stream after draining it.
//!
//! Readers of the same [`Mix`] *compete* for items: every item is delivered
//! to exactly one reader, first come first served. Use
//! [`Split`](super::Split) for broadcast.
//!
//! Sources must share an item type. To merge heterogeneous sources, map each
//! one into a common enum first.

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
use crate::queue::ClosableQueue;
use crate::util::telemetry;

/// Configuration for a [`Mix`]
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MixConfig {
    /// Capacity of the shared queue; `None` sizes it to the number of
    /// sources, `Some(0)` makes it unbounded
    pub capacity: Option<usize>,
    /// What to do when a source fails
    pub failure_policy: FailurePolicy,
}

impl MixConfig {
    /// Set the shared queue capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// A failure recorded from one of the mixed sources.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    /// Position of the failed source in the list given to [`Mix::new`]
    pub index: usize,
    pub error: Error,
}

struct MixState<T> {
    /// Sources not yet handed to a task
    pending: Vec<BoxSource<T>>,
    started: bool,
    tasks: Vec<JoinHandle<()>>,
    unfinished: usize,
    readers: usize,
    failures: Vec<SourceFailure>,
}

struct Shared<T> {
    queue: ClosableQueue<T>,
    state: Mutex<MixState<T>>,
    token: CancellationToken,
    handle: Handle,
    policy: FailurePolicy,
}

impl<T: Send + 'static> Shared<T> {
    fn record(&self, index: usize, outcome: Outcome) {
        match outcome {
            Outcome::Exhausted => {
                tracing::debug!(index, "mix source exhausted");
            }
            Outcome::Cancelled => {
                tracing::debug!(index, "mix source cancelled");
                telemetry::task_cancelled("mix");
            }
            Outcome::Failed(error) => {
                tracing::warn!(index, %error, "mix source failed");
                telemetry::source_failed("mix");
                let first = {
                    let mut state = self.state.lock();
                    state.failures.push(SourceFailure { index, error });
                    state.failures.len() == 1
                };
                if first && self.policy == FailurePolicy::Propagate {
                    self.token.cancel();
                }
            }
        }
    }

    /// Called exactly once per source task, however the task ends.
    fn source_finished(&self) {
        let remaining = {
            let mut state = self.state.lock();
            state.unfinished -= 1;
            state.unfinished
        };
        if remaining == 0 {
            tracing::debug!("all mix sources finished, closing queue");
            self.queue.close();
        }
    }

    fn acquire(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.readers += 1;
        if state.started {
            return;
        }
        state.started = true;

        let sources = std::mem::take(&mut state.pending);
        tracing::debug!(sources = sources.len(), "starting mix");
        for (index, source) in sources.into_iter().enumerate() {
            let task = forward(Arc::clone(self), index, source)
                .instrument(tracing::debug_span!("mix_source", index));
            state.tasks.push(self.handle.spawn(task));
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 && state.started && !self.token.is_cancelled() {
            tracing::debug!("last mix reader released, cancelling sources");
            self.token.cancel();
        }
    }

    fn fatal(&self) -> Option<Error> {
        if self.policy != FailurePolicy::Propagate {
            return None;
        }
        self.state.lock().failures.first().map(|f| f.error.clone())
    }
}

/// Decrements the unfinished count when a source task ends, including by
/// abort.
struct FinishGuard<T: Send + 'static>(Arc<Shared<T>>);

impl<T: Send + 'static> Drop for FinishGuard<T> {
    fn drop(&mut self) {
        self.0.source_finished();
    }
}

async fn forward<T: Send + 'static>(shared: Arc<Shared<T>>, index: usize, mut source: BoxSource<T>) {
    let _guard = FinishGuard(Arc::clone(&shared));

    let outcome = tokio::select! {
        biased;
        _ = shared.token.cancelled() => Outcome::Cancelled,
        result = AssertUnwindSafe(pump(&mut source, &shared.queue)).catch_unwind() => {
            Outcome::from_pump(result)
        }
    };
    shared.record(index, outcome);
}

async fn pump<T: Send + 'static>(source: &mut BoxSource<T>, queue: &ClosableQueue<T>) -> Result<()> {
    while let Some(item) = source.next().await? {
        if !queue.put(item).await {
            break;
        }
        tracing::trace!("item forwarded");
        telemetry::item_forwarded("mix");
    }
    Ok(())
}

/// Fan-in over several sources.
///
/// Nothing runs until the first [`Mix::reader`] call. From then on the source
/// tasks run until they finish or until the last reader is dropped, which
/// cancels them. Sources are never restarted: once a mix has been drained or
/// cancelled, new readers get whatever is left in the queue and then
/// end-of-stream.
///
/// # Examples
///
/// ```rust
/// use streamfan::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mix = Mix::new(
///         &tokio::runtime::Handle::current(),
///         vec![
///             VecSource::new(vec![1, 2, 3]).boxed(),
///             VecSource::new(vec![10, 20]).boxed(),
///         ],
///     )?;
///
///     let mut items = mix.reader().collect().await?;
///     items.sort();
///     assert_eq!(items, vec![1, 2, 3, 10, 20]);
///     Ok(())
/// }
/// ```
pub struct Mix<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Mix<T> {
    /// Mix at least two sources, spawning their tasks on `handle`
    pub fn new(handle: &Handle, sources: Vec<BoxSource<T>>) -> Result<Self> {
        Self::with_config(handle, sources, MixConfig::default())
    }

    /// Mix with an explicit configuration
    pub fn with_config(
        handle: &Handle,
        sources: Vec<BoxSource<T>>,
        config: MixConfig,
    ) -> Result<Self> {
        if sources.len() < 2 {
            return Err(Error::TooFewSources {
                given: sources.len(),
            });
        }
        Ok(Self::build(handle, sources, config))
    }

    pub(crate) fn from_pair(handle: &Handle, first: BoxSource<T>, second: BoxSource<T>) -> Self {
        Self::build(handle, vec![first, second], MixConfig::default())
    }

    fn build(handle: &Handle, sources: Vec<BoxSource<T>>, config: MixConfig) -> Self {
        let capacity = config.capacity.unwrap_or(sources.len());
        let unfinished = sources.len();
        Self {
            shared: Arc::new(Shared {
                queue: ClosableQueue::new(capacity),
                state: Mutex::new(MixState {
                    pending: sources,
                    started: false,
                    tasks: Vec::with_capacity(unfinished),
                    unfinished,
                    readers: 0,
                    failures: Vec::new(),
                }),
                token: CancellationToken::new(),
                handle: handle.clone(),
                policy: config.failure_policy,
            }),
        }
    }

    /// Acquire a reader, starting the source tasks on first use
    pub fn reader(&self) -> MixReader<T> {
        self.shared.acquire();
        MixReader {
            shared: Arc::clone(&self.shared),
            reported: false,
        }
    }

    /// Number of live readers
    pub fn readers(&self) -> usize {
        self.shared.state.lock().readers
    }

    /// Whether the source tasks have been spawned
    pub fn is_started(&self) -> bool {
        self.shared.state.lock().started
    }

    /// Number of source tasks that have not completed yet
    pub fn active_tasks(&self) -> usize {
        self.shared
            .state
            .lock()
            .tasks
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Whether every source has finished and the queue is closed
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Every failure recorded so far, in the order they happened
    pub fn failures(&self) -> Vec<SourceFailure> {
        self.shared.state.lock().failures.clone()
    }
}

impl<T> Clone for Mix<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Mix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Mix")
            .field("started", &state.started)
            .field("unfinished", &state.unfinished)
            .field("readers", &state.readers)
            .field("queue", &self.shared.queue)
            .finish()
    }
}

/// Mix sources on `handle` with the default configuration
pub fn mix<T: Send + 'static>(handle: &Handle, sources: Vec<BoxSource<T>>) -> Result<Mix<T>> {
    Mix::new(handle, sources)
}

/// A competing reader of a [`Mix`].
///
/// Dropping the last reader cancels the source tasks.
pub struct MixReader<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    reported: bool,
}

#[async_trait]
impl<T: Send + 'static> Source for MixReader<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>> {
        if let Some(item) = self.shared.queue.get().await {
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

impl<T: Send + 'static> Drop for MixReader<T> {
    fn drop(&mut self) {
        self.shared.release();
    }
}
