//! Utility functions and helper types.

use async_trait::async_trait;
use futures_core::Stream;
use std::future::Future;

use crate::core::{Result, Source};

/// Helper function to create a simple source from a function
///
/// The closure is called once per pull; `Ok(None)` ends the source.
pub fn from_fn<F, Fut, T>(f: F) -> FnSource<F, Fut, T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Option<T>>> + Send,
    T: Send + 'static,
{
    FnSource {
        f,
        done: false,
        _phantom: std::marker::PhantomData,
    }
}

/// A source created from a function
pub struct FnSource<F, Fut, T> {
    f: F,
    done: bool,
    _phantom: std::marker::PhantomData<fn() -> (Fut, T)>,
}

#[async_trait]
impl<F, Fut, T> Source for FnSource<F, Fut, T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Option<T>>> + Send,
    T: Send + 'static,
{
    type Item = T;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        if self.done {
            return Ok(None);
        }
        let item = (self.f)().await?;
        if item.is_none() {
            self.done = true;
        }
        Ok(item)
    }
}

/// Turn a source into a [`Stream`] of results.
///
/// The stream ends after the source returns `Ok(None)` or after the first
/// error has been yielded.
pub fn into_stream<S>(source: S) -> impl Stream<Item = Result<S::Item>> + Send
where
    S: Source + 'static,
{
    futures::stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        match source.next().await {
            Ok(Some(item)) => Some((Ok(item), Some(source))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Counters emitted by the combinators.
///
/// These compile to nothing unless the `metrics` feature is enabled.
pub(crate) mod telemetry {
    #[allow(unused_variables)]
    pub(crate) fn item_forwarded(combinator: &'static str) {
        #[cfg(feature = "metrics")]
        metrics::counter!("streamfan_items_forwarded_total", "combinator" => combinator)
            .increment(1);
    }

    #[allow(unused_variables)]
    pub(crate) fn source_failed(combinator: &'static str) {
        #[cfg(feature = "metrics")]
        metrics::counter!("streamfan_source_failures_total", "combinator" => combinator)
            .increment(1);
    }

    #[allow(unused_variables)]
    pub(crate) fn task_cancelled(combinator: &'static str) {
        #[cfg(feature = "metrics")]
        metrics::counter!("streamfan_tasks_cancelled_total", "combinator" => combinator)
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::sources::VecSource;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_from_fn_stops_after_none() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut source = from_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n < 3).then_some(n)) }
        });

        assert_eq!(source.collect().await.unwrap(), vec![0, 1, 2]);
        assert_eq!(source.next().await.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let stream = into_stream(VecSource::new(vec!["a", "b"]));
        let items: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_into_stream_ends_after_error() {
        let mut n = 0;
        let source = from_fn(move || {
            n += 1;
            let current = n;
            async move {
                if current == 2 {
                    Err(Error::custom("boom"))
                } else {
                    Ok(Some(current))
                }
            }
        });

        let results: Vec<_> = into_stream(source).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(results[1].is_err());
    }
}
