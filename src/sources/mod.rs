//! Source implementations for the streamfan library.
//!
//! These are the leaf producers that feed the combinators: in-memory
//! sequences, repeated values, delayed sources and adapters for anything
//! that already implements [`Stream`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::{Stream, StreamExt};

use crate::core::{Result, Source};

/// A source that yields items from a vector
pub struct VecSource<T> {
    items: VecDeque<T>,
}

impl<T> VecSource<T> {
    /// Create a new vector source
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Add more items to the source
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Check if the source has more items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the number of remaining items
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl<T: Send + 'static> Source for VecSource<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.items.pop_front())
    }
}

/// A source that yields items from any iterator, such as a range
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    pub fn new<II: IntoIterator<IntoIter = I>>(iter: II) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

#[async_trait]
impl<I> Source for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.iter.next())
    }
}

/// A source that repeats a single value
pub struct RepeatSource<T> {
    value: T,
    remaining: Option<usize>,
}

impl<T: Clone> RepeatSource<T> {
    /// Create a source that repeats a value indefinitely
    pub fn new(value: T) -> Self {
        Self {
            value,
            remaining: None,
        }
    }

    /// Create a source that repeats a value n times
    pub fn times(value: T, count: usize) -> Self {
        Self {
            value,
            remaining: Some(count),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Source for RepeatSource<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        if let Some(ref mut rem) = self.remaining {
            if *rem == 0 {
                return Ok(None);
            }
            *rem -= 1;
        }
        // An endless source must still give its siblings a turn.
        tokio::task::yield_now().await;
        Ok(Some(self.value.clone()))
    }
}

/// A source that waits a fixed delay before pulling each item
pub struct DelaySource<S> {
    inner: S,
    delay: Duration,
}

impl<S> DelaySource<S> {
    /// Create a new delayed source
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<S: Source> Source for DelaySource<S> {
    type Item = S::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            sleep(self.delay).await;
        }
        self.inner.next().await
    }
}

/// A source backed by a [`Stream`]
pub struct StreamSource<St> {
    stream: St,
}

impl<St> StreamSource<St> {
    pub fn new(stream: St) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<St> Source for StreamSource<St>
where
    St: Stream + Unpin + Send,
    St::Item: Send + 'static,
{
    type Item = St::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.stream.next().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vec_source() {
        let mut source = VecSource::new(vec![1, 2]);
        source.push(3);
        assert_eq!(source.len(), 3);

        assert_eq!(source.collect().await.unwrap(), vec![1, 2, 3]);
        assert!(source.is_empty());
        assert_eq!(source.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_iter_source_from_range() {
        let mut source = IterSource::new(0..5);
        assert_eq!(source.next().await.unwrap(), Some(0));
        assert_eq!(source.collect().await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(source.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_repeat_source() {
        let mut source = RepeatSource::times("hello", 3);
        assert_eq!(
            source.collect().await.unwrap(),
            vec!["hello", "hello", "hello"]
        );

        let mut endless = RepeatSource::new(7);
        for _ in 0..4 {
            assert_eq!(endless.next().await.unwrap(), Some(7));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_source_waits_before_each_item() {
        let start = tokio::time::Instant::now();
        let mut source =
            DelaySource::new(VecSource::new(vec!['a', 'b']), Duration::from_millis(50));

        assert_eq!(source.next().await.unwrap(), Some('a'));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(source.next().await.unwrap(), Some('b'));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_stream_source() {
        let mut source = StreamSource::new(tokio_stream::iter(vec![1, 2, 3]));
        assert_eq!(source.collect().await.unwrap(), vec![1, 2, 3]);
    }
}
