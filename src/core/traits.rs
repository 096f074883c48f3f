//! Core traits for the fan-in/fan-out system.
//!
//! Everything in the crate speaks one contract: a [`Source`] is a lazy,
//! pull-based sequence of items. Combinators consume sources and hand back
//! readers, which are sources themselves, so stages compose freely.

use std::future::Future;

use async_trait::async_trait;
use tokio::runtime::Handle;

use crate::combinators::mix::Mix;
use crate::combinators::sequential::{Chain, Filter, Map, Take};
use crate::combinators::split::Split;
use crate::core::error::Result;

/// A source yields items on demand.
///
/// `Ok(None)` is the end-of-stream marker. Once a source has returned it,
/// further calls should keep returning `Ok(None)`. An `Err` reports a failure
/// of the underlying producer.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use streamfan::core::{Result, Source};
///
/// struct CounterSource {
///     current: u64,
///     max: u64,
/// }
///
/// #[async_trait]
/// impl Source for CounterSource {
///     type Item = u64;
///
///     async fn next(&mut self) -> Result<Option<Self::Item>> {
///         if self.current < self.max {
///             self.current += 1;
///             Ok(Some(self.current))
///         } else {
///             Ok(None)
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send {
    /// The type of items this source generates
    type Item: Send + 'static;

    /// Pull the next item, or `None` once the source is exhausted.
    async fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Drain the source into a Vec.
    async fn collect(&mut self) -> Result<Vec<Self::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

/// A type-erased source, as accepted by the combinators.
pub type BoxSource<T> = Box<dyn Source<Item = T>>;

#[async_trait]
impl<T: Send + 'static> Source for BoxSource<T> {
    type Item = T;

    async fn next(&mut self) -> Result<Option<T>> {
        (**self).next().await
    }
}

/// Extension trait for sources that provides the fluent combinator API.
///
/// Callbacks have a single shape: they return a future. Synchronous logic
/// wraps its result in [`futures::future::ready`].
pub trait SourceExt: Source {
    /// Map items through a function that may suspend
    fn map<F, Fut, U>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> Fut + Send,
        Fut: Future<Output = U> + Send,
        U: Send + 'static,
    {
        Map::new(self, f)
    }

    /// Keep only items for which the predicate resolves to `true`
    fn filter<F, Fut>(self, predicate: F) -> Filter<Self, F>
    where
        Self: Sized,
        F: FnMut(&Self::Item) -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        Filter::new(self, predicate)
    }

    /// Take only the first N items
    fn take(self, count: usize) -> Take<Self>
    where
        Self: Sized,
    {
        Take::new(self, count)
    }

    /// Yield every item of `self`, then every item of `other`
    fn chain<S2>(self, other: S2) -> Chain<Self, S2>
    where
        Self: Sized,
        S2: Source<Item = Self::Item>,
    {
        Chain::new(self, other)
    }

    /// Merge this source with `other` on the given runtime
    fn mix<S2>(self, other: S2, handle: &Handle) -> Mix<Self::Item>
    where
        Self: Sized + 'static,
        S2: Source<Item = Self::Item> + 'static,
    {
        Mix::from_pair(handle, Box::new(self), Box::new(other))
    }

    /// Replay this source to any number of readers on the given runtime
    fn split(self, handle: &Handle) -> Split<Self::Item>
    where
        Self: Sized + 'static,
        Self::Item: Clone,
    {
        Split::new(handle, Box::new(self))
    }

    /// Erase the concrete source type
    fn boxed(self) -> BoxSource<Self::Item>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl<S: Source> SourceExt for S {}
