//! Pass-through combinators: one source in, one source out, no tasks.

use async_trait::async_trait;
use std::future::Future;

use crate::core::{Result, Source};

/// Applies an async function to every item. See [`SourceExt::map`](crate::core::SourceExt::map).
pub struct Map<S, F> {
    source: S,
    f: F,
}

impl<S, F> Map<S, F> {
    pub(crate) fn new(source: S, f: F) -> Self {
        Self { source, f }
    }
}

#[async_trait]
impl<S, F, Fut, U> Source for Map<S, F>
where
    S: Source,
    F: FnMut(S::Item) -> Fut + Send,
    Fut: Future<Output = U> + Send,
    U: Send + 'static,
{
    type Item = U;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        match self.source.next().await? {
            Some(item) => Ok(Some((self.f)(item).await)),
            None => Ok(None),
        }
    }
}

/// Keeps items whose async predicate resolves to `true`. See [`SourceExt::filter`](crate::core::SourceExt::filter).
pub struct Filter<S, F> {
    source: S,
    predicate: F,
}

impl<S, F> Filter<S, F> {
    pub(crate) fn new(source: S, predicate: F) -> Self {
        Self { source, predicate }
    }
}

#[async_trait]
impl<S, F, Fut> Source for Filter<S, F>
where
    S: Source,
    F: FnMut(&S::Item) -> Fut + Send,
    Fut: Future<Output = bool> + Send,
{
    type Item = S::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        while let Some(item) = self.source.next().await? {
            if (self.predicate)(&item).await {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }
}

/// Stops after a fixed number of items.
pub struct Take<S> {
    source: S,
    remaining: usize,
}

impl<S> Take<S> {
    pub(crate) fn new(source: S, remaining: usize) -> Self {
        Self { source, remaining }
    }
}

#[async_trait]
impl<S: Source> Source for Take<S> {
    type Item = S::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        match self.source.next().await? {
            Some(item) => {
                self.remaining -= 1;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

/// Drains the first source, then the second.
pub struct Chain<S1, S2> {
    first: Option<S1>,
    second: S2,
}

impl<S1, S2> Chain<S1, S2> {
    pub(crate) fn new(first: S1, second: S2) -> Self {
        Self {
            first: Some(first),
            second,
        }
    }
}

#[async_trait]
impl<S1, S2> Source for Chain<S1, S2>
where
    S1: Source,
    S2: Source<Item = S1::Item>,
{
    type Item = S1::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        if let Some(first) = self.first.as_mut() {
            match first.next().await? {
                Some(item) => return Ok(Some(item)),
                None => self.first = None,
            }
        }
        self.second.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, SourceExt};
    use crate::sources::{IterSource, VecSource};
    use crate::util::from_fn;
    use futures::future::ready;
    use std::time::Duration;

    #[tokio::test]
    async fn test_map_combinator() {
        let mut mapped = IterSource::new(1..6).map(|x| ready(x * 2));
        assert_eq!(mapped.collect().await.unwrap(), vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn test_map_with_suspending_function() {
        let mut mapped = VecSource::new(vec!["a", "bb"]).map(|s| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            s.len()
        });
        assert_eq!(mapped.collect().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_filter_combinator() {
        let mut filtered = IterSource::new(0..5).filter(|x| ready(x % 2 == 1));
        assert_eq!(filtered.collect().await.unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_filter_with_suspending_predicate() {
        let mut filtered = IterSource::new(0..3).filter(|x| {
            let keep = *x != 0;
            async move {
                tokio::task::yield_now().await;
                keep
            }
        });
        assert_eq!(filtered.collect().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_take_combinator() {
        let mut taken = IterSource::new(1..11).take(3);
        assert_eq!(taken.collect().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_chain_combinator() {
        let mut chained =
            VecSource::new(vec!['a', 'b', 'c']).chain(VecSource::new(vec!['d', 'e', 'f']));
        assert_eq!(
            chained.collect().await.unwrap(),
            vec!['a', 'b', 'c', 'd', 'e', 'f']
        );
    }

    #[tokio::test]
    async fn test_chain_surfaces_error_after_partial_output() {
        let mut yielded = false;
        let failing = from_fn(move || {
            let first = !yielded;
            yielded = true;
            async move {
                if first {
                    Ok(Some('0'))
                } else {
                    Err(Error::custom("err"))
                }
            }
        });
        let mut chained = VecSource::new(vec!['a', 'b', 'c']).chain(failing);

        let mut partial = Vec::new();
        let err = loop {
            match chained.next().await {
                Ok(Some(item)) => partial.push(item),
                Ok(None) => panic!("chain ended without the error"),
                Err(e) => break e,
            }
        };
        assert_eq!(partial, vec!['a', 'b', 'c', '0']);
        assert_eq!(err.to_string(), "err");
    }

    #[tokio::test]
    async fn test_complex_combination() {
        let mut complex = IterSource::new(1..21)
            .filter(|x| ready(x % 2 == 0)) // Even numbers
            .map(|x| ready(x * 3)) // Multiply by 3
            .take(3); // Take first 3

        assert_eq!(complex.collect().await.unwrap(), vec![6, 12, 18]); // 2*3, 4*3, 6*3
    }
}
