//! Combinators over [`Source`](crate::core::Source)s.
//!
//! - [`mix`]: fan-in. N sources drained by N background tasks into one
//!   shared queue. Readers *compete*: each item goes to exactly one reader.
//! - [`split`]: fan-out. One source drained by one background task into a
//!   shared multi-consumer buffer. Readers *broadcast*: each reader sees
//!   every item.
//! - [`sequential`]: `map`, `filter`, `chain` and `take`, which run inline in
//!   the reader and spawn nothing.
//!
//! Background tasks run only while at least one reader handle is alive.
//! Dropping the last reader cancels them.

pub mod mix;
pub mod sequential;
pub mod split;

pub use mix::{mix, Mix, MixConfig, MixReader, SourceFailure};
pub use sequential::{Chain, Filter, Map, Take};
pub use split::{split, Split, SplitConfig, SplitReader};

/// What a combinator does when one of its sources fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailurePolicy {
    /// Log and record the failure; the failed source simply ends.
    #[default]
    Log,
    /// Stop the combinator and hand the first failure to every reader once
    /// it has drained what was already buffered.
    Propagate,
}

/// How a background task ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Exhausted,
    Failed(crate::core::Error),
    Cancelled,
}

impl Outcome {
    /// Classify how a pump ended, treating a panic as a failure.
    pub(crate) fn from_pump(result: std::thread::Result<crate::core::Result<()>>) -> Self {
        match result {
            Ok(Ok(())) => Outcome::Exhausted,
            Ok(Err(error)) => Outcome::Failed(error),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned());
                Outcome::Failed(crate::core::Error::custom(match message {
                    Some(message) => format!("source task panicked: {message}"),
                    None => "source task panicked".to_string(),
                }))
            }
        }
    }
}
