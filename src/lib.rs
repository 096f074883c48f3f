//! # Fan-in and fan-out combinators for async sources
//!
//! This crate merges several asynchronous sources into one ([`Mix`]) and
//! broadcasts one source to many independent readers ([`Split`]), with
//! bounded buffers providing backpressure and reader lifetimes driving
//! cancellation of the background tasks.
//!
//! ## Core Concepts
//!
//! - **Source**: an async pull-based producer; `Ok(None)` marks end-of-stream
//! - **Mix**: fan-in, readers compete for the merged items
//! - **Split**: fan-out, every reader sees every item
//! - **ClosableQueue / MultiConsumerQueue**: the buffers underneath
//!
//! ## Example
//!
//! ```rust
//! use streamfan::prelude::*;
//! use tokio::runtime::Handle;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let handle = Handle::current();
//!     let evens = IterSource::new((0..10).filter(|x| x % 2 == 0));
//!     let odds = IterSource::new((0..10).filter(|x| x % 2 == 1));
//!
//!     let merged = evens.mix(odds, &handle);
//!     let split = merged.reader().map(|x| futures::future::ready(x * 10)).split(&handle);
//!
//!     let (mut a, mut b) = split.split_pair();
//!     let (a, b) = tokio::join!(a.collect(), b.collect());
//!     assert_eq!(a?.len(), 10);
//!     assert_eq!(b?.len(), 10);
//!     Ok(())
//! }
//! ```

pub mod combinators;
pub mod core;
pub mod queue;
pub mod sources;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::combinators::{
        mix, split, FailurePolicy, Mix, MixConfig, MixReader, Split, SplitConfig, SplitReader,
    };
    pub use crate::core::{BoxSource, Error, Result, Source, SourceExt};
    pub use crate::queue::{ClosableQueue, Consumer, ConsumerKey, MultiConsumerQueue};
    pub use crate::sources::*;
    pub use crate::util::{from_fn, into_stream};
}

pub use crate::combinators::{Mix, Split};
pub use crate::core::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
