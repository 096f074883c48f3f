//! Core traits and types for the streamfan library.
//!
//! This module contains the source contract and the error type shared by the
//! queues and combinators.

pub mod error;
pub mod traits;

// Re-export core items
pub use error::{Error, IntoError, Result};
pub use traits::{BoxSource, Source, SourceExt};
