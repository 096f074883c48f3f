//! Error types for the fan-in/fan-out system.

use std::sync::Arc;

use crate::queue::ConsumerKey;

/// The main error type for streamfan.
///
/// Queue closure is deliberately absent: a closed queue is reported through
/// `false`/`None` return values, never as an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A source stream failed while being drained
    #[error("Source error: {0}")]
    Upstream(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A consumer key was registered twice
    #[error("Consumer key {0} is already registered")]
    DuplicateKey(ConsumerKey),

    /// A consumer key was used without being registered
    #[error("Consumer key {0} is not registered")]
    UnknownKey(ConsumerKey),

    /// A shared buffer was configured with a capacity of zero
    #[error("Buffer capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// A fan-in was built from fewer than two sources
    #[error("Mixing requires at least two sources, got {given}")]
    TooFewSources { given: usize },

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a source error from any error type
    pub fn upstream<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Upstream(Arc::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error came out of a source stream
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Upstream(Arc::from(e))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign errors into our Error type
pub trait IntoError<T> {
    fn into_upstream_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_upstream_error(self) -> Result<T> {
        self.map_err(Error::upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_upstream_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::upstream(io);

        assert!(err.is_upstream());
        assert_eq!(err.to_string(), "Source error: disk on fire");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_into_upstream_error() {
        let parsed: std::result::Result<i32, _> = "x".parse::<i32>();
        let err = parsed.into_upstream_error().unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn test_registration_messages() {
        assert_eq!(
            Error::DuplicateKey(ConsumerKey(3)).to_string(),
            "Consumer key #3 is already registered"
        );
        assert_eq!(
            Error::TooFewSources { given: 1 }.to_string(),
            "Mixing requires at least two sources, got 1"
        );
    }
}
