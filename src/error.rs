//! Error types for the caching core
//!
//! Driver failures, callback failures and configuration failures all surface
//! through [`Error`]. Callback errors are kept intact as the `source` of the
//! wrapping variant so callers can still downcast to their own types.

use thiserror::Error;

use crate::key::CacheKey;

/// Error type returned by user callbacks (`fetch`, `fetch_all`, `is_stale`)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by a [`Driver`](crate::driver::Driver) implementation
#[derive(Debug, Error)]
pub enum DriverError {
    /// Filesystem or other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity could not be serialized for storage
    #[error("Failed to serialize entity: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking driver task panicked or was cancelled
    #[error("Driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors surfaced by repositories
#[derive(Debug, Error)]
pub enum Error {
    /// Arguments could not be encoded into a cache key
    #[error("Failed to encode cache key arguments: {0}")]
    Key(#[source] serde_json::Error),

    /// A repository was configured with a driver name nobody registered
    #[error("No driver registered under the name '{0}'")]
    UnknownDriver(String),

    /// The underlying driver failed
    #[error("Driver '{driver}' failed: {source}")]
    Driver {
        driver: String,
        #[source]
        source: DriverError,
    },

    /// A fetched value could not be converted into its stored form
    #[error("Failed to convert value for {key}: {source}")]
    Codec {
        key: CacheKey,
        #[source]
        source: serde_json::Error,
    },

    /// The `fetch` callback failed
    #[error("fetch failed for {key}: {source}")]
    Fetch {
        key: CacheKey,
        #[source]
        source: BoxError,
    },

    /// The `fetch_all` callback failed
    #[error("fetch_all failed for keyspace '{keyspace}': {source}")]
    FetchAll {
        keyspace: String,
        #[source]
        source: BoxError,
    },

    /// The staleness check failed
    #[error("staleness check failed for {key}: {source}")]
    Stale {
        key: CacheKey,
        #[source]
        source: BoxError,
    },
}

/// Fieldless mirror of [`Error`], used to select errors by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Key,
    UnknownDriver,
    Driver,
    Codec,
    Fetch,
    FetchAll,
    Stale,
}

impl Error {
    /// Returns the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Key(_) => ErrorKind::Key,
            Error::UnknownDriver(_) => ErrorKind::UnknownDriver,
            Error::Driver { .. } => ErrorKind::Driver,
            Error::Codec { .. } => ErrorKind::Codec,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::FetchAll { .. } => ErrorKind::FetchAll,
            Error::Stale { .. } => ErrorKind::Stale,
        }
    }

    /// Returns the callback error if this error wraps one
    pub fn callback_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Fetch { source, .. }
            | Error::FetchAll { source, .. }
            | Error::Stale { source, .. } => Some(&**source),
            _ => None,
        }
    }

    /// Finds an error of type `T` raised by a callback
    ///
    /// Walks the callback error and its `source()` chain, so a `T` wrapped by
    /// another error type is still found.
    pub fn callback_error<T>(&self) -> Option<&T>
    where
        T: std::error::Error + 'static,
    {
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            self.callback_source().map(|e| e as &(dyn std::error::Error + 'static));
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<T>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }

    pub(crate) fn driver(driver: &str, source: DriverError) -> Self {
        Error::Driver {
            driver: driver.to_string(),
            source,
        }
    }
}

/// Returned by the default `fetch_all` of a source that does not provide one
#[derive(Debug, Error)]
#[error("callback '{0}' is not implemented by this source")]
pub struct MissingCallback(pub &'static str);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Keyspace;

    #[derive(Debug, Error)]
    #[error("upstream timed out")]
    struct Timeout;

    #[derive(Debug, Error)]
    #[error("wrapped: {0}")]
    struct Wrapper(#[source] Timeout);

    fn key() -> CacheKey {
        CacheKey::new(&Keyspace::new("weather"), &("kitsilano",)).unwrap()
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Error::UnknownDriver("x".into()).kind(), ErrorKind::UnknownDriver);
        let err = Error::Fetch {
            key: key(),
            source: Box::new(Timeout),
        };
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[test]
    fn test_callback_error_downcasts_direct_source() {
        let err = Error::Fetch {
            key: key(),
            source: Box::new(Timeout),
        };
        assert!(err.callback_error::<Timeout>().is_some());
        assert!(err.callback_error::<MissingCallback>().is_none());
    }

    #[test]
    fn test_callback_error_walks_source_chain() {
        let err = Error::Stale {
            key: key(),
            source: Box::new(Wrapper(Timeout)),
        };
        assert!(err.callback_error::<Wrapper>().is_some());
        assert!(err.callback_error::<Timeout>().is_some());
    }

    #[test]
    fn test_non_callback_errors_have_no_callback_source() {
        let err = Error::UnknownDriver("redis".into());
        assert!(err.callback_source().is_none());
        assert!(err.to_string().contains("redis"));
    }
}
