//! Read-through, write-behind caching repositories
//!
//! Callers ask a [`Repository`] for the value belonging to some arguments. The
//! repository serves it from its [`Driver`](driver::Driver) while the stored
//! [`Entity`] is fresh, and otherwise fetches it through the application's
//! [`Source`], stores it and returns it. A [`BackgroundRefreshRepository`]
//! additionally keeps chosen keys warm with one background task per key.

pub mod cli;
pub mod clock;
pub mod driver;
pub mod entity;
pub mod error;
pub mod key;
pub mod refresh;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{Driver, DriverRegistry, FileDriver, InMemoryDriver, Lookup};
pub use entity::{Entity, Expiration};
pub use error::{BoxError, DriverError, Error, ErrorKind, MissingCallback, Result};
pub use key::{CacheKey, Keyspace};
pub use refresh::{BackgroundRefreshRepository, RefreshConfig, RefreshState, SwallowList};
pub use repository::{DriverSelection, Repository, RepositoryConfig, Source};
