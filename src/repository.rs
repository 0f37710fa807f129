//! Read-through, write-behind repository
//!
//! A [`Repository`] pairs an application [`Source`] (the `fetch` callbacks)
//! with a [`Driver`]. Reads are served from the driver while the stored entity
//! is fresh; otherwise the source is asked for a new entity, which is stamped,
//! stored and returned.
//!
//! Two callers missing on the same key at the same moment will both fetch and
//! both store. The last store wins; no single-flight coordination is done.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::driver::{Driver, DriverRegistry, InMemoryDriver, Lookup};
use crate::entity::Entity;
use crate::error::{BoxError, Error, MissingCallback, Result};
use crate::key::{CacheKey, Keyspace};

/// Default time an entity is served before it must be fetched again
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60 * 60);

/// Application callbacks that produce cached values
#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Arguments identifying one cached value; encoded into the cache key
    type Args: Serialize + Clone + Send + Sync + 'static;
    /// The cached value
    type Value: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Identity of this repository within a shared driver
    ///
    /// Defaults to the Rust type name, so two source types never share keys.
    fn identity(&self) -> Keyspace {
        Keyspace::new(std::any::type_name::<Self>())
    }

    /// Produces the entity for `args`
    async fn fetch(&self, args: &Self::Args) -> Result<Entity<Self::Value>, BoxError>;

    /// Produces every entity in the keyspace, for [`Repository::prime_all`]
    async fn fetch_all(
        &self,
        keyspace: &Keyspace,
    ) -> Result<Vec<(Self::Args, Entity<Self::Value>)>, BoxError> {
        let _ = keyspace;
        Err(Box::new(MissingCallback("fetch_all")))
    }

    /// Decides whether the entry for `args` needs refreshing
    ///
    /// `cached` is the currently stored entity, if any. The default always
    /// refreshes; override it to compare fingerprints or last-modified times
    /// against the source of truth.
    async fn is_stale(
        &self,
        args: &Self::Args,
        cached: Option<&Entity<Self::Value>>,
    ) -> Result<bool, BoxError> {
        let _ = (args, cached);
        Ok(true)
    }
}

/// Which driver a repository stores into
#[derive(Debug, Clone, Default)]
pub enum DriverSelection {
    /// A fresh [`InMemoryDriver`] owned by the repository
    #[default]
    Default,
    /// A specific, possibly shared, driver instance
    Instance(Arc<dyn Driver>),
    /// A driver looked up by name in a [`DriverRegistry`] at build time
    Named(String),
}

impl DriverSelection {
    fn resolve(self, registry: &DriverRegistry) -> Result<Arc<dyn Driver>> {
        match self {
            DriverSelection::Default => Ok(Arc::new(InMemoryDriver::new())),
            DriverSelection::Instance(driver) => Ok(driver),
            DriverSelection::Named(name) => registry.get(&name).ok_or(Error::UnknownDriver(name)),
        }
    }
}

/// Configuration supplied when a repository is built
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Expiration applied to entities that do not carry their own
    pub default_expiration: Duration,
    pub driver: DriverSelection,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_expiration: DEFAULT_EXPIRATION,
            driver: DriverSelection::Default,
        }
    }
}

impl RepositoryConfig {
    pub fn with_default_expiration(mut self, expiration: Duration) -> Self {
        self.default_expiration = expiration;
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = DriverSelection::Instance(driver);
        self
    }

    pub fn with_driver_named(mut self, name: impl Into<String>) -> Self {
        self.driver = DriverSelection::Named(name.into());
        self
    }
}

/// Read-through cache over a [`Driver`], using the expiration model
///
/// Cloning is cheap and clones share the source, driver and clock.
pub struct Repository<S: Source> {
    source: Arc<S>,
    driver: Arc<dyn Driver>,
    keyspace: Keyspace,
    default_expiration: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: Source> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            driver: Arc::clone(&self.driver),
            keyspace: self.keyspace.clone(),
            default_expiration: self.default_expiration,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: Source> fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("keyspace", &self.keyspace)
            .field("driver", &self.driver.name())
            .field("default_expiration", &self.default_expiration)
            .finish()
    }
}

impl<S: Source> Repository<S> {
    /// Builds a repository, resolving named drivers against the global registry
    ///
    /// # Returns
    /// * `Ok(Repository)` on success
    /// * `Err(Error::UnknownDriver)` if the configured driver name is not registered
    pub fn new(source: S, config: RepositoryConfig) -> Result<Self> {
        Self::with_registry(source, config, DriverRegistry::global())
    }

    /// Builds a repository, resolving named drivers against `registry`
    pub fn with_registry(
        source: S,
        config: RepositoryConfig,
        registry: &DriverRegistry,
    ) -> Result<Self> {
        let driver = config.driver.resolve(registry)?;
        let keyspace = source.identity();
        Ok(Self {
            source: Arc::new(source),
            driver,
            keyspace,
            default_expiration: config.default_expiration,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock used for expiration checks and `cached_at` stamps
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    /// The cache key for `args` in this repository's keyspace
    pub fn key(&self, args: &S::Args) -> Result<CacheKey> {
        CacheKey::new(&self.keyspace, args)
    }

    /// Returns the cached value for `args`, fetching it on a miss or expiry
    pub async fn get(&self, args: &S::Args) -> Result<S::Value> {
        let key = self.key(args)?;
        match self.lookup(&key).await? {
            Some(entity) if entity.is_fresh(self.clock.now()) => {
                debug!(key = %key, "Cache hit");
                return Ok(entity.into_value());
            }
            Some(_) => debug!(key = %key, "Cache entry expired"),
            None => debug!(key = %key, "Cache miss"),
        }
        self.fetch_and_store(&key, args).await
    }

    /// Fetches and stores the value for `args`, ignoring anything cached
    pub async fn prime(&self, args: &S::Args) -> Result<S::Value> {
        let key = self.key(args)?;
        self.fetch_and_store(&key, args).await
    }

    /// Fetches and stores every value the source reports for this keyspace
    ///
    /// Pairs are stored one after another in the order `fetch_all` produced
    /// them, so a key returned twice ends up holding its last entity. A failed
    /// store stops priming; pairs before it stay stored.
    pub async fn prime_all(&self) -> Result<Vec<S::Value>> {
        let pairs = self
            .source
            .fetch_all(&self.keyspace)
            .await
            .map_err(|source| Error::FetchAll {
                keyspace: self.keyspace.to_string(),
                source,
            })?;
        debug!(keyspace = %self.keyspace, count = pairs.len(), "Priming keyspace");

        let mut values = Vec::with_capacity(pairs.len());
        for (args, entity) in pairs {
            let key = self.key(&args)?;
            values.push(self.store(&key, entity).await?);
        }
        Ok(values)
    }

    /// Removes the entry for `args`
    pub async fn delete(&self, args: &S::Args) -> Result<()> {
        let key = self.key(args)?;
        self.driver
            .delete(&key)
            .await
            .map_err(|err| Error::driver(self.driver.name(), err))
    }

    /// Removes every entry in this repository's keyspace
    pub async fn clear(&self) -> Result<()> {
        self.driver
            .clear(&self.keyspace)
            .await
            .map_err(|err| Error::driver(self.driver.name(), err))
    }

    /// Returns the stored entity for `args` without fetching, fresh or not
    pub async fn peek(&self, args: &S::Args) -> Result<Option<Entity<S::Value>>> {
        let key = self.key(args)?;
        self.lookup(&key).await
    }

    /// Reads `key` from the driver and decodes it
    ///
    /// A stored value that no longer decodes into `S::Value` is treated as a miss.
    pub(crate) async fn lookup(&self, key: &CacheKey) -> Result<Option<Entity<S::Value>>> {
        let lookup = self
            .driver
            .get(key)
            .await
            .map_err(|err| Error::driver(self.driver.name(), err))?;

        match lookup {
            Lookup::Miss => Ok(None),
            Lookup::Hit(entity) => match entity.decode() {
                Ok(entity) => Ok(Some(entity)),
                Err(err) => {
                    warn!(key = %key, error = %err, "Cached value has an unexpected shape; ignoring it");
                    Ok(None)
                }
            },
        }
    }

    pub(crate) async fn fetch_and_store(&self, key: &CacheKey, args: &S::Args) -> Result<S::Value> {
        let entity = self
            .source
            .fetch(args)
            .await
            .map_err(|source| Error::Fetch {
                key: key.clone(),
                source,
            })?;
        self.store(key, entity).await
    }

    async fn store(&self, key: &CacheKey, entity: Entity<S::Value>) -> Result<S::Value> {
        let entity = entity.stamped(self.clock.now(), self.default_expiration);
        let stored = entity.encode().map_err(|source| Error::Codec {
            key: key.clone(),
            source,
        })?;

        self.driver
            .set(key, stored)
            .await
            .map_err(|err| Error::driver(self.driver.name(), err))?;
        debug!(key = %key, expires = ?entity.expiry(), "Stored entity");

        Ok(entity.into_value())
    }
}
