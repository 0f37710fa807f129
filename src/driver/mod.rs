//! Storage drivers for cached entities
//!
//! A driver maps [`CacheKey`]s to [`Entity`] values and nothing more: it never
//! looks at expiration. Two implementations ship with the crate, the
//! concurrent in-memory [`InMemoryDriver`] (the default) and the one-file-per-key
//! [`FileDriver`]. Drivers are shared between repositories as `Arc<dyn Driver>`
//! and can be registered by name in a [`DriverRegistry`].

mod file;
mod memory;
mod registry;

use std::fmt::Debug;

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::DriverError;
use crate::key::{CacheKey, Keyspace};

pub use file::FileDriver;
pub use memory::InMemoryDriver;
pub use registry::DriverRegistry;

/// Outcome of a driver lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// An entity is stored under the key
    Hit(Entity),
    /// Nothing is stored under the key
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Lookup::Hit(entity) => Some(entity),
            Lookup::Miss => None,
        }
    }
}

impl From<Option<Entity>> for Lookup {
    fn from(entity: Option<Entity>) -> Self {
        entity.map_or(Lookup::Miss, Lookup::Hit)
    }
}

/// Key to entity storage backend
///
/// Every operation must be atomic with respect to the others: a `get`
/// running concurrently with a `set` for the same key observes either the
/// old or the new entity, never a mix.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// A short name for logs
    fn name(&self) -> &str;

    /// Stores `entity` under `key`, replacing whatever was there
    async fn set(&self, key: &CacheKey, entity: Entity) -> Result<(), DriverError>;

    /// Looks up `key`; absence is a [`Lookup::Miss`], not an error
    async fn get(&self, key: &CacheKey) -> Result<Lookup, DriverError>;

    /// Removes `key`; a no-op if it is absent
    async fn delete(&self, key: &CacheKey) -> Result<(), DriverError>;

    /// Removes every key in `keyspace`, leaving other keyspaces untouched
    async fn clear(&self, keyspace: &Keyspace) -> Result<(), DriverError>;
}
