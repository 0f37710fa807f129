//! Process-local driver backed by a locked hash map

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Driver, Lookup};
use crate::entity::Entity;
use crate::error::DriverError;
use crate::key::{CacheKey, Keyspace};

/// Default driver: a single `RwLock` over a `HashMap`
///
/// The lock is held only for the duration of one map operation and never
/// across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryDriver {
    entries: RwLock<HashMap<CacheKey, Entity>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all keyspaces
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set(&self, key: &CacheKey, entity: Entity) -> Result<(), DriverError> {
        self.entries.write().insert(key.clone(), entity);
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Lookup, DriverError> {
        Ok(self.entries.read().get(key).cloned().into())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), DriverError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear(&self, keyspace: &Keyspace) -> Result<(), DriverError> {
        self.entries.write().retain(|key, _| !key.in_keyspace(keyspace));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(keyspace: &str, arg: &str) -> CacheKey {
        CacheKey::new(&Keyspace::new(keyspace), &(arg,)).unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_miss_for_unseen_key() {
        let driver = InMemoryDriver::new();
        let lookup = driver.get(&key("weather", "kitsilano")).await.unwrap();
        assert_eq!(lookup, Lookup::Miss);
    }

    #[tokio::test]
    async fn test_set_then_get_hits() {
        let driver = InMemoryDriver::new();
        let k = key("weather", "kitsilano");
        let entity = Entity::new(serde_json::json!({"temperature": 18.5}));

        driver.set(&k, entity.clone()).await.unwrap();

        assert_eq!(driver.get(&k).await.unwrap(), Lookup::Hit(entity));
        assert_eq!(driver.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_entity() {
        let driver = InMemoryDriver::new();
        let k = key("weather", "kitsilano");
        driver.set(&k, Entity::new(serde_json::json!(1))).await.unwrap();
        driver.set(&k, Entity::new(serde_json::json!(2))).await.unwrap();

        let entity = driver.get(&k).await.unwrap().into_entity().unwrap();
        assert_eq!(entity.value(), &serde_json::json!(2));
        assert_eq!(driver.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_noop_for_missing_key() {
        let driver = InMemoryDriver::new();
        let k = key("weather", "kitsilano");
        driver.delete(&k).await.unwrap();

        driver.set(&k, Entity::new(serde_json::json!(1))).await.unwrap();
        driver.delete(&k).await.unwrap();
        assert!(driver.is_empty());
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_keyspace() {
        let driver = InMemoryDriver::new();
        let weather = key("weather", "kitsilano");
        let weather_2 = key("weather", "jericho");
        let tides = key("tides", "kitsilano");
        for k in [&weather, &weather_2, &tides] {
            driver.set(k, Entity::new(serde_json::json!(true))).await.unwrap();
        }

        driver.clear(&Keyspace::new("weather")).await.unwrap();

        assert_eq!(driver.get(&weather).await.unwrap(), Lookup::Miss);
        assert_eq!(driver.get(&weather_2).await.unwrap(), Lookup::Miss);
        assert!(driver.get(&tides).await.unwrap().is_hit());
    }
}
