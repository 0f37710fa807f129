//! Named driver registry
//!
//! Drivers are registered during start-up and looked up by name when
//! repositories are built. A process-wide instance is available through
//! [`DriverRegistry::global`]; tests and embedders can also keep their own.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use super::Driver;

static GLOBAL: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::new);

/// Map from name to shared driver instance
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, empty at start-up
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL
    }

    /// Registers `driver` under `name`; a later registration for the same name wins
    pub fn register_driver(&self, name: impl Into<String>, driver: Arc<dyn Driver>) {
        let name = name.into();
        debug!(name = %name, driver = driver.name(), "Registering cache driver");
        self.drivers.write().insert(name, driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.read().contains_key(name)
    }
}
