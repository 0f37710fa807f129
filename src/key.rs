//! Cache keys and keyspaces
//!
//! A [`CacheKey`] pairs the owning repository's [`Keyspace`] with the
//! canonical JSON encoding of the call arguments. Tuples encode as ordered
//! JSON arrays, so two keys are equal exactly when the keyspace matches and
//! the arguments are equal value for value, in the same order. Maps and sets
//! encode as objects with sorted keys, whatever their iteration order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identity of one repository within a shared driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyspace(String);

impl Keyspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic key for one set of arguments within one keyspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    keyspace: Keyspace,
    args: String,
}

impl CacheKey {
    /// Encodes `args` into a key scoped to `keyspace`
    ///
    /// # Returns
    /// * `Ok(CacheKey)` on success
    /// * `Err(Error::Key)` if the arguments cannot be serialized
    pub fn new<A>(keyspace: &Keyspace, args: &A) -> Result<Self>
    where
        A: Serialize + ?Sized,
    {
        // Going through `Value` sorts object keys, so `HashMap` args are stable
        let value = serde_json::to_value(args).map_err(Error::Key)?;
        let args = serde_json::to_string(&value).map_err(Error::Key)?;
        Ok(Self {
            keyspace: keyspace.clone(),
            args,
        })
    }

    /// Builds a key from arguments that are already JSON
    ///
    /// The JSON is parsed and re-serialized so that whitespace differences in
    /// hand-written input do not produce distinct keys.
    pub fn from_json(keyspace: &Keyspace, args_json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(args_json).map_err(Error::Key)?;
        Self::new(keyspace, &value)
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// The encoded argument list
    pub fn args(&self) -> &str {
        &self.args
    }

    /// Whether this key belongs to `keyspace`
    pub fn in_keyspace(&self, keyspace: &Keyspace) -> bool {
        &self.keyspace == keyspace
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.keyspace, self.args)
    }
}
