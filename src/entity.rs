//! Cached values and their metadata
//!
//! An [`Entity`] is what a source's `fetch` produces and what a driver
//! stores: the value plus optional expiration, fingerprint and last-modified
//! tokens. Drivers always hold `Entity<serde_json::Value>`; repositories
//! convert to and from their typed value at the boundary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// When an entity stops being served from cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expiration {
    /// Expires at a fixed point in time
    At(DateTime<Utc>),
    /// Expires this long after the entity was cached
    In(Duration),
    /// Never expires
    Never,
}

/// Immutable value wrapper carrying cache metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity<V = serde_json::Value> {
    value: V,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<DateTime<Utc>>,
    cached_at: DateTime<Utc>,
}

impl<V> Entity<V> {
    /// Wraps a value with no metadata
    ///
    /// `cached_at` starts as the construction time and is replaced by the
    /// repository when the entity is stored.
    pub fn new(value: V) -> Self {
        Self {
            value,
            expiration: None,
            fingerprint: None,
            last_modified: None,
            cached_at: Utc::now(),
        }
    }

    /// Expire at an absolute time, overriding the repository default
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expiration = Some(Expiration::At(at));
        self
    }

    /// Expire `ttl` after being cached, overriding the repository default
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expiration = Some(Expiration::In(ttl));
        self
    }

    /// Never expire
    pub fn never_expires(mut self) -> Self {
        self.expiration = Some(Expiration::Never);
        self
    }

    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn expiration(&self) -> Option<Expiration> {
        self.expiration
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// The absolute expiry time, or `None` if the entity never expires
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        match self.expiration? {
            Expiration::At(at) => Some(at),
            Expiration::In(ttl) => chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| self.cached_at.checked_add_signed(ttl)),
            Expiration::Never => None,
        }
    }

    /// Whether the entity may still be served at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry() {
            Some(expiry) => now < expiry,
            None => true,
        }
    }

    /// Stamps `cached_at` and fills in `default_ttl` when no expiration was given
    pub(crate) fn stamped(mut self, now: DateTime<Utc>, default_ttl: Duration) -> Self {
        self.cached_at = now;
        if self.expiration.is_none() {
            self.expiration = Some(Expiration::In(default_ttl));
        }
        self
    }

    /// Replaces the value, keeping the metadata
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Entity<U> {
        Entity {
            value: f(self.value),
            expiration: self.expiration,
            fingerprint: self.fingerprint,
            last_modified: self.last_modified,
            cached_at: self.cached_at,
        }
    }
}

impl<V: Serialize> Entity<V> {
    /// Converts the value into the JSON form drivers store
    pub fn encode(&self) -> Result<Entity, serde_json::Error> {
        Ok(Entity {
            value: serde_json::to_value(&self.value)?,
            expiration: self.expiration,
            fingerprint: self.fingerprint.clone(),
            last_modified: self.last_modified,
            cached_at: self.cached_at,
        })
    }
}

impl Entity {
    /// Converts a stored JSON value back into a typed value
    pub fn decode<V: DeserializeOwned>(mut self) -> Result<Entity<V>, serde_json::Error> {
        let value = serde_json::from_value(self.value.take())?;
        Ok(self.map(|_| value))
    }
}

impl<V> From<V> for Entity<V> {
    fn from(value: V) -> Self {
        Entity::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_entity_without_expiration_is_always_fresh() {
        let entity = Entity::new(42);
        assert_eq!(entity.expiry(), None);
        assert!(entity.is_fresh(t0() + chrono::Duration::days(3650)));
    }

    #[test]
    fn test_stamped_applies_default_ttl() {
        let entity = Entity::new("sunny").stamped(t0(), Duration::from_secs(10));
        assert_eq!(entity.cached_at(), t0());
        assert_eq!(entity.expiry(), Some(t0() + chrono::Duration::seconds(10)));
        assert!(entity.is_fresh(t0() + chrono::Duration::seconds(5)));
        assert!(!entity.is_fresh(t0() + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_stamped_keeps_explicit_expiration() {
        let entity = Entity::new("sunny")
            .expires_in(Duration::from_secs(20))
            .stamped(t0(), Duration::from_secs(10));
        assert_eq!(entity.expiry(), Some(t0() + chrono::Duration::seconds(20)));

        let never = Entity::new("sunny")
            .never_expires()
            .stamped(t0(), Duration::from_secs(10));
        assert_eq!(never.expiry(), None);
    }

    #[test]
    fn test_absolute_expiration_ignores_cached_at() {
        let at = t0() + chrono::Duration::minutes(1);
        let entity = Entity::new(1).expires_at(at).stamped(t0(), Duration::from_secs(1));
        assert_eq!(entity.expiry(), Some(at));
    }

    #[test]
    fn test_encode_decode_keeps_metadata() {
        let modified = t0() - chrono::Duration::hours(1);
        let entity = Entity::new(vec![1.5, 2.0])
            .with_fingerprint("etag-1")
            .with_last_modified(modified)
            .stamped(t0(), Duration::from_secs(60));

        let stored = entity.encode().unwrap();
        assert_eq!(stored.value(), &serde_json::json!([1.5, 2.0]));

        let decoded: Entity<Vec<f64>> = stored.decode().unwrap();
        assert_eq!(decoded, entity);
        assert_eq!(decoded.fingerprint(), Some("etag-1"));
        assert_eq!(decoded.last_modified(), Some(modified));
    }

    #[test]
    fn test_decode_into_wrong_type_fails() {
        let stored = Entity::new("not a number").encode().unwrap();
        assert!(stored.decode::<u32>().is_err());
    }
}
