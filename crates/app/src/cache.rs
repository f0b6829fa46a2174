use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Deterministic cache key: the service name followed by its parameters
/// in call order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(service: &str) -> Self {
        Self(service.to_string())
    }

    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.push(':');
        self.0.push_str(name);
        self.0.push('=');
        self.0.push_str(&value.to_string());
        self
    }

    /// Appends the parameter only when it is set, so absent values share a key.
    pub fn opt_param(self, name: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Time-boxed store for serialized stats results.
///
/// `get` returns `Ok(None)` on a miss, including expired entries.
pub trait StatsCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError>;
    fn set(&self, key: &CacheKey, value: Value, ttl: Duration) -> Result<(), CacheError>;
}

struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Process-local cache. Concurrent writers to one key are last-writer-wins.
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    clock: Clock,
}

impl MemoryCache {
    pub fn new(clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }
}

impl StatsCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let now = (self.clock)();
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &CacheKey, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let now = (self.clock)();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|err| CacheError::Unavailable(format!("invalid ttl: {err}")))?;
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
