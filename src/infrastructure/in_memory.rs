use crate::domain::ports::{CacheBackend, CredentialVault};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process [`CacheBackend`].
///
/// Serves both as the test/demo backend and as the transparent fallback the
/// session store switches to when the networked cache errors. Expiry is
/// enforced lazily on access.
#[derive(Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }
}

/// In-memory pre-provisioned credential pool.
///
/// `fetch_credentials` is an atomic pop: the lock is held across the check
/// and the removal so two concurrent fulfillments cannot receive the same
/// credential.
#[derive(Default, Clone)]
pub struct InMemoryCredentialVault {
    pools: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl InMemoryCredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds pre-provisioned credentials for a product.
    pub async fn seed(&self, product_id: &str, credentials: Vec<String>) {
        let mut pools = self.pools.lock().await;
        pools
            .entry(product_id.to_string())
            .or_default()
            .extend(credentials);
    }

    pub async fn remaining(&self, product_id: &str) -> usize {
        let pools = self.pools.lock().await;
        pools.get(product_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl CredentialVault for InMemoryCredentialVault {
    async fn fetch_credentials(&self, product_id: &str) -> Result<Option<String>> {
        let mut pools = self.pools.lock().await;
        Ok(pools.get_mut(product_id).and_then(Vec::pop))
    }
}
