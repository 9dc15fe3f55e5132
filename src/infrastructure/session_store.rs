use crate::domain::ports::{CacheBackend, CacheBackendBox};
use crate::domain::session::Session;
use crate::infrastructure::in_memory::InMemoryCache;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

const KEY_PREFIX: &str = "session:";

/// Durable per-customer conversational state.
///
/// Snapshots are JSON values in the cache backend under `session:<customer>`
/// with the inactivity TTL. Any backend failure falls back transparently to
/// an in-process map for that call: durability is best-effort, a single
/// process's view stays correct, and no error reaches callers.
pub struct SessionStore {
    backend: CacheBackendBox,
    fallback: InMemoryCache,
    ttl: Duration,
    /// Per-customer guards making `mutate` an atomic read-modify-write.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(backend: CacheBackendBox, ttl: Duration) -> Self {
        Self {
            backend,
            fallback: InMemoryCache::new(),
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key(customer_id: &str) -> String {
        format!("{KEY_PREFIX}{customer_id}")
    }

    async fn lock_for(&self, customer_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(customer_id.to_string()).or_default())
    }

    async fn load(&self, customer_id: &str) -> Option<Session> {
        let key = Self::key(customer_id);
        let raw = match self.backend.get(&key).await {
            Ok(Some(raw)) => Some(raw),
            // A write may have landed in the fallback during an outage.
            Ok(None) => self.fallback.get(&key).await.ok().flatten(),
            Err(error) => {
                warn!(%error, "cache backend read failed, using in-process fallback");
                self.fallback.get(&key).await.ok().flatten()
            }
        }?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(error) => {
                warn!(%error, "discarding corrupt session snapshot");
                None
            }
        }
    }

    async fn persist(&self, session: &Session) {
        let key = Self::key(&session.customer_id);
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, "session snapshot serialization failed");
                return;
            }
        };
        if let Err(error) = self.backend.set(&key, &raw, Some(self.ttl)).await {
            warn!(%error, "cache backend write failed, using in-process fallback");
            let _ = self.fallback.set(&key, &raw, Some(self.ttl)).await;
        }
    }

    /// Fetches the customer's session, creating one lazily on first contact.
    ///
    /// Never fails; refreshes `last_activity` and the backing TTL.
    pub async fn get(&self, customer_id: &str) -> Session {
        self.mutate(customer_id, |_| {}).await
    }

    /// Atomic per-key read-modify-write.
    ///
    /// Two near-simultaneous events for the same customer (a double-tap)
    /// serialize on the per-customer guard instead of clobbering each other.
    pub async fn mutate<F>(&self, customer_id: &str, apply: F) -> Session
    where
        F: FnOnce(&mut Session),
    {
        let guard = self.lock_for(customer_id).await;
        let _held = guard.lock().await;

        let mut session = self
            .load(customer_id)
            .await
            .unwrap_or_else(|| Session::new(customer_id));
        apply(&mut session);
        session.last_activity = Utc::now();
        self.persist(&session).await;
        session
    }

    /// Linear scan over active sessions for the owner of an order.
    ///
    /// Admin-approval and webhook volume is low, so a scan is acceptable.
    pub async fn find_by_order_id(&self, order_id: &str) -> Option<String> {
        for (_, raw) in self.scan_all().await {
            if let Ok(session) = serde_json::from_str::<Session>(&raw)
                && session.order_id.as_deref() == Some(order_id)
            {
                return Some(session.customer_id);
            }
        }
        None
    }

    /// Finds the owner of a payment reference (webhook lookups).
    pub async fn find_by_invoice_id(&self, invoice_id: &str) -> Option<String> {
        for (_, raw) in self.scan_all().await {
            if let Ok(session) = serde_json::from_str::<Session>(&raw)
                && session.payment_invoice_id.as_deref() == Some(invoice_id)
            {
                return Some(session.customer_id);
            }
        }
        None
    }

    /// Customer ids of all active sessions (admin broadcast).
    pub async fn active_customers(&self) -> Vec<String> {
        self.scan_all()
            .await
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_str::<Session>(&raw).ok())
            .map(|session| session.customer_id)
            .collect()
    }

    /// Removes sessions inactive beyond the window.
    ///
    /// Redundant with, but independent of, TTL expiry in the cache backend.
    /// Returns the number of sessions removed.
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let mut removed = 0;
        for (key, raw) in self.scan_all().await {
            let stale = match serde_json::from_str::<Session>(&raw) {
                Ok(session) => session.last_activity < cutoff,
                Err(_) => true,
            };
            if stale {
                if let Err(error) = self.backend.delete(&key).await {
                    warn!(%error, "cache backend delete failed during sweep");
                }
                let _ = self.fallback.delete(&key).await;
                removed += 1;
            }
        }
        removed
    }

    async fn scan_all(&self) -> Vec<(String, String)> {
        let mut merged: HashMap<String, String> = HashMap::new();
        if let Ok(pairs) = self.fallback.scan(KEY_PREFIX).await {
            merged.extend(pairs);
        }
        match self.backend.scan(KEY_PREFIX).await {
            Ok(pairs) => merged.extend(pairs),
            Err(error) => {
                warn!(%error, "cache backend scan failed, serving in-process view");
            }
        }
        merged.into_iter().collect()
    }
}
