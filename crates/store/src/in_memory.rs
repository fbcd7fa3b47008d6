//! In-memory backend with per-entry expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cardwire_core::card::CardInstanceId;
use cardwire_core::error::StoreError;
use cardwire_core::store::InstanceStore;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Longest lifetime an entry can get; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A `HashMap` behind a tokio `RwLock`. Entries expire after their TTL;
/// expired entries are invisible to reads and dropped by `purge_expired`.
pub struct InMemoryStore<V> {
    entries: Arc<RwLock<HashMap<CardInstanceId, Entry<V>>>>,
    default_ttl: Duration,
}

impl<V> InMemoryStore<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<V> Default for InMemoryStore<V> {
    /// One day, the default card lifetime.
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}

#[async_trait]
impl<V> InstanceStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, id: &CardInstanceId) -> Result<Option<V>, StoreError> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(id)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, id: CardInstanceId, value: V) -> Result<(), StoreError> {
        self.put_with_ttl(id, value, self.default_ttl).await
    }

    async fn put_with_ttl(
        &self,
        id: CardInstanceId,
        value: V,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = expiry_after(Instant::now(), ttl);
        self.entries
            .write()
            .await
            .insert(id, Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, id: &CardInstanceId) -> Result<Option<V>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(id)
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().await.len())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}

/// Purge `store` every `interval` until the returned task is aborted.
pub fn spawn_sweeper<V, S>(store: Arc<S>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    S: InstanceStore<V> + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(store = store.name(), removed, "Purged expired instances"),
                Err(e) => warn!(store = store.name(), error = %e, "Instance sweep failed"),
            }
        }
    })
}
