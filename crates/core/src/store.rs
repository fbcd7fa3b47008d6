//! InstanceStore trait: per-card-instance state, keyed by instance id.
//!
//! Handlers keep whatever they need between a card's creation and its
//! callbacks here (form fields, counters, rosters). Entries carry an expiry
//! so state does not outlive the card it belongs to.

use std::time::Duration;

use async_trait::async_trait;

use crate::card::CardInstanceId;
use crate::error::StoreError;

#[async_trait]
pub trait InstanceStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Human-readable backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Fetch the live value for an instance. Expired entries read as `None`.
    async fn get(&self, id: &CardInstanceId) -> Result<Option<V>, StoreError>;

    /// Insert or replace, using the store's default time-to-live.
    async fn put(&self, id: CardInstanceId, value: V) -> Result<(), StoreError>;

    /// Insert or replace with an explicit time-to-live.
    async fn put_with_ttl(
        &self,
        id: CardInstanceId,
        value: V,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove an instance, returning its live value if there was one.
    async fn remove(&self, id: &CardInstanceId) -> Result<Option<V>, StoreError>;

    /// Number of entries currently held (including not-yet-purged expired ones).
    async fn len(&self) -> Result<usize, StoreError>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}
