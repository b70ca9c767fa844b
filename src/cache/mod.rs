//! Replicated route cache collaborator and the named-lock guard.
//!
//! The core only requires get-with-remote / set-with-replicate semantics;
//! TTL and replication are properties of the cache implementation.
//! Entries are type-erased (`Any`) so the cache can hold route records
//! without the core owning the storage engine's value model.

mod guard;

pub use guard::{KeyLocks, LockRef};

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::context::CallContext;
use crate::errors::DispatchError;

/// Type-erased cache entry.
pub type CacheEntry = Arc<dyn Any + Send + Sync>;

/// Tenant-scoped cache with remote-replication fallback.
#[async_trait]
pub trait ReplicatedCache: Send + Sync {
    /// Local lookup, falling back to the replicated peer on a miss.
    async fn get_with_remote(
        &self,
        ctx: &CallContext,
        tenant: &str,
        key: &str,
    ) -> Result<Option<CacheEntry>, DispatchError>;

    /// Local set, written through to the replicated peer.
    async fn set_with_replicate(
        &self,
        ctx: &CallContext,
        tenant: &str,
        key: &str,
        value: CacheEntry,
    ) -> Result<(), DispatchError>;

    /// Drop a local entry.
    async fn remove(&self, ctx: &CallContext, tenant: &str, key: &str);
}

/// Shared cache handle.
pub type SharedCache = Arc<dyn ReplicatedCache>;

struct StoredEntry {
    value: CacheEntry,
    stored_at: Instant,
}

/// In-memory cache with optional TTL and an optional replicated peer.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, StoredEntry>>,
    ttl: Option<Duration>,
    remote: Option<SharedCache>,
}

impl MemoryCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            remote: None,
        }
    }

    /// Attach a replicated peer consulted on local misses and written
    /// through on sets.
    pub fn with_remote(mut self, remote: SharedCache) -> Self {
        self.remote = Some(remote);
        self
    }

    fn local_get(&self, full_key: &str) -> Option<CacheEntry> {
        let expired = {
            let entries = self.entries.read().unwrap();
            let entry = entries.get(full_key)?;
            match self.ttl {
                Some(ttl) if entry.stored_at.elapsed() >= ttl => true,
                _ => return Some(entry.value.clone()),
            }
        };
        if expired {
            self.entries.write().unwrap().remove(full_key);
            debug!(key = %full_key, "cache entry expired");
        }
        None
    }
}

#[async_trait]
impl ReplicatedCache for MemoryCache {
    async fn get_with_remote(
        &self,
        ctx: &CallContext,
        tenant: &str,
        key: &str,
    ) -> Result<Option<CacheEntry>, DispatchError> {
        let full_key = format!("{tenant}:{key}");
        if let Some(value) = self.local_get(&full_key) {
            return Ok(Some(value));
        }
        if let Some(remote) = &self.remote {
            if let Some(value) = remote.get_with_remote(ctx, tenant, key).await? {
                self.entries.write().unwrap().insert(
                    full_key,
                    StoredEntry {
                        value: value.clone(),
                        stored_at: Instant::now(),
                    },
                );
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn set_with_replicate(
        &self,
        ctx: &CallContext,
        tenant: &str,
        key: &str,
        value: CacheEntry,
    ) -> Result<(), DispatchError> {
        let full_key = format!("{tenant}:{key}");
        self.entries.write().unwrap().insert(
            full_key,
            StoredEntry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        if let Some(remote) = &self.remote {
            remote.set_with_replicate(ctx, tenant, key, value).await?;
        }
        Ok(())
    }

    async fn remove(&self, _ctx: &CallContext, tenant: &str, key: &str) {
        self.entries
            .write()
            .unwrap()
            .remove(&format!("{tenant}:{key}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: &str) -> CacheEntry {
        Arc::new(v.to_string())
    }

    fn as_str(e: &CacheEntry) -> String {
        e.downcast_ref::<String>().unwrap().clone()
    }

    #[tokio::test]
    async fn test_local_get_set() {
        let cache = MemoryCache::new(None);
        let ctx = CallContext::background();

        assert!(cache.get_with_remote(&ctx, "t", "k").await.unwrap().is_none());
        cache
            .set_with_replicate(&ctx, "t", "k", entry("v"))
            .await
            .unwrap();
        let got = cache.get_with_remote(&ctx, "t", "k").await.unwrap().unwrap();
        assert_eq!(as_str(&got), "v");

        cache.remove(&ctx, "t", "k").await;
        assert!(cache.get_with_remote(&ctx, "t", "k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new(Some(Duration::from_secs(10)));
        let ctx = CallContext::background();
        cache
            .set_with_replicate(&ctx, "t", "k", entry("v"))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get_with_remote(&ctx, "t", "k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get_with_remote(&ctx, "t", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_fallback_populates_local() {
        let remote = Arc::new(MemoryCache::new(None));
        let ctx = CallContext::background();
        remote
            .set_with_replicate(&ctx, "t", "k", entry("replicated"))
            .await
            .unwrap();

        let local = MemoryCache::new(None).with_remote(remote.clone());
        let got = local.get_with_remote(&ctx, "t", "k").await.unwrap().unwrap();
        assert_eq!(as_str(&got), "replicated");

        // now served locally even if the peer loses it
        remote.remove(&ctx, "t", "k").await;
        assert!(local.get_with_remote(&ctx, "t", "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_replicates_to_peer() {
        let remote = Arc::new(MemoryCache::new(None));
        let local = MemoryCache::new(None).with_remote(remote.clone());
        let ctx = CallContext::background();

        local
            .set_with_replicate(&ctx, "t", "k", entry("v"))
            .await
            .unwrap();
        assert!(remote.get_with_remote(&ctx, "t", "k").await.unwrap().is_some());
    }
}
