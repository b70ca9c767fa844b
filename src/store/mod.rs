//! Data-store collaborator: routing profiles and registered hosts.
//!
//! Persistence engines live behind [`DataStore`]; the core only needs
//! tenant-scoped lookups. [`MemoryStore`] is the volatile implementation
//! used by tests and in-process embeddings.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::profile::RoutingProfile;
use crate::registry::RemoteHost;

/// Tenant-scoped lookups consumed by the dispatch core.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Routing profile by tenant and ID; `NOT_FOUND:PROFILE` when absent.
    async fn routing_profile(
        &self,
        ctx: &CallContext,
        tenant: &str,
        id: &str,
    ) -> Result<Arc<RoutingProfile>, DispatchError>;

    /// Registered host by tenant and ID; `HOST_NOT_FOUND` when absent.
    async fn remote_host(
        &self,
        ctx: &CallContext,
        tenant: &str,
        id: &str,
    ) -> Result<Arc<RemoteHost>, DispatchError>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn DataStore>;

/// In-memory store. Thread-safe; all data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<String, Arc<RoutingProfile>>>,
    hosts: RwLock<HashMap<String, Arc<RemoteHost>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a routing profile.
    pub fn set_profile(&self, profile: RoutingProfile) {
        self.profiles
            .write()
            .unwrap()
            .insert(profile.tenant_id(), Arc::new(profile));
    }

    /// Remove a routing profile; callers should also invalidate any cached
    /// dispatcher built from it.
    pub fn remove_profile(&self, tenant: &str, id: &str) {
        self.profiles.write().unwrap().remove(&format!("{tenant}:{id}"));
    }

    /// Insert or replace a registered host.
    pub fn set_host(&self, host: RemoteHost) {
        self.hosts
            .write()
            .unwrap()
            .insert(host.tenant_id(), Arc::new(host));
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn routing_profile(
        &self,
        _ctx: &CallContext,
        tenant: &str,
        id: &str,
    ) -> Result<Arc<RoutingProfile>, DispatchError> {
        self.profiles
            .read()
            .unwrap()
            .get(&format!("{tenant}:{id}"))
            .cloned()
            .ok_or(DispatchError::ProfileNotFound)
    }

    async fn remote_host(
        &self,
        _ctx: &CallContext,
        tenant: &str,
        id: &str,
    ) -> Result<Arc<RemoteHost>, DispatchError> {
        self.hosts
            .read()
            .unwrap()
            .get(&format!("{tenant}:{id}"))
            .cloned()
            .ok_or(DispatchError::HostNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_lookup() {
        let store = MemoryStore::new();
        store.set_profile(RoutingProfile {
            tenant: "cgrates.org".into(),
            id: "P1".into(),
            ..Default::default()
        });

        let ctx = CallContext::background();
        assert!(store.routing_profile(&ctx, "cgrates.org", "P1").await.is_ok());
        assert_eq!(
            store
                .routing_profile(&ctx, "cgrates.org", "P2")
                .await
                .unwrap_err(),
            DispatchError::ProfileNotFound
        );
        // tenant scoping
        assert!(store.routing_profile(&ctx, "other.org", "P1").await.is_err());
    }

    #[tokio::test]
    async fn test_host_lookup() {
        let store = MemoryStore::new();
        let mut host = RemoteHost::internal("cgrates.org");
        host.id = "host1".into();
        store.set_host(host);

        let ctx = CallContext::background();
        assert!(store.remote_host(&ctx, "cgrates.org", "host1").await.is_ok());
        assert_eq!(
            store
                .remote_host(&ctx, "cgrates.org", "ghost")
                .await
                .unwrap_err(),
            DispatchError::HostNotFound
        );
    }
}
