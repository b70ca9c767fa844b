//! Connection registry: resolves registered hosts to callable connections.
//!
//! Transport mechanics stay behind [`RpcConnection`]; the dispatch core
//! only needs `call(method, args, reply)` over an opaque connection and a
//! local handler for internal (non-routed) execution.

mod mock;

pub use mock::MockConnection;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::META_INTERNAL;

/// An opaque callable connection to one backend instance.
#[async_trait]
pub trait RpcConnection: Send + Sync + std::fmt::Debug {
    /// Perform the remote call, writing the response into `reply`.
    async fn call(
        &self,
        ctx: &CallContext,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError>;
}

/// Shared connection handle.
pub type SharedConnection = Arc<dyn RpcConnection>;

/// Connection details a host profile ID resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteHost {
    pub tenant: String,
    pub id: String,

    /// Transport address (`host:port`).
    #[serde(default)]
    pub address: String,

    /// Transport codec name.
    #[serde(default)]
    pub transport: String,

    /// Whether the connection uses TLS.
    #[serde(default)]
    pub tls: bool,

    /// Dial timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Per-call reply timeout.
    #[serde(default = "default_reply_timeout", with = "humantime_serde")]
    pub reply_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_reply_timeout() -> Duration {
    Duration::from_secs(2)
}

impl RemoteHost {
    /// The internal pseudo-host backing local execution.
    pub fn internal(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            id: META_INTERNAL.to_string(),
            address: META_INTERNAL.to_string(),
            transport: String::new(),
            tls: false,
            connect_timeout: default_connect_timeout(),
            reply_timeout: default_reply_timeout(),
        }
    }

    /// Tenant-scoped key.
    pub fn tenant_id(&self) -> String {
        format!("{}:{}", self.tenant, self.id)
    }
}

/// Resolves hosts to live connections.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Connection for a registered host; `DISCONNECTED` when the host has
    /// no reachable connection.
    async fn connect(
        &self,
        ctx: &CallContext,
        host: &RemoteHost,
    ) -> Result<SharedConnection, DispatchError>;

    /// Connection executing calls against the local/internal handler.
    fn internal(&self, tenant: &str) -> SharedConnection;
}

/// Shared registry handle.
pub type SharedRegistry = Arc<dyn ConnectionRegistry>;

/// Registry over a fixed set of pre-established connections.
///
/// Embedders with real transports implement [`ConnectionRegistry`]
/// themselves; this one covers tests and in-process wiring.
pub struct StaticRegistry {
    conns: RwLock<HashMap<String, SharedConnection>>,
    local: SharedConnection,
}

impl StaticRegistry {
    pub fn new(local: SharedConnection) -> Self {
        Self {
            conns: RwLock::new(HashMap::new()),
            local,
        }
    }

    /// Register a connection under `tenant:host_id`.
    pub fn register(&self, tenant: &str, host_id: &str, conn: SharedConnection) {
        self.conns
            .write()
            .unwrap()
            .insert(format!("{tenant}:{host_id}"), conn);
    }
}

#[async_trait]
impl ConnectionRegistry for StaticRegistry {
    async fn connect(
        &self,
        _ctx: &CallContext,
        host: &RemoteHost,
    ) -> Result<SharedConnection, DispatchError> {
        self.conns
            .read()
            .unwrap()
            .get(&host.tenant_id())
            .cloned()
            .ok_or(DispatchError::Disconnected)
    }

    fn internal(&self, _tenant: &str) -> SharedConnection {
        self.local.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_registry_resolution() {
        let local = Arc::new(MockConnection::success(json!("local")));
        let registry = StaticRegistry::new(local);
        registry.register(
            "cgrates.org",
            "host1",
            Arc::new(MockConnection::success(json!("pong"))),
        );

        let ctx = CallContext::background();
        let mut host = RemoteHost::internal("cgrates.org");
        host.id = "host1".into();
        assert!(registry.connect(&ctx, &host).await.is_ok());

        host.id = "missing".into();
        assert_eq!(
            registry.connect(&ctx, &host).await.unwrap_err(),
            DispatchError::Disconnected
        );
    }
}
