//! Dispatcher variants and the dispatch orchestrator.
//!
//! Strategy-bound dispatcher objects perform the remote call with per-host
//! fallback; [`DispatcherService`] is the top-level entry point handling
//! authorization, route-cache fast paths and cross-profile failover.

mod cache;
mod resolver;
mod service;
mod variants;

pub use cache::DispatcherCaches;
pub use service::DispatcherService;
pub use variants::Dispatcher;

use std::sync::Arc;

use crate::cache::SharedCache;
use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::filter::SharedFilters;
use crate::profile::RoutingProfile;
use crate::registry::SharedRegistry;
use crate::store::SharedStore;

/// Route record bound to a caller-supplied route ID: which profile (and
/// host, once discovered) served this route last time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherRoute {
    pub tenant: String,
    pub profile_id: String,
    pub host_id: Option<String>,
}

/// Collaborators injected into the dispatch core at construction.
#[derive(Clone)]
pub struct DispatcherDeps {
    /// Routing profiles and registered hosts.
    pub store: SharedStore,
    /// Filter/index engine.
    pub filters: SharedFilters,
    /// Host connections and the internal handler.
    pub registry: SharedRegistry,
    /// Replicated cache holding discovered routes.
    pub route_cache: SharedCache,
    /// Process-local dispatcher and load-metrics caches.
    pub caches: Arc<DispatcherCaches>,
}

/// Resolve (or build and cache) the dispatcher for a profile.
///
/// When `profile` is absent the profile is fetched from the store, which
/// covers route records referencing profiles not yet seen by this process.
pub(crate) async fn dispatcher_for_profile(
    deps: &DispatcherDeps,
    ctx: &CallContext,
    tenant: &str,
    profile_id: &str,
    profile: Option<&Arc<RoutingProfile>>,
) -> Result<Arc<Dispatcher>, DispatchError> {
    let key = format!("{tenant}:{profile_id}");
    if let Some(d) = deps.caches.dispatcher(&key) {
        return Ok(d);
    }
    let prfl = match profile {
        Some(p) => p.clone(),
        None => deps.store.routing_profile(ctx, tenant, profile_id).await?,
    };
    let d = Arc::new(Dispatcher::new(&prfl)?);
    deps.caches.store_dispatcher(&key, d.clone());
    Ok(d)
}
