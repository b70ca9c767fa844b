//! The dispatch orchestrator.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{self, SharedAttributes};
use crate::cache::KeyLocks;
use crate::config::Config;
use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::{
    DispatchOpts, Event, EventView, META_DISPATCHERS, OPT_API_KEY, OPT_METHOD, OPT_NODE_ID,
    OPT_ROUTE_ID, OPT_SUBSYS,
};
use crate::profile::RoutingProfile;

use super::{dispatcher_for_profile, resolver, DispatcherDeps, DispatcherRoute};

/// Outcome of the route-ID fast path.
enum CachedOutcome {
    /// The cached route settled the call.
    Done(Result<(), DispatchError>),
    /// Continue with full profile resolution, warning when an error led here.
    Fallthrough(Option<DispatchError>),
}

/// Service routing requests towards backend connections, handling
/// partitioning and failover.
pub struct DispatcherService {
    cfg: Config,
    deps: DispatcherDeps,
    attributes: Option<SharedAttributes>,
    locks: Arc<KeyLocks>,
}

impl DispatcherService {
    /// Build the service. Authorization applies when `attributes` is wired.
    pub fn new(cfg: Config, deps: DispatcherDeps, attributes: Option<SharedAttributes>) -> Self {
        if !cfg.dispatcher.attribute_conns.is_empty() && attributes.is_none() {
            warn!("attribute connections configured but no attribute service wired, authorization disabled");
        }
        Self {
            cfg,
            deps,
            attributes,
            locks: KeyLocks::new(),
        }
    }

    /// Forward the request towards the right connection.
    ///
    /// Authorizes when configured, short-circuits to internal execution
    /// when dispatching is disabled for the event, reuses a cached route
    /// when the event carries a route ID and otherwise iterates matching
    /// profiles in weight order with cross-profile failover.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        ev: &mut Event,
        subsys: &str,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        if !method
            .split_once('.')
            .is_some_and(|(svc, m)| !svc.is_empty() && !m.is_empty())
        {
            return Err(DispatchError::UnsupportedServiceMethod);
        }
        let tenant = if ev.tenant.is_empty() {
            self.cfg.general.default_tenant.clone()
        } else {
            ev.tenant.clone()
        };
        if let Some(attributes) = &self.attributes {
            let api_key = ev.opt_str(OPT_API_KEY);
            auth::authorize(attributes.as_ref(), ctx, method, &tenant, api_key.as_deref())
                .await?;
        }

        let opts = DispatchOpts::parse(ev).map_err(|err| DispatchError::dispatcher(&err))?;
        if !opts.dispatch
            || (self.cfg.dispatcher.prevent_loop
                && opts.subsys.as_deref() == Some(META_DISPATCHERS))
        {
            debug!(tenant = %tenant, method = %method, "dispatching disabled, executing internally");
            return self.call_internal(ctx, &tenant, method, args, reply).await;
        }

        // serialize callers sharing a route ID around cache population; the
        // guard is held until the call settles
        let route_key = opts.route_id.as_ref().map(|rid| format!("{rid}:{subsys}"));
        let mut _route_guard = None;
        if let Some(rk) = &route_key {
            let guard_key = format!("DispatcherSv1:{OPT_ROUTE_ID}:{rk}");
            _route_guard = Some(
                self.locks
                    .acquire(&guard_key, self.cfg.general.locking_timeout)
                    .await,
            );
            match self
                .try_cached_route(ctx, ev, &tenant, rk, subsys, method, args, reply)
                .await
            {
                CachedOutcome::Done(res) => return res,
                CachedOutcome::Fallthrough(Some(err)) => {
                    warn!(route_key = %rk, error = %err, "cached routing failed, continuing with normal dispatching");
                }
                CachedOutcome::Fallthrough(None) => {}
            }
        }

        let view = EventView::new(ev, subsys, method);
        let profiles = resolver::profiles_for_event(
            &self.deps,
            &self.cfg.dispatcher,
            ctx,
            &tenant,
            ev,
            &view,
            subsys,
        )
        .await
        .map_err(|err| DispatchError::dispatcher(&err))?;
        if profiles[0].is_internal() {
            return self.call_internal(ctx, &tenant, method, args, reply).await;
        }

        self.inject_loop_protection(ev);
        let view = EventView::new(ev, subsys, method);
        let mut last_err = DispatchError::dispatcher(&DispatchError::ProfileNotFound);
        for prfl in &profiles {
            let dispatcher = match dispatcher_for_profile(
                &self.deps,
                ctx,
                &prfl.tenant,
                &prfl.id,
                Some(prfl),
            )
            .await
            {
                Ok(d) => d,
                Err(err) => {
                    warn!(profile = %prfl.tenant_id(), error = %err, "could not build dispatcher for profile");
                    last_err = err;
                    continue;
                }
            };
            let route = DispatcherRoute {
                tenant: prfl.tenant.clone(),
                profile_id: prfl.id.clone(),
                host_id: None,
            };
            match dispatcher
                .dispatch(
                    &self.deps,
                    ctx,
                    &view,
                    &tenant,
                    route_key.as_deref(),
                    Some(&route),
                    method,
                    args,
                    reply,
                )
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) if !err.should_failover() => return Err(err),
                Err(err) => {
                    warn!(profile = %prfl.tenant_id(), error = %err, "dispatching with profile failed, trying next");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// Resolution results for an event, for admin/introspection callers.
    pub async fn profiles_for_event(
        &self,
        ctx: &CallContext,
        ev: &Event,
    ) -> Result<Vec<Arc<RoutingProfile>>, DispatchError> {
        let tenant = if ev.tenant.is_empty() {
            self.cfg.general.default_tenant.clone()
        } else {
            ev.tenant.clone()
        };
        let subsys = ev.opt_str(OPT_SUBSYS).unwrap_or_default();
        let method = ev.opt_str(OPT_METHOD).unwrap_or_default();
        let view = EventView::new(ev, &subsys, &method);
        resolver::profiles_for_event(
            &self.deps,
            &self.cfg.dispatcher,
            ctx,
            &tenant,
            ev,
            &view,
            &subsys,
        )
        .await
        .map_err(|err| DispatchError::dispatcher(&err))
    }

    /// Log service shutdown.
    pub fn shutdown(&self) {
        info!("dispatcher service shutdown initialized");
        info!("dispatcher service shutdown complete");
    }

    /// Attempt dispatch via a previously discovered route.
    #[allow(clippy::too_many_arguments)]
    async fn try_cached_route(
        &self,
        ctx: &CallContext,
        ev: &mut Event,
        tenant: &str,
        route_key: &str,
        subsys: &str,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> CachedOutcome {
        let entry = match self
            .deps
            .route_cache
            .get_with_remote(ctx, tenant, route_key)
            .await
        {
            Ok(Some(entry)) => entry,
            Ok(None) => return CachedOutcome::Fallthrough(None),
            Err(err) => return CachedOutcome::Fallthrough(Some(err)),
        };
        let route = match entry.downcast::<DispatcherRoute>() {
            Ok(route) => route,
            Err(_) => return CachedOutcome::Fallthrough(Some(DispatchError::CastFailed)),
        };
        let dispatcher = match dispatcher_for_profile(
            &self.deps,
            ctx,
            &route.tenant,
            &route.profile_id,
            None,
        )
        .await
        {
            Ok(d) => d,
            Err(err) => return CachedOutcome::Fallthrough(Some(err)),
        };

        self.inject_loop_protection(ev);
        let view = EventView::new(ev, subsys, method);
        match dispatcher
            .dispatch(
                &self.deps,
                ctx,
                &view,
                tenant,
                None,
                Some(route.as_ref()),
                method,
                args,
                reply,
            )
            .await
        {
            Ok(()) => CachedOutcome::Done(Ok(())),
            Err(err) if !err.should_failover() => CachedOutcome::Done(Err(err)),
            Err(err) => CachedOutcome::Fallthrough(Some(err)),
        }
    }

    /// Execute the call against the local handler instead of routing.
    async fn call_internal(
        &self,
        ctx: &CallContext,
        tenant: &str,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        let conn = self.deps.registry.internal(tenant);
        ctx.run(conn.call(ctx, method, args, reply)).await
    }

    /// Mark the event as already dispatched so a forwarded request does not
    /// re-enter dispatch logic on the receiving node.
    fn inject_loop_protection(&self, ev: &mut Event) {
        ev.opts.insert(
            OPT_SUBSYS.to_string(),
            Value::String(META_DISPATCHERS.to_string()),
        );
        ev.opts.insert(
            OPT_NODE_ID.to_string(),
            Value::String(self.cfg.general.node_id.clone()),
        );
    }
}
