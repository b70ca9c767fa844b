//! Strategy-bound dispatcher variants.
//!
//! Each variant holds a weight-sorted snapshot of the profile's hosts and
//! performs the remote call with per-host fallback. Variants are built by
//! [`Dispatcher::new`] from the profile's declared strategy; an unknown
//! strategy name fails construction.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::EventView;
use crate::profile::{HostProfile, RoutingProfile, Strategy};
use crate::registry::RemoteHost;
use crate::strategy::{matching_hosts, HostSorter, DEFAULT_RATIO_PARAM, RATIO_PARAM};

use super::{DispatcherDeps, DispatcherRoute};

/// A strategy-bound routing object over a profile's host snapshot.
#[derive(Debug)]
pub enum Dispatcher {
    /// First successful host wins; failover-worthy errors try the next.
    SingleResult(SingleResultDispatcher),
    /// Every host receives the call; success if any host accepted.
    Broadcast(BroadcastDispatcher),
    /// Like single-result, with load-counter bracketing and least-loaded
    /// ordering from the profile's ratio parameters.
    LoadRatio(LoadDispatcher),
}

#[derive(Debug)]
pub struct SingleResultDispatcher {
    sorter: HostSorter,
    hosts: Vec<HostProfile>,
}

#[derive(Debug)]
pub struct BroadcastDispatcher {
    hosts: Vec<HostProfile>,
}

#[derive(Debug)]
pub struct LoadDispatcher {
    tenant_profile: String,
    default_ratio: i64,
    sorter: HostSorter,
    hosts: Vec<HostProfile>,
}

impl Dispatcher {
    /// Build the variant declared by the profile's strategy.
    ///
    /// A `*default_ratio` strategy param, or a `*ratio` param on any host,
    /// selects the load-ratio variant for the single-result strategies.
    pub fn new(profile: &RoutingProfile) -> Result<Self, DispatchError> {
        let strategy: Strategy = profile.strategy.parse()?;
        let hosts = profile.hosts_by_weight();
        if strategy == Strategy::Broadcast {
            return Ok(Dispatcher::Broadcast(BroadcastDispatcher { hosts }));
        }
        let sorter = HostSorter::for_strategy(strategy);
        if let Some(dflt) = profile.strategy_params.get(DEFAULT_RATIO_PARAM) {
            let default_ratio = crate::event::value_as_i64(dflt)?;
            return Ok(Dispatcher::LoadRatio(LoadDispatcher {
                tenant_profile: profile.tenant_id(),
                default_ratio,
                sorter,
                hosts,
            }));
        }
        if hosts.iter().any(|h| h.params.contains_key(RATIO_PARAM)) {
            return Ok(Dispatcher::LoadRatio(LoadDispatcher {
                tenant_profile: profile.tenant_id(),
                default_ratio: 1,
                sorter,
                hosts,
            }));
        }
        Ok(Dispatcher::SingleResult(SingleResultDispatcher {
            sorter,
            hosts,
        }))
    }

    /// Perform the call against the variant's host set.
    ///
    /// `route_id` (the composite route key) enables route-cache writes;
    /// `route` carries the profile identity, and a populated `host_id`
    /// short-circuits host selection to the previously discovered host.
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        deps: &DispatcherDeps,
        ctx: &CallContext,
        ev: &EventView,
        tenant: &str,
        route_id: Option<&str>,
        route: Option<&DispatcherRoute>,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        match self {
            Dispatcher::SingleResult(d) => {
                d.dispatch(deps, ctx, ev, tenant, route_id, route, method, args, reply)
                    .await
            }
            Dispatcher::Broadcast(d) => {
                d.dispatch(deps, ctx, ev, tenant, route_id, route, method, args, reply)
                    .await
            }
            Dispatcher::LoadRatio(d) => {
                d.dispatch(deps, ctx, ev, tenant, route_id, route, method, args, reply)
                    .await
            }
        }
    }
}

/// Bind the route record to a concrete host for caching.
fn route_with_host(route: Option<&DispatcherRoute>, host_id: &str) -> Option<DispatcherRoute> {
    route.map(|r| DispatcherRoute {
        tenant: r.tenant.clone(),
        profile_id: r.profile_id.clone(),
        host_id: Some(host_id.to_string()),
    })
}

impl SingleResultDispatcher {
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        deps: &DispatcherDeps,
        ctx: &CallContext,
        ev: &EventView,
        tenant: &str,
        route_id: Option<&str>,
        route: Option<&DispatcherRoute>,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        if let Some(r) = route {
            if let Some(host_id) = &r.host_id {
                // route to the previously discovered host
                return call_host(deps, ctx, tenant, host_id, route_id, Some(r), method, args, reply)
                    .await;
            }
        }
        let host_ids = self
            .sorter
            .sort(deps.filters.as_ref(), ctx, tenant, ev, &self.hosts)
            .await?;
        if host_ids.is_empty() {
            return Err(DispatchError::HostNotFound);
        }
        let mut last_err = DispatchError::HostNotFound;
        for host_id in &host_ids {
            if ctx.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            let bound = route_with_host(route, host_id);
            match call_host(
                deps,
                ctx,
                tenant,
                host_id,
                route_id,
                bound.as_ref(),
                method,
                args,
                reply,
            )
            .await
            {
                Ok(()) => return Ok(()),
                Err(err) if err != DispatchError::HostNotFound && !err.should_failover() => {
                    return Err(err)
                }
                Err(err) => {
                    warn!(host = %host_id, error = %err, "dispatch to host failed, trying next candidate");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }
}

impl BroadcastDispatcher {
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        deps: &DispatcherDeps,
        ctx: &CallContext,
        ev: &EventView,
        tenant: &str,
        route_id: Option<&str>,
        route: Option<&DispatcherRoute>,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        let host_ids =
            matching_hosts(deps.filters.as_ref(), ctx, tenant, ev, self.hosts.iter()).await?;
        let mut targets: Vec<Arc<RemoteHost>> = Vec::with_capacity(host_ids.len());
        for host_id in &host_ids {
            match deps.store.remote_host(ctx, tenant, host_id).await {
                Ok(host) => targets.push(host),
                Err(DispatchError::HostNotFound) => {
                    warn!(host = %host_id, "skipping unknown host in broadcast");
                }
                Err(err) => return Err(DispatchError::dispatcher(&err)),
            }
        }
        if targets.is_empty() {
            return Err(DispatchError::HostNotFound);
        }

        let calls = targets.iter().map(|host| {
            let bound = route_with_host(route, &host.id);
            async move {
                let mut host_reply = Value::Null;
                call_remote(
                    deps,
                    ctx,
                    host,
                    route_id,
                    bound.as_ref(),
                    method,
                    args,
                    &mut host_reply,
                )
                .await
                .map(|()| host_reply)
            }
        });

        let mut accepted = None;
        let mut last_err = DispatchError::HostNotFound;
        for (host, result) in targets.iter().zip(join_all(calls).await) {
            match result {
                Ok(host_reply) => {
                    debug!(host = %host.id, "broadcast target accepted");
                    accepted.get_or_insert(host_reply);
                }
                Err(err) => {
                    warn!(host = %host.id, error = %err, "broadcast target failed");
                    last_err = err;
                }
            }
        }
        match accepted {
            Some(host_reply) => {
                *reply = host_reply;
                Ok(())
            }
            None => Err(last_err),
        }
    }
}

impl LoadDispatcher {
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        deps: &DispatcherDeps,
        ctx: &CallContext,
        ev: &EventView,
        tenant: &str,
        route_id: Option<&str>,
        route: Option<&DispatcherRoute>,
        method: &str,
        args: &Value,
        reply: &mut Value,
    ) -> Result<(), DispatchError> {
        let metrics =
            deps.caches
                .load_metrics(&self.tenant_profile, &self.hosts, self.default_ratio)?;

        if let Some(r) = route {
            if let Some(host_id) = &r.host_id {
                metrics.increment_load(host_id);
                let res =
                    call_host(deps, ctx, tenant, host_id, route_id, Some(r), method, args, reply)
                        .await;
                metrics.decrement_load(host_id);
                match res {
                    Ok(()) => return Ok(()),
                    Err(err) if err != DispatchError::HostNotFound && !err.should_failover() => {
                        return Err(err)
                    }
                    Err(err) => {
                        warn!(host = %host_id, error = %err, "cached route dispatch failed, trying candidates");
                    }
                }
            }
        }

        let ordered = metrics.get_hosts(&self.hosts);
        let host_ids = self
            .sorter
            .sort(deps.filters.as_ref(), ctx, tenant, ev, &ordered)
            .await?;
        if host_ids.is_empty() {
            return Err(DispatchError::HostNotFound);
        }
        let mut last_err = DispatchError::HostNotFound;
        for host_id in &host_ids {
            if ctx.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            let bound = route_with_host(route, host_id);
            metrics.increment_load(host_id);
            let res = call_host(
                deps,
                ctx,
                tenant,
                host_id,
                route_id,
                bound.as_ref(),
                method,
                args,
                reply,
            )
            .await;
            metrics.decrement_load(host_id);
            match res {
                Ok(()) => return Ok(()),
                Err(err) if err != DispatchError::HostNotFound && !err.should_failover() => {
                    return Err(err)
                }
                Err(err) => {
                    warn!(host = %host_id, error = %err, "dispatch to host failed, trying next candidate");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }
}

/// Resolve the host and perform the call.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn call_host(
    deps: &DispatcherDeps,
    ctx: &CallContext,
    tenant: &str,
    host_id: &str,
    route_id: Option<&str>,
    route: Option<&DispatcherRoute>,
    method: &str,
    args: &Value,
    reply: &mut Value,
) -> Result<(), DispatchError> {
    let host = deps.store.remote_host(ctx, tenant, host_id).await?;
    call_remote(deps, ctx, &host, route_id, route, method, args, reply).await
}

/// Record the discovered route (when a route ID is bound), then call the
/// host under its reply timeout.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn call_remote(
    deps: &DispatcherDeps,
    ctx: &CallContext,
    host: &RemoteHost,
    route_id: Option<&str>,
    route: Option<&DispatcherRoute>,
    method: &str,
    args: &Value,
    reply: &mut Value,
) -> Result<(), DispatchError> {
    if let (Some(rid), Some(route)) = (route_id, route) {
        let entry: crate::cache::CacheEntry = Arc::new(route.clone());
        if let Err(err) = deps
            .route_cache
            .set_with_replicate(ctx, &host.tenant, rid, entry)
            .await
        {
            if !err.should_failover() {
                return Err(err);
            }
            warn!(route_id = %rid, error = %err, "ignoring cache network error while recording route");
        }
    }
    let conn = deps.registry.connect(ctx, host).await?;
    let call_ctx = ctx.with_timeout(host.reply_timeout);
    match call_ctx.run(conn.call(&call_ctx, method, args, reply)).await {
        // the host timed out but the caller did not cancel: fail over
        Err(DispatchError::Cancelled) if !ctx.is_cancelled() => Err(DispatchError::ReplyTimeout),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(strategy: &str) -> RoutingProfile {
        RoutingProfile {
            tenant: "cgrates.org".into(),
            id: "P1".into(),
            strategy: strategy.into(),
            hosts: vec![
                HostProfile {
                    id: "h1".into(),
                    weight: 10.0,
                    ..Default::default()
                },
                HostProfile {
                    id: "h2".into(),
                    weight: 20.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_factory_by_strategy() {
        assert!(matches!(
            Dispatcher::new(&profile("*weight")).unwrap(),
            Dispatcher::SingleResult(_)
        ));
        assert!(matches!(
            Dispatcher::new(&profile("*random")).unwrap(),
            Dispatcher::SingleResult(_)
        ));
        assert!(matches!(
            Dispatcher::new(&profile("*broadcast")).unwrap(),
            Dispatcher::Broadcast(_)
        ));
    }

    #[test]
    fn test_factory_unknown_strategy_fails() {
        let err = Dispatcher::new(&profile("*fastest")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported dispatch strategy: <*fastest>"
        );
    }

    #[test]
    fn test_factory_selects_load_ratio() {
        let mut prfl = profile("*weight");
        prfl.strategy_params
            .insert(DEFAULT_RATIO_PARAM.into(), json!(2));
        assert!(matches!(
            Dispatcher::new(&prfl).unwrap(),
            Dispatcher::LoadRatio(_)
        ));

        let mut prfl = profile("*round_robin");
        prfl.hosts[0].params.insert(RATIO_PARAM.into(), json!(3));
        assert!(matches!(
            Dispatcher::new(&prfl).unwrap(),
            Dispatcher::LoadRatio(_)
        ));
    }

    #[test]
    fn test_factory_malformed_default_ratio_fails() {
        let mut prfl = profile("*weight");
        prfl.strategy_params
            .insert(DEFAULT_RATIO_PARAM.into(), json!("many"));
        assert!(matches!(
            Dispatcher::new(&prfl),
            Err(DispatchError::InvalidFieldConversion(_))
        ));
    }

    #[test]
    fn test_hosts_snapshot_weight_sorted() {
        match Dispatcher::new(&profile("*weight")).unwrap() {
            Dispatcher::SingleResult(d) => {
                let ids: Vec<&str> = d.hosts.iter().map(|h| h.id.as_str()).collect();
                assert_eq!(ids, vec!["h2", "h1"]);
            }
            _ => unreachable!(),
        }
    }
}
