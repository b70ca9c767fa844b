//! Profile resolution: the ordered set of routing profiles matching an event.

use std::sync::Arc;

use tracing::debug;

use crate::config::DispatcherConfig;
use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::{DispatchOpts, Event, EventView, META_ANY, META_DISPATCHERS};
use crate::profile::{sort_profiles, RoutingProfile};

use super::DispatcherDeps;

/// Resolve the profiles matching `ev` for `subsys`, weight-ordered and
/// capped by the event's `*profilesCount` option.
///
/// Returns the internal sentinel profile alone when dispatching is disabled
/// for the event (or loop protection applies), and `NOT_FOUND` when no
/// profile survives filtering.
pub(crate) async fn profiles_for_event(
    deps: &DispatcherDeps,
    cfg: &DispatcherConfig,
    ctx: &CallContext,
    tenant: &str,
    ev: &Event,
    view: &EventView,
    subsys: &str,
) -> Result<Vec<Arc<RoutingProfile>>, DispatchError> {
    let opts = DispatchOpts::parse(ev)?;
    if !opts.dispatch || (cfg.prevent_loop && opts.subsys.as_deref() == Some(META_DISPATCHERS)) {
        return Ok(vec![Arc::new(RoutingProfile::internal())]);
    }

    let any_key = format!("{tenant}:{META_ANY}");
    let index_key = if subsys.is_empty() {
        any_key.clone()
    } else {
        format!("{tenant}:{subsys}")
    };
    let mut ids = deps.filters.matching_ids(ctx, tenant, &index_key, view).await?;
    if (ids.is_empty() || cfg.any_subsystem) && index_key != any_key {
        ids.extend(deps.filters.matching_ids(ctx, tenant, &any_key, view).await?);
    }

    let mut profiles = Vec::with_capacity(ids.len());
    for id in &ids {
        let prfl = match deps.store.routing_profile(ctx, tenant, id).await {
            Ok(prfl) => prfl,
            Err(DispatchError::ProfileNotFound) => continue,
            Err(err) => return Err(err),
        };
        if !prfl.covers_subsystem(subsys) || !prfl.active_at(ev.time) {
            continue;
        }
        if !deps.filters.pass(ctx, tenant, &prfl.filter_ids, view).await? {
            continue;
        }
        profiles.push(prfl);
    }
    if profiles.is_empty() {
        return Err(DispatchError::NotFound);
    }

    sort_profiles(&mut profiles);
    if let Some(cap) = opts.profiles_count {
        profiles.truncate(cap);
    }
    debug!(
        tenant = %tenant,
        subsys = %subsys,
        profiles = profiles.len(),
        "resolved dispatcher profiles"
    );
    Ok(profiles)
}
