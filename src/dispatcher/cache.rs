//! Process-local caches for built dispatchers and load metrics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::DispatchError;
use crate::profile::{HostProfile, RoutingProfile};
use crate::strategy::LoadMetrics;

use super::Dispatcher;

/// Caches keyed by `tenant:profile_id`.
///
/// Entries are `Arc`-shared copy-on-write: a rebuild swaps the map entry
/// while in-flight dispatches keep using the variant they already hold.
#[derive(Default)]
pub struct DispatcherCaches {
    dispatchers: RwLock<HashMap<String, Arc<Dispatcher>>>,
    loads: RwLock<HashMap<String, Arc<LoadMetrics>>>,
}

impl DispatcherCaches {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cached dispatcher for a profile key, if any.
    pub fn dispatcher(&self, key: &str) -> Option<Arc<Dispatcher>> {
        self.dispatchers.read().unwrap().get(key).cloned()
    }

    pub(crate) fn store_dispatcher(&self, key: &str, d: Arc<Dispatcher>) {
        self.dispatchers
            .write()
            .unwrap()
            .insert(key.to_string(), d);
    }

    /// Rebuild the dispatcher for a changed profile, replacing any cached
    /// variant and resetting its load metrics.
    pub fn set_profile(&self, profile: &RoutingProfile) -> Result<Arc<Dispatcher>, DispatchError> {
        let d = Arc::new(Dispatcher::new(profile)?);
        let key = profile.tenant_id();
        self.loads.write().unwrap().remove(&key);
        self.store_dispatcher(&key, d.clone());
        Ok(d)
    }

    /// Load metrics for a profile key, built from the host set on first use.
    pub(crate) fn load_metrics(
        &self,
        key: &str,
        hosts: &[HostProfile],
        default_ratio: i64,
    ) -> Result<Arc<LoadMetrics>, DispatchError> {
        if let Some(lm) = self.loads.read().unwrap().get(key) {
            return Ok(lm.clone());
        }
        let lm = Arc::new(LoadMetrics::new(hosts, default_ratio)?);
        // a concurrent builder may have won the race; keep the stored one
        let mut loads = self.loads.write().unwrap();
        Ok(loads.entry(key.to_string()).or_insert(lm).clone())
    }

    /// Drop the cached dispatcher and load metrics for one profile.
    pub fn invalidate_profile(&self, tenant: &str, profile_id: &str) {
        let key = format!("{tenant}:{profile_id}");
        self.dispatchers.write().unwrap().remove(&key);
        self.loads.write().unwrap().remove(&key);
    }

    /// Drop everything (configuration flush).
    pub fn clear(&self) {
        self.dispatchers.write().unwrap().clear();
        self.loads.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(strategy: &str) -> RoutingProfile {
        RoutingProfile {
            tenant: "cgrates.org".into(),
            id: "P1".into(),
            strategy: strategy.into(),
            hosts: vec![HostProfile {
                id: "h1".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_set_profile_swaps_entry() {
        let caches = DispatcherCaches::new();
        let first = caches.set_profile(&profile("*weight")).unwrap();
        let held = caches.dispatcher("cgrates.org:P1").unwrap();
        assert!(Arc::ptr_eq(&first, &held));

        let second = caches.set_profile(&profile("*random")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        // the old Arc stays usable for in-flight dispatches
        assert!(Arc::ptr_eq(
            &second,
            &caches.dispatcher("cgrates.org:P1").unwrap()
        ));
    }

    #[test]
    fn test_set_profile_rejects_unknown_strategy() {
        let caches = DispatcherCaches::new();
        assert!(caches.set_profile(&profile("*quantum")).is_err());
    }

    #[test]
    fn test_load_metrics_cached_per_key() {
        let caches = DispatcherCaches::new();
        let hosts = vec![HostProfile {
            id: "h1".into(),
            ..Default::default()
        }];
        let a = caches.load_metrics("t:P1", &hosts, 1).unwrap();
        let b = caches.load_metrics("t:P1", &hosts, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        caches.invalidate_profile("t", "P1");
        let c = caches.load_metrics("t:P1", &hosts, 1).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
