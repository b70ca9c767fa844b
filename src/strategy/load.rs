//! Per-host load tracking for the ratio strategy.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::DispatchError;
use crate::event::value_as_i64;
use crate::profile::HostProfile;

/// Host parameter naming its individual ratio.
pub const RATIO_PARAM: &str = "*ratio";
/// Strategy parameter naming the fallback ratio for hosts without one.
pub const DEFAULT_RATIO_PARAM: &str = "*default_ratio";

/// Load counters shared by every in-flight dispatch for one
/// (tenant, profile) combination.
///
/// The increment/decrement pair brackets each outbound call attempt so the
/// counters reflect in-flight work; [`LoadMetrics::get_hosts`] ranks a host
/// snapshot by how under-utilized each host is relative to its ratio.
#[derive(Debug)]
pub struct LoadMetrics {
    state: Mutex<LoadState>,
}

#[derive(Debug, Default)]
struct LoadState {
    loads: HashMap<String, i64>,
    ratios: HashMap<String, i64>,
}

impl LoadMetrics {
    /// Build metrics for a host set; per-host `*ratio` params override
    /// `default_ratio`, malformed values fail with a conversion error.
    pub fn new(hosts: &[HostProfile], default_ratio: i64) -> Result<Self, DispatchError> {
        let mut ratios = HashMap::with_capacity(hosts.len());
        for host in hosts {
            let ratio = match host.params.get(RATIO_PARAM) {
                Some(v) => value_as_i64(v)?,
                None => default_ratio,
            };
            ratios.insert(host.id.clone(), ratio);
        }
        Ok(Self {
            state: Mutex::new(LoadState {
                loads: HashMap::new(),
                ratios,
            }),
        })
    }

    /// Mark one more in-flight call towards `host_id`.
    pub fn increment_load(&self, host_id: &str) {
        let mut state = self.state.lock().unwrap();
        *state.loads.entry(host_id.to_string()).or_insert(0) += 1;
    }

    /// Mark one call towards `host_id` as ended.
    pub fn decrement_load(&self, host_id: &str) {
        let mut state = self.state.lock().unwrap();
        *state.loads.entry(host_id.to_string()).or_insert(0) -= 1;
    }

    /// Current load counter for a host.
    pub fn load(&self, host_id: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .loads
            .get(host_id)
            .copied()
            .unwrap_or(0)
    }

    /// Reorder a host snapshot by utilization cost (load divided by ratio,
    /// ascending; stable for ties). Hosts with ratio 0 are excluded; hosts
    /// with a negative ratio are always eligible at cost 0. Internal load
    /// state is not mutated.
    pub fn get_hosts(&self, hosts: &[HostProfile]) -> Vec<HostProfile> {
        let state = self.state.lock().unwrap();
        let mut costed: Vec<(i64, HostProfile)> = Vec::with_capacity(hosts.len());
        for host in hosts {
            let ratio = state.ratios.get(&host.id).copied().unwrap_or(0);
            let cost = match ratio {
                r if r < 0 => 0,
                0 => continue,
                r => state.loads.get(&host.id).copied().unwrap_or(0) / r,
            };
            costed.push((cost, host.clone()));
        }
        drop(state);
        costed.sort_by_key(|(cost, _)| *cost);
        costed.into_iter().map(|(_, host)| host).collect()
    }
}
