//! Routing-profile data model.
//!
//! A [`RoutingProfile`] is a tenant-scoped policy naming the hosts that can
//! serve a subsystem's calls and the strategy used to choose among them.
//! Profiles are immutable once resolved; any ordering produces new Vecs so
//! concurrent dispatches never mutate a shared instance.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DispatchError;
use crate::event::META_INTERNAL;

/// Named host-selection strategy declared on a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Natural weight order is authoritative.
    Weight,
    /// Randomized permutation per call.
    Random,
    /// Rotating start index per call.
    RoundRobin,
    /// Every host receives the call.
    Broadcast,
}

impl FromStr for Strategy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*weight" => Ok(Strategy::Weight),
            "*random" => Ok(Strategy::Random),
            "*round_robin" => Ok(Strategy::RoundRobin),
            "*broadcast" => Ok(Strategy::Broadcast),
            other => Err(DispatchError::UnsupportedStrategy(other.to_string())),
        }
    }
}

/// Time window outside which a profile does not match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationInterval {
    /// Profile is inactive before this time.
    #[serde(default)]
    pub activation_time: Option<DateTime<Utc>>,
    /// Profile is inactive at and after this time.
    #[serde(default)]
    pub expiry_time: Option<DateTime<Utc>>,
}

impl ActivationInterval {
    /// Whether the interval covers `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.activation_time {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.expiry_time {
            if at >= end {
                return false;
            }
        }
        true
    }
}

/// A weighted, filterable reference to one backend connection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostProfile {
    /// Host ID, resolved against the host registry for the same tenant.
    pub id: String,

    /// Filters that must pass for this host to be eligible.
    #[serde(default)]
    pub filter_ids: Vec<String>,

    /// Ordering priority among the profile's hosts.
    #[serde(default)]
    pub weight: f64,

    /// Strategy-specific parameters (e.g. `*ratio`).
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Stop evaluating further hosts once this one is chosen.
    #[serde(default)]
    pub blocker: bool,
}

/// Tenant-scoped routing policy for one or more subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingProfile {
    pub tenant: String,
    pub id: String,

    /// Subsystems this profile applies to; `["*any"]` matches all.
    #[serde(default)]
    pub subsystems: Vec<String>,

    /// Filters that must pass for this profile to match an event.
    #[serde(default)]
    pub filter_ids: Vec<String>,

    /// Declared strategy name, parsed when the dispatcher is built.
    #[serde(default)]
    pub strategy: String,

    /// Strategy parameters (e.g. `*default_ratio`).
    #[serde(default)]
    pub strategy_params: Map<String, Value>,

    /// Ordering priority among matching profiles.
    #[serde(default)]
    pub weight: f64,

    /// Candidate hosts, consulted in weight order.
    #[serde(default)]
    pub hosts: Vec<HostProfile>,

    /// Optional validity window checked against the event time.
    #[serde(default)]
    pub activation_interval: Option<ActivationInterval>,
}

impl RoutingProfile {
    /// Tenant-scoped cache key.
    pub fn tenant_id(&self) -> String {
        format!("{}:{}", self.tenant, self.id)
    }

    /// The sentinel profile signaling internal (non-routed) execution.
    pub fn internal() -> Self {
        Self {
            tenant: META_INTERNAL.to_string(),
            id: META_INTERNAL.to_string(),
            ..Self::default()
        }
    }

    /// Whether this is the internal sentinel.
    pub fn is_internal(&self) -> bool {
        self.tenant == META_INTERNAL && self.id == META_INTERNAL
    }

    /// Whether the profile applies to `subsys`.
    pub fn covers_subsystem(&self, subsys: &str) -> bool {
        (self.subsystems.len() == 1 && self.subsystems[0] == crate::event::META_ANY)
            || self.subsystems.iter().any(|s| s == subsys)
    }

    /// Whether the profile is active at `at` (always, if no interval).
    pub fn active_at(&self, at: Option<DateTime<Utc>>) -> bool {
        match (&self.activation_interval, at) {
            (Some(interval), Some(t)) => interval.is_active_at(t),
            _ => true,
        }
    }

    /// The profile's hosts as a new Vec, stable-sorted by descending weight.
    pub fn hosts_by_weight(&self) -> Vec<HostProfile> {
        let mut hosts = self.hosts.clone();
        sort_by_weight_desc(&mut hosts, |h| h.weight);
        hosts
    }
}

/// Stable descending-weight sort shared by profile and host orderings.
fn sort_by_weight_desc<T>(items: &mut [T], weight: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| {
        weight(b)
            .partial_cmp(&weight(a))
            .unwrap_or(Ordering::Equal)
    });
}

/// Stable-sort profiles by descending weight.
pub fn sort_profiles(profiles: &mut [Arc<RoutingProfile>]) {
    sort_by_weight_desc(profiles, |p| p.weight);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, weight: f64) -> Arc<RoutingProfile> {
        Arc::new(RoutingProfile {
            tenant: "cgrates.org".into(),
            id: id.into(),
            weight,
            ..Default::default()
        })
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("*weight".parse::<Strategy>().unwrap(), Strategy::Weight);
        assert_eq!("*random".parse::<Strategy>().unwrap(), Strategy::Random);
        assert_eq!(
            "*round_robin".parse::<Strategy>().unwrap(),
            Strategy::RoundRobin
        );
        assert_eq!(
            "*broadcast".parse::<Strategy>().unwrap(),
            Strategy::Broadcast
        );
        assert_eq!(
            "*fastest".parse::<Strategy>().unwrap_err().to_string(),
            "unsupported dispatch strategy: <*fastest>"
        );
    }

    #[test]
    fn test_profiles_sort_descending_stable() {
        let mut profiles = vec![
            profile("low", 10.0),
            profile("high", 30.0),
            profile("mid-a", 20.0),
            profile("mid-b", 20.0),
        ];
        sort_profiles(&mut profiles);
        let ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn test_hosts_by_weight_does_not_mutate_profile() {
        let prfl = RoutingProfile {
            hosts: vec![
                HostProfile {
                    id: "h1".into(),
                    weight: 1.0,
                    ..Default::default()
                },
                HostProfile {
                    id: "h2".into(),
                    weight: 2.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let sorted = prfl.hosts_by_weight();
        assert_eq!(sorted[0].id, "h2");
        assert_eq!(prfl.hosts[0].id, "h1");
    }

    #[test]
    fn test_covers_subsystem() {
        let mut prfl = RoutingProfile {
            subsystems: vec!["*any".into()],
            ..Default::default()
        };
        assert!(prfl.covers_subsystem("attributes"));

        prfl.subsystems = vec!["attributes".into(), "sessions".into()];
        assert!(prfl.covers_subsystem("sessions"));
        assert!(!prfl.covers_subsystem("resources"));
    }

    #[test]
    fn test_activation_interval() {
        let now = Utc::now();
        let interval = ActivationInterval {
            activation_time: Some(now - chrono::Duration::hours(1)),
            expiry_time: Some(now + chrono::Duration::hours(1)),
        };
        assert!(interval.is_active_at(now));
        assert!(!interval.is_active_at(now - chrono::Duration::hours(2)));
        assert!(!interval.is_active_at(now + chrono::Duration::hours(2)));
    }

    #[test]
    fn test_internal_sentinel() {
        assert!(RoutingProfile::internal().is_internal());
        assert!(!profile("p1", 1.0).is_internal());
    }
}
