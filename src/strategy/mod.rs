//! Host ordering strategies.
//!
//! A sorter turns a profile's host snapshot into an ordered list of host
//! IDs, keeping only hosts whose filters pass. A host marked as blocker
//! ends candidate evaluation once it passes.

mod load;

pub use load::{LoadMetrics, DEFAULT_RATIO_PARAM, RATIO_PARAM};

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::CallContext;
use crate::errors::DispatchError;
use crate::event::EventView;
use crate::filter::FilterEngine;
use crate::profile::{HostProfile, Strategy};

/// Pseudo-random source without external state; good enough for
/// load-spreading, not for anything security-relevant.
#[derive(Debug)]
pub struct XorShift {
    state: AtomicUsize,
}

impl XorShift {
    pub fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> usize {
        let mut s = self.state.fetch_add(1, Ordering::Relaxed);
        if s == 0 {
            s = 1;
        }
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.state.store(s, Ordering::Relaxed);
        s
    }
}

impl Default for XorShift {
    fn default() -> Self {
        Self::new()
    }
}

/// Orders a host snapshot for one dispatch attempt.
#[derive(Debug)]
pub enum HostSorter {
    /// Natural (weight) order is authoritative.
    NoSort,
    /// Randomized permutation per call.
    Random(XorShift),
    /// Rotating start index; cycles through all hosts before repeating.
    RoundRobin(AtomicUsize),
}

impl HostSorter {
    /// Sorter matching a declared single-result strategy.
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Random => HostSorter::Random(XorShift::new()),
            Strategy::RoundRobin => HostSorter::RoundRobin(AtomicUsize::new(0)),
            Strategy::Weight | Strategy::Broadcast => HostSorter::NoSort,
        }
    }

    /// Ordered, filter-passing host IDs for the event.
    pub async fn sort(
        &self,
        filters: &dyn FilterEngine,
        ctx: &CallContext,
        tenant: &str,
        ev: &EventView,
        hosts: &[HostProfile],
    ) -> Result<Vec<String>, DispatchError> {
        match self {
            HostSorter::NoSort => matching_hosts(filters, ctx, tenant, ev, hosts.iter()).await,
            HostSorter::Random(rng) => {
                let mut shuffled: Vec<&HostProfile> = hosts.iter().collect();
                for i in (1..shuffled.len()).rev() {
                    shuffled.swap(i, rng.next() % (i + 1));
                }
                matching_hosts(filters, ctx, tenant, ev, shuffled.into_iter()).await
            }
            HostSorter::RoundRobin(next) => {
                if hosts.is_empty() {
                    return Ok(Vec::new());
                }
                let start = next.fetch_add(1, Ordering::Relaxed) % hosts.len();
                let rotated = hosts[start..].iter().chain(hosts[..start].iter());
                matching_hosts(filters, ctx, tenant, ev, rotated).await
            }
        }
    }
}

/// Host IDs passing their filters, in iteration order, honoring blockers.
pub async fn matching_hosts<'a>(
    filters: &dyn FilterEngine,
    ctx: &CallContext,
    tenant: &str,
    ev: &EventView,
    hosts: impl Iterator<Item = &'a HostProfile>,
) -> Result<Vec<String>, DispatchError> {
    let mut ids = Vec::new();
    for host in hosts {
        if filters.pass(ctx, tenant, &host.filter_ids, ev).await? {
            ids.push(host.id.clone());
            if host.blocker {
                break;
            }
        }
    }
    Ok(ids)
}
