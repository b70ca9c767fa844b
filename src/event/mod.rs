//! Inbound events and their filterable views.
//!
//! An [`Event`] is the wire-boundary shape: a tenant, an opaque payload map
//! and a loosely-typed API options map. Recognized options are parsed once
//! at the boundary into [`DispatchOpts`]; filter evaluation sees the event
//! through an [`EventView`].

mod options;
mod view;

pub use options::*;
pub use view::{EventView, META_OPTS, META_REQ, META_VARS};

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DispatchError;

static EVENT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// An inbound event addressed to a subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    /// Multi-tenancy partition key; empty means the configured default.
    #[serde(default)]
    pub tenant: String,

    /// Caller-supplied correlation ID.
    #[serde(default)]
    pub id: String,

    /// Event time, used for profile activation gating.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,

    /// Request payload fields.
    #[serde(default)]
    pub payload: Map<String, Value>,

    /// API options (`*apiKey`, `*routeID`, ...).
    #[serde(default)]
    pub opts: Map<String, Value>,
}

impl Event {
    /// Create an event with a process-unique generated ID.
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            id: format!("ev{}", EVENT_COUNTER.fetch_add(1, Ordering::Relaxed)),
            time: Some(Utc::now()),
            payload: Map::new(),
            opts: Map::new(),
        }
    }

    /// String-valued option, if present and non-empty.
    pub fn opt_str(&self, key: &str) -> Option<String> {
        match self.opts.get(key) {
            Some(Value::String(s)) => (!s.is_empty()).then(|| s.clone()),
            Some(Value::Null) | None => None,
            Some(v) => Some(v.to_string()),
        }
    }
}

/// Coerce a JSON value to an i64, accepting numbers and numeric strings.
pub fn value_as_i64(v: &Value) -> Result<i64, DispatchError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| DispatchError::InvalidFieldConversion(n.to_string())),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| DispatchError::InvalidFieldConversion(s.clone())),
        other => Err(DispatchError::InvalidFieldConversion(other.to_string())),
    }
}

/// Coerce a JSON value to a bool, accepting bools and "true"/"false" strings.
pub fn value_as_bool(v: &Value) -> Result<bool, DispatchError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => s
            .parse::<bool>()
            .map_err(|_| DispatchError::InvalidFieldConversion(s.clone())),
        other => Err(DispatchError::InvalidFieldConversion(other.to_string())),
    }
}
