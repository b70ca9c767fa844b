//! Read-only event view handed to filter evaluation.

use serde_json::{Map, Value};

use super::options::{OPT_METHOD, OPT_SUBSYS};
use super::Event;

/// Section key exposing the request payload.
pub const META_REQ: &str = "*req";
/// Section key exposing the API options.
pub const META_OPTS: &str = "*opts";
/// Section key exposing per-dispatch variables (subsystem, method).
pub const META_VARS: &str = "*vars";

/// The event as seen by filter expressions: request fields under `*req`,
/// options under `*opts` and routing variables under `*vars`.
#[derive(Debug, Clone)]
pub struct EventView {
    req: Map<String, Value>,
    opts: Map<String, Value>,
    vars: Map<String, Value>,
}

impl EventView {
    /// Snapshot an event for filter evaluation.
    pub fn new(ev: &Event, subsys: &str, method: &str) -> Self {
        let mut vars = Map::new();
        vars.insert(OPT_SUBSYS.to_string(), Value::String(subsys.to_string()));
        vars.insert(OPT_METHOD.to_string(), Value::String(method.to_string()));
        Self {
            req: ev.payload.clone(),
            opts: ev.opts.clone(),
            vars,
        }
    }

    /// Look up a field by section and name, e.g. `("*req", "Account")`.
    pub fn field(&self, section: &str, name: &str) -> Option<&Value> {
        let map = match section {
            META_REQ => &self.req,
            META_OPTS => &self.opts,
            META_VARS => &self.vars,
            _ => return None,
        };
        map.get(name)
    }

    /// Field rendered as a string, if present.
    pub fn field_as_str(&self, section: &str, name: &str) -> Option<String> {
        self.field(section, name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
