//! Recognized API option keys and their typed parse.

use super::{value_as_bool, value_as_i64, Event};
use crate::errors::DispatchError;

/// API-key option key.
pub const OPT_API_KEY: &str = "*apiKey";
/// Route-ID option key, pinning repeated calls to a discovered route.
pub const OPT_ROUTE_ID: &str = "*routeID";
/// Boolean option controlling whether the event is dispatched at all.
pub const OPT_DISPATCHERS: &str = "*dispatchers";
/// Cap on how many matching profiles to consider.
pub const OPT_PROFILES_COUNT: &str = "*profilesCount";
/// Subsystem marker injected by a forwarding dispatcher node.
pub const OPT_SUBSYS: &str = "*subsys";
/// Node-ID marker injected by a forwarding dispatcher node.
pub const OPT_NODE_ID: &str = "*nodeID";
/// Service-method marker, exposed to filters via the event view.
pub const OPT_METHOD: &str = "*method";
/// Processing context marker set on authorization events.
pub const OPT_CONTEXT: &str = "*context";

/// Sentinel tenant/ID marking internal (non-routed) execution.
pub const META_INTERNAL: &str = "*internal";
/// Subsystem marker identifying the dispatcher itself.
pub const META_DISPATCHERS: &str = "*dispatchers";
/// Wildcard subsystem.
pub const META_ANY: &str = "*any";
/// Authorization processing context.
pub const META_AUTH: &str = "*auth";

/// Recognized API options, parsed once at the dispatch boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOpts {
    /// Caller's API key, if supplied.
    pub api_key: Option<String>,
    /// Route-pinning token, if supplied.
    pub route_id: Option<String>,
    /// Cap on matching profiles to consider.
    pub profiles_count: Option<usize>,
    /// Whether dispatching applies to this event (defaults to true).
    pub dispatch: bool,
    /// Forwarding-node subsystem marker, used for loop protection.
    pub subsys: Option<String>,
    /// Forwarding-node ID marker.
    pub node_id: Option<String>,
}

impl DispatchOpts {
    /// Parse the recognized options out of an event's option map.
    ///
    /// Malformed values fail with a conversion error distinct from the
    /// option simply being absent.
    pub fn parse(ev: &Event) -> Result<Self, DispatchError> {
        let dispatch = match ev.opts.get(OPT_DISPATCHERS) {
            Some(v) => value_as_bool(v)?,
            None => true,
        };
        let profiles_count = match ev.opts.get(OPT_PROFILES_COUNT) {
            Some(v) => {
                let n = value_as_i64(v)?;
                if n < 0 {
                    return Err(DispatchError::InvalidFieldConversion(n.to_string()));
                }
                Some(n as usize)
            }
            None => None,
        };
        Ok(Self {
            api_key: ev.opt_str(OPT_API_KEY),
            route_id: ev.opt_str(OPT_ROUTE_ID),
            profiles_count,
            dispatch,
            subsys: ev.opt_str(OPT_SUBSYS),
            node_id: ev.opt_str(OPT_NODE_ID),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let opts = DispatchOpts::parse(&Event::new("t")).unwrap();
        assert!(opts.dispatch);
        assert_eq!(opts.api_key, None);
        assert_eq!(opts.route_id, None);
        assert_eq!(opts.profiles_count, None);
    }

    #[test]
    fn test_parse_recognized_options() {
        let mut ev = Event::new("t");
        ev.opts.insert(OPT_API_KEY.into(), json!("key1"));
        ev.opts.insert(OPT_ROUTE_ID.into(), json!("route1"));
        ev.opts.insert(OPT_PROFILES_COUNT.into(), json!("2"));
        ev.opts.insert(OPT_DISPATCHERS.into(), json!(false));

        let opts = DispatchOpts::parse(&ev).unwrap();
        assert_eq!(opts.api_key.as_deref(), Some("key1"));
        assert_eq!(opts.route_id.as_deref(), Some("route1"));
        assert_eq!(opts.profiles_count, Some(2));
        assert!(!opts.dispatch);
    }

    #[test]
    fn test_malformed_profiles_count_is_conversion_error() {
        let mut ev = Event::new("t");
        ev.opts.insert(OPT_PROFILES_COUNT.into(), json!("plenty"));
        assert!(matches!(
            DispatchOpts::parse(&ev),
            Err(DispatchError::InvalidFieldConversion(_))
        ));
    }
}
