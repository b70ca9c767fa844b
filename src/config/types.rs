use serde::Deserialize;
use std::time::Duration;

/// Root configuration for the dispatch core.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dispatcher behavior
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Route-cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Global settings
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Tenant applied when an event carries none
    #[serde(default = "default_tenant")]
    pub default_tenant: String,

    /// Identity injected into forwarded requests for loop protection
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Upper bound on named-lock acquisition around route caching
    #[serde(default = "default_locking_timeout", with = "humantime_serde")]
    pub locking_timeout: Duration,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_tenant: default_tenant(),
            node_id: default_node_id(),
            locking_timeout: default_locking_timeout(),
        }
    }
}

fn default_tenant() -> String {
    "cgrates.org".to_string()
}

fn default_node_id() -> String {
    "dispatchd1".to_string()
}

fn default_locking_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Dispatcher behavior
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Attribute-service connection IDs; authorization applies when
    /// non-empty and an attribute service is wired
    #[serde(default)]
    pub attribute_conns: Vec<String>,

    /// Also consult profiles indexed under the `*any` subsystem
    #[serde(default = "default_true")]
    pub any_subsystem: bool,

    /// Execute internally when the event is already marked as dispatched
    #[serde(default)]
    pub prevent_loop: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            attribute_conns: Vec::new(),
            any_subsystem: default_true(),
            prevent_loop: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Route-cache settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// TTL for discovered route records; unset means no expiry
    #[serde(default, with = "humantime_serde::option")]
    pub routes_ttl: Option<Duration>,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log format
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
