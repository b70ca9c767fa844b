//! Configuration types and YAML loader.

mod loader;
mod types;

pub use types::{CacheConfig, Config, DispatcherConfig, GeneralConfig, TelemetryConfig};
