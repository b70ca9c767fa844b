use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.general.node_id.is_empty() {
            anyhow::bail!("general.node_id must not be empty");
        }

        if self.general.locking_timeout.is_zero() {
            anyhow::bail!("general.locking_timeout must be greater than zero");
        }

        for conn in &self.dispatcher.attribute_conns {
            if conn.is_empty() {
                anyhow::bail!("dispatcher.attribute_conns entries must not be empty");
            }
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.general.default_tenant, "cgrates.org");
        assert_eq!(config.general.locking_timeout, Duration::from_secs(5));
        assert!(config.dispatcher.any_subsystem);
        assert!(!config.dispatcher.prevent_loop);
        assert!(config.dispatcher.attribute_conns.is_empty());
        assert_eq!(config.cache.routes_ttl, None);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
general:
  default_tenant: example.com
  node_id: dsp-eu-1
  locking_timeout: 2s

dispatcher:
  attribute_conns: ["attributes1"]
  any_subsystem: false
  prevent_loop: true

cache:
  routes_ttl: 10m

telemetry:
  log_level: debug
  json_logs: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.general.default_tenant, "example.com");
        assert_eq!(config.general.node_id, "dsp-eu-1");
        assert_eq!(config.general.locking_timeout, Duration::from_secs(2));
        assert_eq!(config.dispatcher.attribute_conns, vec!["attributes1"]);
        assert!(!config.dispatcher.any_subsystem);
        assert!(config.dispatcher.prevent_loop);
        assert_eq!(config.cache.routes_ttl, Some(Duration::from_secs(600)));
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Config::from_yaml("general:\n  node_id: \"\"\n").is_err());
        assert!(Config::from_yaml("general:\n  locking_timeout: 0s\n").is_err());
        assert!(Config::from_yaml("dispatcher:\n  attribute_conns: [\"\"]\n").is_err());
    }
}
