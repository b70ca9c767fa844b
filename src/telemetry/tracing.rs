use anyhow::Result;
use tracing::info;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::TelemetryConfig;

/// Initialize tracing with config-based settings.
///
/// The environment filter (`RUST_LOG`) wins over the configured level.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;
    } else {
        subscriber
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;
    }

    info!(
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "tracing initialized"
    );

    Ok(())
}
