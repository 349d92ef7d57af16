//! Tracing subscriber setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_output: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_subscriber(config: &TelemetryConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_output);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: TelemetryConfig = serde_yaml_ng::from_str("json_output: true").unwrap();
        assert_eq!(config.level, "info");
        assert!(config.json_output);
    }
}
