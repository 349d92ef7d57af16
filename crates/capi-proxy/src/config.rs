//! Configuration from defaults, capi.yml and environment variables.
//!
//! ```yaml
//! server:
//!   port: 3000
//! upstream:
//!   base_url: "https://api2.cursor.sh"
//!   request_timeout_secs: 300
//! session:
//!   fresh_per_request: true
//! logging:
//!   level: debug
//! ```
//!
//! **Environment variables** (override the file):
//! - `PORT`: server port (default: 3000)
//! - `HOST`: bind address (default: 0.0.0.0)
//! - `CAPI_UPSTREAM_URL`: upstream base URL
//! - `CAPI_REQUEST_TIMEOUT_SECS`: upstream idle read timeout (default: 300)

use anyhow::{Context, Result};
use capi_protocol::SessionIdentifiers;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::telemetry::TelemetryConfig;

const CONFIG_CANDIDATES: &[&str] = &["capi.yml", "capi.yaml"];

const DEFAULT_CHECKSUM: &str = "zo6Qjequ9b9734d1f13c3438ba25ea31ac93d9287248b9d30434934e9fcbfa6b3b22029e/7e4af391f67188693b722eff0090e8e6608bca8fa320ef20a0ccb5d7d62dfdef";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub upstream: UpstreamConfig,
    pub session: SessionConfig,
    pub logging: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_body_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allow any origin, method and header.
    pub permissive: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { permissive: true }
    }
}

/// Where and how to reach the upstream chat service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub path: String,
    pub connect_timeout_secs: u64,
    /// Longest the upstream may stay silent, while waiting for the response
    /// head or between body reads. A response as a whole has no deadline.
    pub request_timeout_secs: u64,
    pub client_version: String,
    pub timezone: String,
    pub checksum: String,
    pub ghost_mode: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api2.cursor.sh".to_string(),
            path: "/aiserver.v1.AiService/StreamChat".to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: 300,
            client_version: "0.42.3".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            checksum: DEFAULT_CHECKSUM.to_string(),
            ghost_mode: false,
        }
    }
}

impl UpstreamConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// Identifiers embedded in request frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Generate new identifiers for every request instead of reusing
    /// `identifiers`.
    pub fresh_per_request: bool,
    pub identifiers: SessionIdentifiers,
}

impl SessionConfig {
    pub fn identifiers_for_request(&self) -> SessionIdentifiers {
        if self.fresh_per_request {
            SessionIdentifiers {
                workspace_path: self.identifiers.workspace_path.clone(),
                ..SessionIdentifiers::generate()
            }
        } else {
            self.identifiers.clone()
        }
    }
}

impl ProxyConfig {
    /// Load from `path`, or from the first config file found in the working
    /// directory, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(find_config_file);
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(url) = lookup("CAPI_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(secs) = lookup("CAPI_REQUEST_TIMEOUT_SECS") {
            self.upstream.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid CAPI_REQUEST_TIMEOUT_SECS: {}", secs))?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}
