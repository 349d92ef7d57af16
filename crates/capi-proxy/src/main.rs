//! `capi` binary entrypoint.
//!
//! Loads `capi.yml` (or `--config`), applies environment and flag overrides,
//! and starts the Actix Web server.

use std::path::PathBuf;

use capi_proxy::{serve, telemetry, ProxyConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "capi", version, about = "OpenAI-compatible chat completion gateway")]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "CAPI_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config and HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ProxyConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    telemetry::init_subscriber(&config.logging);
    serve(config).await
}
