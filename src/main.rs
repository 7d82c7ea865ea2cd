//! gatefront: host-based authenticating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────────┐
//!                      │                       GATEFRONT                       │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌─────────┐             │
//!   ───────────────────┼─▶│  host   │──▶│ registry │──▶│ session │             │
//!                      │  └─────────┘   └──────────┘   └────┬────┘             │
//!                      │                                     ▼                 │
//!                      │                 ┌────────────┐ ┌─────────┐            │
//!                      │                 │ rate limit │◀│ policy  │            │
//!                      │                 └─────┬──────┘ └─────────┘            │
//!                      │                       ▼                               │
//!   Client Response    │                 ┌────────────┐                        │
//!   ◀──────────────────┼─────────────────│  forward   │◀──────────────────────┼── Upstream
//!                      │                 └────────────┘                        │
//!                      │                                                       │
//!                      │  store · audit queue · metrics · admin API · watcher  │
//!                      └───────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use gatefront::config::{load_config, GatewayConfig};
use gatefront::observability::init_logging;

#[derive(Parser)]
#[command(name = "gatefront", version, about = "Host-based authenticating reverse proxy")]
struct Args {
    /// Path to the TOML config file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEFRONT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatefront starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services_source = ?config.services.source,
        refresh_interval_secs = config.services.refresh_interval_secs,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    gatefront::lifecycle::startup::run(config).await?;
    Ok(())
}
