//! Keygate license-validation server.
//!
//! Usage:
//!   ADMIN_TOKEN=... keygate --bind 0.0.0.0:5000 --data-dir /var/lib/keygate

use anyhow::{Context, Result};
use clap::Parser;
use keygate::http::{serve, AppState};
use keygate::{AdminApi, GateConfig, Gatekeeper};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keygate")]
#[command(about = "License-key validation gate with admin API")]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "KEYGATE_BIND")]
    bind: Option<SocketAddr>,

    /// Port on 0.0.0.0, used when --bind is not given
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Directory for keys, bans and the connection ledger
    #[arg(short, long, env = "KEYGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Shared secret for /admin routes
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: String,

    /// Take the client address from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long, env = "KEYGATE_TRUST_FORWARDED")]
    trust_forwarded: bool,

    /// Origin lookup endpoint (ip-api.com compatible)
    #[arg(long, env = "KEYGATE_ORIGIN_ENDPOINT", default_value = keygate::config::DEFAULT_ORIGIN_ENDPOINT)]
    origin_endpoint: String,

    /// Origin lookup deadline in milliseconds
    #[arg(long, env = "KEYGATE_ORIGIN_TIMEOUT_MS", default_value = "2000")]
    origin_timeout_ms: u64,

    /// Disable origin lookups entirely
    #[arg(long, env = "KEYGATE_NO_ORIGIN_LOOKUP")]
    no_origin_lookup: bool,

    /// Freshness window for /admin/active, in seconds
    #[arg(long, env = "KEYGATE_ACTIVE_WINDOW_SECS", default_value = "5")]
    active_window_secs: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<GateConfig> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => GateConfig::default_data_dir()?,
        };

        let mut config = GateConfig::new(self.admin_token, data_dir);
        config.bind_addr = self
            .bind
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], self.port)));
        config.trust_forwarded = self.trust_forwarded;
        config.origin_endpoint = self.origin_endpoint;
        config.origin_timeout = Duration::from_millis(self.origin_timeout_ms);
        config.origin_lookup = !self.no_origin_lookup;
        config.active_window = Duration::from_secs(self.active_window_secs);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = args.into_config().context("invalid configuration")?;
    info!(data_dir = %config.data_dir.display(), "keygate starting");
    if config.trust_forwarded {
        info!("trusting X-Forwarded-For for client addresses");
    }

    let gate = Arc::new(Gatekeeper::open(&config).context("failed to open gate")?);
    let admin = Arc::new(AdminApi::new(&config.admin_token, &gate));
    let state = AppState::new(gate, admin, config.trust_forwarded, config.active_window);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    tokio::select! {
        result = serve(listener, state) => result.context("HTTP server failed")?,
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    Ok(())
}
