//! tether agent daemon
//!
//! Enrolls this machine with the management service (identity, keypair,
//! authorization) and then serves inbound remote command execution over the
//! reverse tunnel.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_agent::api::{ApiClient, RetryPolicy};
use tether_agent::tunnel::DialBackTunnel;
use tether_agent::{session, Agent};
use tether_core::config::{self, AgentConfig};
use tether_core::types::ServiceDescriptor;

#[derive(Parser)]
#[command(name = "tether-agent")]
#[command(about = "tether agent - enrolls this machine for remote access")]
#[command(version)]
struct Args {
    /// Management service address, e.g. http://cloud.example.com:8080
    #[arg(short, long, env = "TETHER_SERVER_ADDRESS")]
    server: Option<String>,

    /// Tenant (namespace) to enroll under
    #[arg(short, long, env = "TETHER_TENANT_ID")]
    tenant: Option<String>,

    /// Device identity override (skips interface probing)
    #[arg(long, env = "TETHER_PREFERRED_IDENTITY")]
    identity: Option<String>,

    /// Preferred device hostname
    #[arg(long, env = "TETHER_PREFERRED_HOSTNAME")]
    hostname: Option<String>,

    /// Path to the private key (generated on first start)
    #[arg(short, long, env = "TETHER_PRIVATE_KEY")]
    key: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("tether agent starting...");

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_dir().join("agent.toml"));

    let mut config = if config_path.exists() {
        config::load_config(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", config_path, e);
            AgentConfig::default()
        })
    } else {
        AgentConfig::default()
    };

    // Apply command-line overrides
    if let Some(server) = args.server {
        config.server_address = server;
    }
    if let Some(tenant) = args.tenant {
        config.tenant_id = tenant;
    }
    if args.identity.is_some() {
        config.preferred_identity = args.identity;
    }
    if args.hostname.is_some() {
        config.preferred_hostname = args.hostname;
    }
    if let Some(key) = args.key {
        config.private_key_path = key;
    }

    let service = ServiceDescriptor::parse(&config.server_address)
        .context("invalid server address in configuration")?;

    tracing::info!(service = %service, tenant = %config.tenant_id, "enrolling with service");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        }
    });

    let client = ApiClient::new(
        &service,
        RetryPolicy::unbounded(config.backoff.clone()),
        config.connect_timeout,
        cancel.clone(),
    )
    .context("failed to build HTTP client")?;

    let host_label = service.host.clone();
    let agent = Agent::new(config, service, client, Arc::new(DialBackTunnel));

    // Bootstrap failure is fatal for this run; the supervisor restarts us
    let established = agent.bootstrap().await.context("bootstrap failed")?;

    tracing::info!(
        device = %established.auth.name,
        "enrollment complete, serving sessions"
    );

    session::serve(established.listener, host_label, cancel).await
}
