//! Dynamic service gateway.
//!
//! ```text
//!   gateway.toml ──▶ ConfigStore ──▶ ServiceDescriptors
//!                         │                 │
//!                         ▼                 ▼
//!                  ModuleResolver ──▶ RouterRegistry ──▶ filtered mounts
//!                                           │
//!   request ──▶ GatewayServer ──────────────┴──▶ /users/..., /products/...
//!                    │
//!                    └──▶ /, /health, /gateway/* (status and management)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use service_gateway::config::{
    descriptors_from_mounts, watcher::ConfigWatcher, ConfigError, ConfigOptions, ConfigStore, MissingFilePolicy,
};
use service_gateway::lifecycle::{shutdown_signal, Shutdown};
use service_gateway::module::ModuleResolver;
use service_gateway::observability::logging::{init_logging, LogFormat};
use service_gateway::observability::metrics::init_metrics;
use service_gateway::routing::{RegistryOptions, RouterRegistry};
use service_gateway::GatewayServer;

#[derive(Debug, Parser)]
#[command(name = "service-gateway", version, about = "Mount service modules behind a single HTTP gateway")]
struct Args {
    /// Configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Fail instead of falling back to defaults when the file is missing.
    #[arg(long)]
    require_config: bool,

    /// Reload the configuration when the file changes.
    #[arg(long)]
    watch: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_format)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");

    let policy = if args.require_config {
        MissingFilePolicy::Required
    } else {
        MissingFilePolicy::UseDefaults
    };
    let config = Arc::new(ConfigStore::from_process_env(
        ConfigOptions::from_file(&args.config).with_missing_file(policy),
    )?);
    let gateway = config.get_gateway_config();

    let descriptors = descriptors_from_mounts(config.current().mounts()).map_err(ConfigError::Validation)?;

    let base_dir = args
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let resolver = Arc::new(ModuleResolver::new().with_base_dir(base_dir));

    let registry = Arc::new(RouterRegistry::new(
        descriptors,
        resolver,
        Arc::clone(&config),
        RegistryOptions::from_gateway(&gateway),
    )?);

    let results = registry.load_all().await;
    let loaded = results.values().filter(|r| r.is_loaded()).count();
    tracing::info!(
        loaded,
        failed = results.len() - loaded,
        reload_policy = ?registry.reload_policy(),
        "Services loaded"
    );

    if let Some(address) = &gateway.metrics_address {
        match address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr)?,
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    // Dropping the watcher stops it, so it lives until main returns.
    let _watcher = if args.watch || gateway.watch_config {
        match ConfigWatcher::new(Arc::clone(&config)) {
            Some(watcher) => Some(watcher.run()?),
            None => {
                tracing::warn!("No configuration file to watch");
                None
            }
        }
    } else {
        None
    };

    if gateway.admin_token.is_none() {
        tracing::warn!("No admin_token configured; management endpoints are unauthenticated");
    }

    let listener = TcpListener::bind(gateway.bind_address()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        request_timeout = ?Duration::from_secs(gateway.request_timeout_secs),
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(registry, config);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = shutdown_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
