/**
 * PROM-CONFIG-API - Prometheus file_sd registry service
 *
 * ROLE: keeps a YAML registry of monitored hosts (hosts.yml, grouped by
 * host type) and regenerates one Prometheus target file per (type, port)
 * every time a host is added or removed through the REST API.
 *
 * BOOTSTRAP: .env -> CLI/env args -> logging -> base dir checks -> target
 * table -> registry store -> axum server until Ctrl-C.
 */

mod config;
mod http;
mod models;
mod store;

use crate::config::{load_config, Args, HOSTS_FILE};
use crate::http::AppState;
use crate::store::RegistryStore;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // fine if there is no .env
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!("prom-config-api {} basedir {}", env!("CARGO_PKG_VERSION"), args.basedir.display());

    if !args.basedir.is_dir() {
        anyhow::bail!("basedir {} does not exist or is not a directory", args.basedir.display());
    }

    let hosts_file = args.basedir.join(HOSTS_FILE);
    ensure_file(&hosts_file).await?;

    let cfg = load_config(args.config.as_deref()).await?;
    let targets = cfg.target_descriptors(&args.basedir)?;
    for (host_type, descriptors) in &targets {
        for d in descriptors {
            debug!("{host_type}: port {} -> {}", d.port, d.path.display());
        }
    }

    let store = Arc::new(RegistryStore::new(hosts_file, targets));
    debug!("registry {}", store.registry_path().display());
    let app = http::build_router(AppState { store });

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", args.listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!("listening on {}...", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received, exiting");
        })
        .await?;

    Ok(())
}

/// Creates an empty registry file if there is none yet.
async fn ensure_file(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    tokio::fs::write(path, "")
        .await
        .with_context(|| format!("cannot create {}", path.display()))?;
    info!("created empty {}", path.display());
    Ok(())
}
