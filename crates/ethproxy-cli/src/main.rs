//! # eth-proxy entry point
//!
//! Loads configuration (YAML file, superseded by `ETH_PROXY_*` environment
//! variables), initializes logging and metrics, connects the node pool and
//! serves until SIGINT.
//!
//! ## Usage
//!
//! ```bash
//! # Run with a config file
//! eth-proxy --config ./config.yml
//!
//! # Or configure through the environment alone
//! export ETH_PROXY_URLS=http://127.0.0.1:8545,http://127.0.0.1:8546
//! eth-proxy
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use ethproxy_common::config::{Config, LogFormat};
use ethproxy_common::BuildInfo;
use ethproxy_pool::{AlloyConnector, EthConnector, NodePool};
use ethproxy_server::Service;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Multi-node Ethereum JSON-RPC proxy with REST API
#[derive(FromArgs)]
struct Cli {
    /// path to the YAML config file
    #[argh(option, default = "PathBuf::from(\"config.yml\")")]
    config: PathBuf,
}

fn init_logging(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level().as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match cfg.log_format() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let mut cfg = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    cfg.sanitize();

    init_logging(&cfg);

    let build_info = BuildInfo::default();
    info!(
        service = build_info.service,
        version = build_info.version,
        "build info"
    );

    let metrics = ethproxy_server::metrics::install_recorder()
        .context("installing metrics recorder")?;

    let pool = NodePool::connect(&cfg.urls, |url| {
        AlloyConnector::dial(url).map(|c| Arc::new(c) as Arc<dyn EthConnector>)
    })
    .context("connecting to upstream nodes")?;
    info!(nodes = pool.len(), "connected node pool");

    let mut service = Service::new(cfg.port, Arc::new(pool), build_info, metrics);
    service.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("received interrupt signal");

    service.stop().await;
    Ok(())
}
