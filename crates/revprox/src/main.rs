use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use revprox::config::Config;
use revprox::http::ProxyServer;
use revprox::logging::init_tracing;

const DEFAULT_CONFIG: &str = "config.yaml";

/// Caching HTTP reverse proxy
#[derive(Parser, Debug)]
#[command(name = "revprox")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML config file [default: config.yaml]
    #[arg(short, long, env = "REVPROX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // A config path given explicitly must exist; the default one may not.
    let (path, required) = match args.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let config = Config::load(&path, required)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    init_tracing(config.server.production)?;
    info!(
        origin = %config.origin.origin_url,
        port = %config.server.port,
        max_cost = %config.cache.max_cost,
        "Starting revprox"
    );

    ProxyServer::new(&config)?.run().await
}
