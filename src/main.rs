//! URL fan-out service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ net::gate ──▶ http::server ──▶ fetch::dispatcher
//!                     (accept)          (N tokens)    (POST /)          │ one task per URL
//!                                                                       ▼
//!     Client Response                                              fetch::client ──▶ Upstream
//!     ◀────────────── {"Url": {url: status}} ◀──── join all ◀────── (GET, deadline)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use url_fanout::config::{load_config, validation::validate_config, ConfigError, FanoutConfig};
use url_fanout::fetch::HttpFetcher;
use url_fanout::net::LimitedListener;
use url_fanout::observability::{logging, metrics};
use url_fanout::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "url-fanout")]
#[command(about = "Fetch many URLs concurrently and report their statuses", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FanoutConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability.log_filter);

    tracing::info!("url-fanout v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        fetch_timeout_ms = config.fetch.timeout_ms,
        max_urls = config.fetch.max_urls,
        grace_period_secs = config.shutdown.grace_period_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let fetcher = HttpFetcher::new(config.fetch.timeout())?;
    let listener = LimitedListener::bind(&config.listener).await?;

    let shutdown = Arc::new(Shutdown::new());
    let server = HttpServer::new(config, fetcher);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move { shutdown.trigger_on_signal().await }
    });

    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
