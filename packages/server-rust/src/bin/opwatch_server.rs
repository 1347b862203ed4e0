//! opwatch server binary.
//!
//! Serves scope subscriptions over WebSocket, operation snapshots and the
//! response cache over HTTP, and sweeps expired cache entries in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use opwatch_core::SystemClock;
use opwatch_server::cache::{CacheSweeper, TtlCache};
use opwatch_server::lifecycle::LifecycleManager;
use opwatch_server::network::NetworkModule;
use opwatch_server::orchestrator::Orchestrator;
use opwatch_server::service::{BackgroundWorker, ServerConfig};
use serde_json::Value;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "opwatch-server", version, about = "Operation lifecycle tracking server")]
struct Cli {
    /// Bind address
    #[arg(long, env = "OPWATCH_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port (0 picks a free port)
    #[arg(long, env = "OPWATCH_PORT", default_value_t = 8080)]
    port: u16,

    /// Lifetime of cached responses, in seconds
    #[arg(long, env = "OPWATCH_CACHE_TTL_SECS", default_value_t = 300)]
    cache_ttl_secs: u64,

    /// Upper bound on cached responses (unbounded when unset)
    #[arg(long, env = "OPWATCH_CACHE_MAX_ENTRIES")]
    cache_max_entries: Option<usize>,

    /// Seconds between sweeps of expired cache entries
    #[arg(long, env = "OPWATCH_CACHE_SWEEP_SECS", default_value_t = 60)]
    cache_sweep_secs: u64,

    /// Finished operations kept for lookup
    #[arg(long, env = "OPWATCH_HISTORY_CAPACITY", default_value_t = 100)]
    history_capacity: usize,

    /// Outbound messages buffered per subscriber before dropping
    #[arg(long, env = "OPWATCH_SUBSCRIBER_BUFFER", default_value_t = 256)]
    subscriber_buffer: usize,

    /// Allowed CORS origins, comma separated
    #[arg(long, env = "OPWATCH_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "OPWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "OPWATCH_LOG_JSON")]
    log_json: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "OPWATCH_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.host.clone_from(&self.host);
        config.network.port = self.port;
        config.network.cors_origins.clone_from(&self.cors_origins);
        config.network.connection.outbound_channel_capacity = self.subscriber_buffer;
        config.cache.max_entries = self.cache_max_entries;
        config.cache.sweep_interval = Duration::from_secs(self.cache_sweep_secs);
        config.lifecycle.history_capacity = self.history_capacity;
        config.orchestrator.default_ttl = Duration::from_secs(self.cache_ttl_secs);
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    info!("starting opwatch-server v{}", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let config = cli.server_config();
    config.validate().context("invalid configuration")?;

    let clock = Arc::new(SystemClock);
    let mut network = NetworkModule::new(config.network.clone());
    let lifecycle = Arc::new(LifecycleManager::new(
        network.hub(),
        clock.clone(),
        &config.lifecycle,
    ));

    let cache: Arc<TtlCache<Value>> = Arc::new(TtlCache::new(clock, &config.cache));
    let mut sweeper = BackgroundWorker::start(
        CacheSweeper::new(Arc::clone(&cache)),
        config.cache.sweep_interval,
    );
    let orchestrator = Arc::new(Orchestrator::new(
        cache,
        lifecycle,
        config.orchestrator.clone(),
    ));

    let port = network.start().await?;
    info!(port, "opwatch-server ready");

    network.serve(orchestrator, shutdown_signal()).await?;

    sweeper.stop().await;
    info!("opwatch-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("invalid log level")?;
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
    Ok(())
}
