//! Blog backend server.
//!
//! ```text
//! client ──▶ axum (request id, trace) ──▶ RequestAdapter ──▶ handler ──▶ UserStore
//!                                          │ rate limiter      │
//!                                          │ deadline context  └─▶ CredentialHasher
//!                                          └ error policy, access log
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use blog_backend::config::loader::{self, ConfigError};
use blog_backend::config::validation::validate_config;
use blog_backend::config::AppConfig;
use blog_backend::observability::{logging, metrics};
use blog_backend::store::InMemoryUserStore;
use blog_backend::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "blog-backend")]
#[command(about = "Blog backend with rate-limited registration and login", long_about = None)]
struct Cli {
    /// Config file (defaults to the first of ./config.toml,
    /// ~/.blog-backend-config.toml, /etc/blog-backend-config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Log every user store query
    #[arg(long)]
    database_log_queries: Option<bool>,

    /// Echo handler failure messages to clients
    #[arg(long)]
    errors_in_response: Option<bool>,

    /// Tokens per second per client
    #[arg(long)]
    ip_rate_limit: Option<f64>,

    /// Bucket capacity per client
    #[arg(long)]
    burst_rate_limit: Option<u32>,
}

impl Cli {
    /// Flags win over file and environment.
    fn apply(self, config: &mut AppConfig) {
        if let Some(level) = self.log_level {
            config.log.level = level.to_ascii_lowercase();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(v) = self.database_log_queries {
            config.database.log_queries = v;
        }
        if let Some(v) = self.errors_in_response {
            config.errors_in_response = v;
        }
        if let Some(v) = self.ip_rate_limit {
            config.rate_limit.ip_rate_limit = v;
        }
        if let Some(v) = self.burst_rate_limit {
            config.rate_limit.burst_rate_limit = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = loader::resolve_config_path(cli.config.as_deref());
    let mut config = loader::load(config_path.as_deref())?;
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.log.level, config.log.format);
    tracing::info!("blog-backend v{} starting", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "Config file loaded"),
        None => tracing::info!("No config file found, using defaults"),
    }
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        ip_rate_limit = config.rate_limit.ip_rate_limit,
        burst_rate_limit = config.rate_limit.burst_rate_limit,
        handler_timeout_secs = config.timeouts.handler_secs,
        errors_in_response = config.errors_in_response,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_socket_addr() {
            Some(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            None => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(InMemoryUserStore::new(config.database.log_queries));

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, store);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown.clone().trigger_on_ctrl_c());

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
