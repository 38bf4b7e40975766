//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the blog handlers behind the request adapter
//! - Wire up middleware (request ID, tracing)
//! - Bind the server to a listener with connect info for client addresses
//! - Run the rate-limiter idle sweep alongside the server
//! - Stop on the shutdown broadcast

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::MethodFilter;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers::{HealthHandler, LoginHandler, RegisterHandler};
use crate::http::adapter::RequestAdapter;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::metrics;
use crate::security::password::CredentialHasher;
use crate::security::rate_limit::ClientRateLimiter;
use crate::store::UserStore;

/// HTTP server for the blog backend.
pub struct HttpServer {
    router: Router,
    adapter: RequestAdapter,
    config: AppConfig,
}

impl HttpServer {
    /// Create a server with the production credential hasher.
    pub fn new(config: AppConfig, store: Arc<dyn UserStore>) -> Self {
        Self::with_hasher(config, store, CredentialHasher::default())
    }

    pub fn with_hasher(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        hasher: CredentialHasher,
    ) -> Self {
        let adapter = RequestAdapter::from_config(&config);
        let router = Self::build_router(&config, &adapter, store, Arc::new(hasher));
        Self {
            router,
            adapter,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &AppConfig,
        adapter: &RequestAdapter,
        store: Arc<dyn UserStore>,
        hasher: Arc<CredentialHasher>,
    ) -> Router {
        let login = LoginHandler::new(Arc::clone(&store), Arc::clone(&hasher));
        let register = RegisterHandler::new(store, hasher, config.security.salt_size);

        Router::new()
            .route("/health", adapter.route(MethodFilter::GET, HealthHandler))
            .route("/login", adapter.route(MethodFilter::POST, login))
            .route("/register", adapter.route(MethodFilter::POST, register))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiter(&self) -> &Arc<ClientRateLimiter> {
        self.adapter.limiter()
    }

    /// Serve on `listener` until the shutdown broadcast fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            errors_in_response = self.config.errors_in_response,
            ip_rate_limit = self.config.rate_limit.ip_rate_limit,
            burst_rate_limit = self.config.rate_limit.burst_rate_limit,
            "HTTP server starting"
        );

        let sweeper = spawn_sweeper(
            Arc::clone(self.adapter.limiter()),
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
            shutdown.resubscribe(),
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "rate limiter sweep task failed");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Periodically drop buckets that have sat idle long enough to refill.
fn spawn_sweeper(
    limiter: Arc<ClientRateLimiter>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let removed = limiter.sweep_idle(limiter.full_refill_time());
                    let tracked = limiter.tracked_clients();
                    metrics::record_tracked_clients(tracked);
                    if removed > 0 {
                        tracing::debug!(removed, tracked, "swept idle rate limiter buckets");
                    }
                }
            }
        }
    })
}
