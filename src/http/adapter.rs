//! Request adapter: the single boundary between axum and business handlers.
//!
//! # Responsibilities
//! - Admission control against the per-client rate limiter
//! - Flatten body and query parameters
//! - Build a deadline-bound execution context and release it on every exit
//! - Invoke the handler and translate its failure into a response
//! - Emit one access-log line and the request metrics
//!
//! ```text
//! Received → RateChecked ─(denied)──────────────────────────────→ Logged
//!                 └─→ ContextBuilt → HandlerInvoked → ResponseWritten → Logged
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{on, MethodFilter, MethodRouter};
use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::http::execution::{ExecutionContext, RequestExecution};
use crate::http::request::{request_id, RequestData, RequestParams};
use crate::observability::metrics;
use crate::security::rate_limit::ClientRateLimiter;

pub const TOO_MANY_REQUESTS: &str = "Too many requests";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";
pub const BAD_REQUEST: &str = "Bad Request";

/// Business logic behind one route.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, exec: &mut RequestExecution) -> AppResult<()>;
}

/// Wraps handlers with rate limiting, execution context and error policy.
#[derive(Clone)]
pub struct RequestAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    limiter: Arc<ClientRateLimiter>,
    errors_in_response: bool,
    handler_timeout: Duration,
    max_body_size: usize,
}

impl RequestAdapter {
    pub fn new(
        limiter: Arc<ClientRateLimiter>,
        errors_in_response: bool,
        handler_timeout: Duration,
        max_body_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                limiter,
                errors_in_response,
                handler_timeout,
                max_body_size,
            }),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(ClientRateLimiter::from_config(&config.rate_limit)),
            config.errors_in_response,
            Duration::from_secs(config.timeouts.handler_secs),
            config.security.max_body_size,
        )
    }

    pub fn limiter(&self) -> &Arc<ClientRateLimiter> {
        &self.inner.limiter
    }

    /// An axum method router that sends matching requests through [`serve`](Self::serve).
    ///
    /// The router must be served with connect info (or `MockConnectInfo` in
    /// tests) so the client address can be extracted.
    pub fn route<H, S>(&self, filter: MethodFilter, handler: H) -> MethodRouter<S>
    where
        H: Handler,
        S: Clone + Send + Sync + 'static,
    {
        let adapter = self.clone();
        let handler: Arc<dyn Handler> = Arc::new(handler);
        on(
            filter,
            move |ConnectInfo(client): ConnectInfo<SocketAddr>, request: Request| {
                let adapter = adapter.clone();
                let handler = Arc::clone(&handler);
                async move { adapter.serve(client, request, handler.as_ref()).await }
            },
        )
    }

    /// Run one request through the pipeline.
    pub async fn serve(
        &self,
        client: SocketAddr,
        request: Request,
        handler: &dyn Handler,
    ) -> Response {
        let start = Instant::now();
        let client_id = client.ip().to_string();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        if !self.inner.limiter.allow(&client_id) {
            let elapsed = start.elapsed();
            tracing::warn!(
                client = %client_id,
                method = %method,
                path = %path,
                status = StatusCode::TOO_MANY_REQUESTS.as_u16(),
                duration = ?elapsed,
                "rate limit exceeded"
            );
            metrics::record_rate_limited();
            metrics::record_request(
                method.as_str(),
                StatusCode::TOO_MANY_REQUESTS.as_u16(),
                elapsed,
            );
            return text_response(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS);
        }

        let span = tracing::info_span!(
            "request",
            request_id = request_id(request.headers()).unwrap_or("unknown"),
            method = %method,
            path = %path,
            client = %client_id
        );

        let (response, params) = self
            .execute(client, request, handler, span.clone())
            .instrument(span.clone())
            .await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();
        span.in_scope(|| {
            tracing::info!(
                method = %method,
                path = %path,
                params = %params,
                status,
                duration = ?elapsed,
                "request completed"
            );
        });
        metrics::record_request(method.as_str(), status, elapsed);
        response
    }

    /// Everything after admission. Returns the response and the loggable params.
    async fn execute(
        &self,
        client: SocketAddr,
        request: Request,
        handler: &dyn Handler,
        span: tracing::Span,
    ) -> (Response, String) {
        let (parts, body) = request.into_parts();

        let bytes = match axum::body::to_bytes(body, self.inner.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                return (text_response(StatusCode::BAD_REQUEST, BAD_REQUEST), String::new());
            }
        };
        let params = RequestParams::parse(parts.uri.query(), &parts.headers, &bytes);
        let log_params = params.to_log_string();

        let (context, release) = ExecutionContext::with_timeout(self.inner.handler_timeout);
        let mut exec = RequestExecution::new(
            RequestData {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                params,
                client,
            },
            context,
            span,
            self.inner.errors_in_response,
        );

        let outcome = AssertUnwindSafe(handler.handle(&mut exec))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(AppError::infrastructure(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        release.release();

        let response = match outcome {
            Ok(()) => exec.into_response(),
            Err(err) => self.failure_response(&err),
        };
        (response, log_params)
    }

    fn failure_response(&self, err: &AppError) -> Response {
        tracing::error!(kind = ?err.kind(), error = %err.detail(), "handler failed");
        let body = if self.inner.errors_in_response {
            err.to_string()
        } else {
            INTERNAL_SERVER_ERROR.to_string()
        };
        text_response(StatusCode::INTERNAL_SERVER_ERROR, body)
    }
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
