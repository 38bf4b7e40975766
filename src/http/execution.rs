//! Per-request execution state handed to handlers.
//!
//! A [`RequestExecution`] bundles the inbound request, a response sink, a
//! deadline-bound cancellable [`ExecutionContext`], the request's tracing
//! span and the error-visibility flag. It is created by the adapter, lent to
//! exactly one handler by `&mut`, and dropped when the handler returns.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Span;

use crate::http::request::{RequestData, RequestParams};

/// Upper bound on a context's lifetime (one year).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Why an execution context is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("context canceled")]
    Canceled,
}

/// Deadline plus cooperative cancellation for one request.
///
/// Nothing is interrupted when the deadline passes; work that wants to
/// honour it goes through [`run`](Self::run) or polls [`err`](Self::err).
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    deadline: Instant,
}

/// Releases an [`ExecutionContext`] when dropped.
#[derive(Debug)]
pub struct ContextRelease {
    _guard: DropGuard,
}

impl ContextRelease {
    /// Cancel the context now.
    pub fn release(self) {}
}

impl ExecutionContext {
    /// A context expiring `timeout` from now, plus the guard that releases it.
    ///
    /// Timeouts beyond [`MAX_TIMEOUT`] are clamped to it.
    pub fn with_timeout(timeout: Duration) -> (Self, ContextRelease) {
        let now = Instant::now();
        let deadline = now.checked_add(timeout.min(MAX_TIMEOUT)).unwrap_or(now);
        Self::with_deadline(deadline)
    }

    pub fn with_deadline(deadline: Instant) -> (Self, ContextRelease) {
        let token = CancellationToken::new();
        let release = ContextRelease {
            _guard: token.clone().drop_guard(),
        };
        (Self { token, deadline }, release)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the context has been released.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `None` while live; otherwise the reason, deadline taking precedence.
    pub fn err(&self) -> Option<ContextError> {
        if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(ContextError::Canceled)
        } else {
            None
        }
    }

    /// Resolves when the deadline passes or the context is released.
    pub async fn done(&self) -> ContextError {
        tokio::select! {
            _ = tokio::time::sleep_until(self.deadline) => ContextError::DeadlineExceeded,
            _ = self.token.cancelled() => ContextError::Canceled,
        }
    }

    /// Drive `fut` unless the context ends first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            out = fut => Ok(out),
            err = self.done() => Err(err),
        }
    }
}

/// Buffered response written by a handler.
#[derive(Debug)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

impl ResponseSink {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        self.body.extend_from_slice(bytes.as_ref());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Everything a handler may touch while serving one request.
#[derive(Debug)]
pub struct RequestExecution {
    request: RequestData,
    response: ResponseSink,
    context: ExecutionContext,
    span: Span,
    errors_in_response: bool,
}

impl RequestExecution {
    pub fn new(
        request: RequestData,
        context: ExecutionContext,
        span: Span,
        errors_in_response: bool,
    ) -> Self {
        Self {
            request,
            response: ResponseSink::default(),
            context,
            span,
            errors_in_response,
        }
    }

    pub fn request(&self) -> &RequestData {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    pub fn client(&self) -> SocketAddr {
        self.request.client
    }

    pub fn params(&self) -> &RequestParams {
        &self.request.params
    }

    /// Shorthand for `params().value(key)`.
    pub fn param(&self, key: &str) -> &str {
        self.request.params.value(key)
    }

    pub fn response(&mut self) -> &mut ResponseSink {
        &mut self.response
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The request's span; events recorded under it carry the request ID.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn errors_in_response(&self) -> bool {
        self.errors_in_response
    }

    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let (ctx, _release) = ExecutionContext::with_timeout(Duration::from_secs(10));
        assert_eq!(ctx.err(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Duration::ZERO);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_release_cancels() {
        let (ctx, release) = ExecutionContext::with_timeout(Duration::from_secs(10));
        let observer = ctx.clone();

        release.release();
        assert!(observer.is_cancelled());
        assert_eq!(observer.err(), Some(ContextError::Canceled));
        assert_eq!(observer.done().await, ContextError::Canceled);
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let ctx = {
            let (ctx, _release) = ExecutionContext::with_timeout(Duration::from_secs(10));
            ctx
        };
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_honours_deadline() {
        let (ctx, _release) = ExecutionContext::with_timeout(Duration::from_secs(1));

        let fast = ctx.run(async { 7 }).await;
        assert_eq!(fast, Ok(7));

        let slow = ctx.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(slow, Err(ContextError::DeadlineExceeded));

        // Already expired: the future is never polled.
        let late = ctx.run(async { unreachable!() }).await;
        assert_eq!(late, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_huge_timeout_is_clamped() {
        let before = Instant::now();
        let (ctx, _release) =
            ExecutionContext::with_timeout(Duration::from_secs(i64::MAX as u64));

        assert_eq!(ctx.err(), None);
        assert!(ctx.deadline() <= Instant::now() + MAX_TIMEOUT);
        assert!(ctx.deadline() >= before + MAX_TIMEOUT);
    }

    #[test]
    fn test_response_sink() {
        let mut sink = ResponseSink::default();
        sink.set_status(StatusCode::CREATED);
        sink.write("hello ");
        sink.write(b"world");
        assert_eq!(sink.body(), b"hello world");

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
