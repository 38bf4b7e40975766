//! Liveness endpoint.

use async_trait::async_trait;
use axum::http::{header, HeaderValue};

use crate::error::AppResult;
use crate::http::adapter::Handler;
use crate::http::execution::RequestExecution;

/// `GET /health`: always `200 OK` while the process is serving.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthHandler;

#[async_trait]
impl Handler for HealthHandler {
    async fn handle(&self, exec: &mut RequestExecution) -> AppResult<()> {
        let response = exec.response();
        response.insert_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.write("OK");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::execution;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_ok() {
        let (mut exec, _release) = execution("/health", "", false);
        HealthHandler.handle(&mut exec).await.unwrap();

        assert_eq!(exec.response().status(), StatusCode::OK);
        assert_eq!(exec.response().body(), b"OK");
    }
}
