//! Business handlers mounted behind the request adapter.

pub mod health;
pub mod login;
pub mod register;

pub use health::HealthHandler;
pub use login::LoginHandler;
pub use register::RegisterHandler;

use crate::error::AppError;

/// Map a failed blocking task onto the error taxonomy.
fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError::infrastructure(format!("blocking task failed: {e}"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::http::{HeaderMap, Method, Uri};

    use crate::http::execution::{ContextRelease, ExecutionContext, RequestExecution};
    use crate::http::request::{RequestData, RequestParams};
    use crate::security::password::{CredentialHasher, HashParams};

    /// Execution for a POST carrying `query` as its parameters.
    pub fn execution(
        path: &str,
        query: &str,
        errors_in_response: bool,
    ) -> (RequestExecution, ContextRelease) {
        let (context, release) = ExecutionContext::with_timeout(Duration::from_secs(10));
        let uri: Uri = format!("{path}?{query}").parse().unwrap();
        let params = RequestParams::parse(uri.query(), &HeaderMap::new(), b"");
        let client: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let exec = RequestExecution::new(
            RequestData {
                method: Method::POST,
                uri,
                headers: HeaderMap::new(),
                params,
                client,
            },
            context,
            tracing::Span::none(),
            errors_in_response,
        );
        (exec, release)
    }

    pub fn cheap_hasher() -> CredentialHasher {
        CredentialHasher::new(HashParams {
            memory_kib: 1024,
            iterations: 1,
            lanes: 1,
            output_len: 32,
        })
    }
}
