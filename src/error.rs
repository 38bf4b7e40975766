//! Handler failure taxonomy.
//!
//! Handlers return [`AppError`]; the request adapter is the only place that
//! turns one into a response and a log line. Operation names are attached
//! as the error travels upward, so the rendered chain reads like
//! `register: insert_user: username already exists`.

use thiserror::Error;

use crate::http::execution::ContextError;
use crate::security::password::CredentialError;
use crate::store::StoreError;

/// Client-facing text for every authentication failure.
pub const INVALID_CREDENTIALS: &str = "username or password is invalid";

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Unknown user or wrong password. The cause is never rendered to clients.
    #[error("username or password is invalid")]
    Authentication { cause: String },

    /// Store, entropy, deadline or other server-side failure.
    #[error("{0}")]
    Infrastructure(String),

    /// Breadcrumb naming the operation the inner error passed through.
    #[error("{op}: {source}")]
    Context {
        op: &'static str,
        #[source]
        source: Box<AppError>,
    },
}

/// Result type for handler operations.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn authentication(cause: impl Into<String>) -> Self {
        AppError::Authentication { cause: cause.into() }
    }

    pub fn infrastructure(msg: impl Into<String>) -> Self {
        AppError::Infrastructure(msg.into())
    }

    /// Wrap with the name of the operation it passed through.
    pub fn context(self, op: &'static str) -> Self {
        AppError::Context {
            op,
            source: Box::new(self),
        }
    }

    /// Category of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Authentication { .. } => ErrorKind::Authentication,
            AppError::Infrastructure(_) => ErrorKind::Infrastructure,
            AppError::Context { source, .. } => source.kind(),
        }
    }

    /// Full server-side description, including causes hidden from clients.
    pub fn detail(&self) -> String {
        match self {
            AppError::Authentication { cause } => format!("{INVALID_CREDENTIALS} ({cause})"),
            AppError::Context { op, source } => format!("{op}: {}", source.detail()),
            other => other.to_string(),
        }
    }
}

/// Attach an operation name to the error side of a result.
pub trait OperationContext<T> {
    fn context(self, op: &'static str) -> AppResult<T>;
}

impl<T, E> OperationContext<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, op: &'static str) -> AppResult<T> {
        self.map_err(|e| e.into().context(op))
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(username) => {
                AppError::Validation(format!("username {username:?} already exists"))
            }
            other => AppError::Infrastructure(other.to_string()),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        AppError::Infrastructure(e.to_string())
    }
}

impl From<ContextError> for AppError {
    fn from(e: ContextError) -> Self {
        AppError::Infrastructure(e.to_string())
    }
}
