//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID and trace layers)
//!     → adapter.rs (rate check, context, handler, error policy, access log)
//!         → request.rs (parameters, request ID)
//!         → execution.rs (per-request state lent to the handler)
//!     → Send to client
//! ```

pub mod adapter;
pub mod execution;
pub mod request;
pub mod server;

pub use adapter::{Handler, RequestAdapter};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
