//! Blog backend: rate-limited request pipeline, credential hashing and
//! user registration/login.

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
