//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → loader.rs (config file, then environment overrides)
//!     → command-line flags (binary)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed by value/clone to the server and its subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AppConfig;
pub use schema::DatabaseConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::RateLimitConfig;
