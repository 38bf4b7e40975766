//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket, 429 on exhaustion)
//!     → handler
//!         → password.rs (hash on register, verify on login)
//! ```

pub mod password;
pub mod rate_limit;
