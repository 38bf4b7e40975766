//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Store → Bind → Serve
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C or trigger() → broadcast → stop accepting, drain, stop sweeper → Exit
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
