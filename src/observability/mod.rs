//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request adapter, rate limiter, store:
//!     → logging.rs (structured events under the per-request span)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (JSON or plain text)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
