//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions produce:
//!     → logging.rs (structured log events, one span per session)
//!     → metrics.rs (outcome counters, durations, active gauge)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
