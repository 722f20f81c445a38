//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields; unit print/debug under target "unit")
//!     → metrics.rs (request counters and latency, compile outcomes, cached units)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, filtered by EnvFilter)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is set and propagated by tower-http layers
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
