//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Balancer, table and health checkers produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (cluster, backend, addr) instead of formatted strings
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
