//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! The gate additionally produces:
//!     → audit.rs (one access log entry per gated request → store)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API log queries
//! ```
//!
//! # Design Decisions
//! - Request ID flows through logs via the tower-http trace span
//! - Metrics are cheap (atomic increments)
//! - Audit writes are off the request path

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::AuditSink;
pub use logging::init_logging;
