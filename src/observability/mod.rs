//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connection tasks produce:
//!     → logging.rs (structured events, one span per connection)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Diagnostics go to the operator, never back to the client
//! - Connection ID flows through every event of a connection via its span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
