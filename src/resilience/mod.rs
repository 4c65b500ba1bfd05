//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Every blocking phase of a connection:
//!     → timeouts.rs (header receipt, body receipt, connect, response read, tunnel idle)
//!     → On expiry: ProxyError::Timeout, connection torn down
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external wait has a deadline
//! - No retries: a forwarded request may not be idempotent and the client
//!   sees only a closed connection on failure

pub mod timeouts;
