//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection cap)
//!     → connection.rs (connection id, in-flight tracking)
//!     → Hand off to the per-connection handler (http::server)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Connections share no state beyond the counters here

pub mod connection;
pub mod listener;
