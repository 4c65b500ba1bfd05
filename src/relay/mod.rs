//! Outbound side of the proxy.
//!
//! # Data Flow
//! ```text
//! Dispatch::Relay(request)
//!     → connect (deadline, TCP_NODELAY)
//!     → forwarder.rs (request line, fragmented Host via obfuscate.rs, headers, body)
//!     → forwarder.rs (response copied back until origin EOF)
//!
//! Dispatch::Tunnel { authority, pipelined }
//!     → success line already sent to the client
//!     → connect, then pipelined client bytes
//!     → tunnel.rs (two copy loops, first to finish ends both)
//! ```
//!
//! # Design Decisions
//! - Target connections live for exactly one relay or tunnel, never pooled
//! - TCP_NODELAY on every target socket so each Host fragment is its own segment

pub mod forwarder;
pub mod obfuscate;
pub mod tunnel;

use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::error::{Phase, ProxyError, Result};
use crate::http::request::Authority;
use crate::resilience::timeouts::with_deadline;

pub use forwarder::{forward, RelayReport};
pub use obfuscate::{ChunkSource, HostObfuscator, RandomChunks};
pub use tunnel::{run_tunnel, TunnelEnd, TunnelReport};

/// Transfer settings shared by the relay and the tunnel.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub buffer_size: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl RelayOptions {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            buffer_size: config.limits.buffer_size.max(1),
            connect_timeout: config.timeouts.connect(),
            idle_timeout: config.timeouts.idle(),
        }
    }
}

/// Open a target connection under the connect deadline.
pub async fn connect(authority: &Authority, after: Duration) -> Result<TcpStream> {
    let stream = with_deadline(Phase::Connect, after, async {
        TcpStream::connect((authority.host.as_str(), authority.port))
            .await
            .map_err(|source| ProxyError::TargetUnreachable {
                authority: authority.to_string(),
                source,
            })
    })
    .await?;

    stream.set_nodelay(true)?;
    tracing::debug!(target_addr = %authority, "Target connected");
    Ok(stream)
}
