//! Error taxonomy for the proxy.
//!
//! Every failure below the listener is connection-scoped: the handler logs it,
//! closes both sockets and returns. Only `BindFailure` is fatal, and only at
//! startup.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The listener could not bind its configured address.
    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// An I/O failure while relaying or tunnelling.
    #[error("connection reset: {0}")]
    ConnectionReset(#[from] io::Error),

    /// The client sent something that could not be framed or parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(#[from] MalformedRequest),

    /// The outbound connection could not be established.
    #[error("target {authority} unreachable: {source}")]
    TargetUnreachable {
        authority: String,
        #[source]
        source: io::Error,
    },

    /// A per-phase deadline expired.
    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: Phase, after: Duration },
}

impl ProxyError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BindFailure { .. } => "bind_failure",
            ProxyError::ConnectionReset(_) => "connection_reset",
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::TargetUnreachable { .. } => "target_unreachable",
            ProxyError::Timeout { .. } => "timeout",
        }
    }
}

/// Framing and parsing failures. All of them end the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRequest {
    #[error("connection closed before the header block was complete")]
    TruncatedHeaders,

    #[error("header block exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("header block is not valid UTF-8")]
    InvalidEncoding,

    #[error("bad request line: {0:?}")]
    BadRequestLine(String),

    #[error("bad header line: {0:?}")]
    BadHeaderLine(String),

    #[error("bad Content-Length value: {0:?}")]
    BadContentLength(String),

    #[error("conflicting Content-Length headers")]
    ConflictingContentLength,

    #[error("body of {length} bytes exceeds {limit} bytes")]
    BodyTooLarge { length: usize, limit: usize },

    #[error("connection closed after {received} of {expected} body bytes")]
    TruncatedBody { expected: usize, received: usize },

    #[error("no Host header on an origin-form request")]
    MissingHost,

    #[error("bad authority: {0:?}")]
    BadAuthority(String),

    #[error("unsupported scheme: {0:?}")]
    UnsupportedScheme(String),
}

/// Connection phase a deadline applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Headers,
    Body,
    Connect,
    Response,
    TunnelIdle,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Headers => "header receipt",
            Phase::Body => "body receipt",
            Phase::Connect => "outbound connect",
            Phase::Response => "response read",
            Phase::TunnelIdle => "idle tunnel",
        };
        f.write_str(name)
    }
}

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
