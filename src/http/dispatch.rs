//! Request classification.
//!
//! # Responsibilities
//! - Decide between the CONNECT tunnel and the plain relay
//! - Resolve the routing authority
//! - Strip hop-by-hop headers and capture the Host value
//! - Rewrite the request line to origin-form
//!
//! # Design Decisions
//! - Outbound `Connection` is always `close`; the proxy never reuses a
//!   target connection, whatever the client asked for
//! - Host leaves the header list here and is written back separately by the
//!   obfuscating writer

use crate::error::{MalformedRequest, Result};
use crate::http::request::{
    Authority, HeaderLine, Headers, ParsedRequest, RelayTarget, RequestLine, CONNECTION, HOST,
    KEEP_ALIVE, PROXY_CONNECTION,
};

/// Literal reply to a CONNECT request, sent before any tunnel byte.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.0 200 Connection established\r\n\r\n";

/// Outbound `Connection` header line.
pub const CONNECTION_CLOSE: &str = "Connection: close";

/// What to do with a framed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Tunnel {
        authority: Authority,
        /// Client bytes that arrived behind the CONNECT head, owed to the target.
        pipelined: Vec<u8>,
    },
    Relay(RelayRequest),
}

/// A request rewritten for the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub authority: Authority,
    /// Request line with origin-form target.
    pub line: RequestLine,
    /// Captured Host value, written by the obfuscator.
    pub host: String,
    /// Remaining headers in arrival order, `Connection: close` last.
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Classify a framed request.
pub fn classify(request: ParsedRequest) -> Result<Dispatch> {
    if request.line.is_connect() {
        let authority = Authority::from_connect_target(&request.line.target)?;
        return Ok(Dispatch::Tunnel {
            authority,
            pipelined: request.pipelined,
        });
    }

    let ParsedRequest {
        line,
        mut headers,
        body,
        ..
    } = request;

    headers.remove(PROXY_CONNECTION);
    headers.remove(CONNECTION);
    headers.remove(KEEP_ALIVE);
    let host = headers.remove(HOST);

    let target = RelayTarget::resolve(&line.target, host.as_deref())?;
    let host = host
        .or(target.host_fallback)
        .ok_or(MalformedRequest::MissingHost)?;

    headers.push(HeaderLine::parse(CONNECTION_CLOSE)?);

    Ok(Dispatch::Relay(RelayRequest {
        authority: target.authority,
        line: RequestLine {
            target: target.path,
            ..line
        },
        host,
        headers,
        body,
    }))
}
