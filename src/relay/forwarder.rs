//! Plain HTTP relay.
//!
//! # Responsibilities
//! - Replay the rewritten request to the origin, Host value fragmented
//! - Stream the body unmodified
//! - Copy the origin's response back verbatim until it closes
//!
//! # Wire Layout
//! ```text
//! <METHOD> <path> <VERSION>\r\n
//! Host: <fragment><fragment>...\r\n
//! <remaining headers>\r\n
//! Connection: close\r\n
//! \r\n
//! <body>
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Phase, ProxyError, Result};
use crate::http::dispatch::RelayRequest;
use crate::observability::metrics;
use crate::relay::obfuscate::{ChunkSource, HostObfuscator};
use crate::relay::{connect, RelayOptions};
use crate::resilience::timeouts::with_deadline;

/// Bytes moved by one relayed exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Request bytes written to the origin, head and body.
    pub request: u64,
    pub response: u64,
}

/// Connect to the request's authority, send it and relay the response to `client`.
pub async fn forward<C, S>(
    client: &mut C,
    request: &RelayRequest,
    options: &RelayOptions,
    obfuscator: &mut HostObfuscator<S>,
) -> Result<RelayReport>
where
    C: AsyncWrite + Unpin,
    S: ChunkSource,
{
    let mut target = connect(&request.authority, options.connect_timeout).await?;

    let sent = write_request(&mut target, request, obfuscator).await?;
    let response = relay_response(&mut target, client, options).await?;

    let _ = target.shutdown().await;
    let _ = client.shutdown().await;

    Ok(RelayReport {
        request: sent,
        response,
    })
}

/// Serialize `request` onto `target`, returning the bytes written.
pub async fn write_request<W, S>(
    target: &mut W,
    request: &RelayRequest,
    obfuscator: &mut HostObfuscator<S>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    S: ChunkSource,
{
    let preamble = format!("{}\r\nHost: ", request.line);
    target.write_all(preamble.as_bytes()).await?;

    obfuscator.write_host(target, &request.host).await?;

    let mut rest = String::from("\r\n");
    for header in request.headers.iter() {
        rest.push_str(header.as_str());
        rest.push_str("\r\n");
    }
    rest.push_str("\r\n");
    target.write_all(rest.as_bytes()).await?;

    if !request.body.is_empty() {
        target.write_all(&request.body).await?;
    }
    target.flush().await?;

    let total = (preamble.len() + request.host.len() + rest.len() + request.body.len()) as u64;
    metrics::record_bytes(metrics::Direction::Upstream, total);
    Ok(total)
}

/// Copy the response to `client` in bounded reads until the origin closes.
pub async fn relay_response<R, W>(target: &mut R, client: &mut W, options: &RelayOptions) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; options.buffer_size];
    let mut total = 0u64;

    loop {
        let n = with_deadline(Phase::Response, options.idle_timeout, async {
            target.read(&mut buf).await.map_err(ProxyError::from)
        })
        .await?;
        if n == 0 {
            break;
        }

        client.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    client.flush().await?;
    metrics::record_bytes(metrics::Direction::Downstream, total);
    Ok(total)
}
