//! Proxy server: accept loop and per-connection handler.
//!
//! # Responsibilities
//! - Accept connections and spawn one independent task per connection
//! - Frame the request, classify it, and run the relay or the tunnel
//! - Log every connection-scoped failure and close; never answer with an error
//! - Stop accepting on shutdown and drain in-flight connections

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::http::dispatch::{classify, Dispatch, CONNECT_ESTABLISHED};
use crate::http::framer::Framer;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::Listener;
use crate::observability::metrics::{self, Direction};
use crate::relay::{self, HostObfuscator, RelayOptions, TunnelEnd};

/// Everything a connection task needs, shared read-only.
#[derive(Debug)]
struct ConnectionContext {
    config: ProxyConfig,
    framer: Framer,
    options: RelayOptions,
}

/// The forward proxy server.
pub struct ProxyServer {
    context: Arc<ConnectionContext>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        let framer = Framer::new(config.limits.clone(), config.timeouts.clone());
        let options = RelayOptions::from_config(&config);
        Self {
            context: Arc::new(ConnectionContext {
                config,
                framer,
                options,
            }),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Accept until `shutdown` fires, then drain.
    ///
    /// Failures of individual connections or accepts never end the loop.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "Proxy server accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let context = Arc::clone(&self.context);
                        let span = tracing::info_span!(
                            "connection",
                            connection_id = %guard.id(),
                            peer_addr = %peer,
                        );
                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                let _guard = guard;
                                handle_connection(stream, peer, &context).await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Proxy server stopped accepting");
                    break;
                }
            }
        }

        drop(listener);
        let grace = self.context.config.timeouts.shutdown_grace();
        let remaining = self.tracker.active_count();
        if remaining > 0 {
            tracing::info!(connections = remaining, grace = ?grace, "Draining connections");
        }
        if !self.tracker.drain(grace).await {
            tracing::warn!(
                connections = self.tracker.active_count(),
                "Grace period elapsed with connections still open"
            );
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, context: &ConnectionContext) {
    let _ = stream.set_nodelay(true);
    tracing::debug!(peer_addr = %peer, "New connection");

    if let Err(e) = serve(&mut stream, context).await {
        metrics::record_error(e.kind());
        match &e {
            ProxyError::ConnectionReset(_) => tracing::debug!(error = %e, "Connection reset"),
            _ => tracing::warn!(error = %e, kind = e.kind(), "Connection failed"),
        }
        let _ = stream.shutdown().await;
    }
}

/// Handle one client connection from first byte to close.
async fn serve<C>(client: &mut C, context: &ConnectionContext) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request = context.framer.read_request(client).await?;
    let request_line = request.line.to_string();

    match classify(request)? {
        Dispatch::Tunnel {
            authority,
            pipelined,
        } => {
            metrics::record_request("tunnel");
            client.write_all(CONNECT_ESTABLISHED).await?;
            client.flush().await?;

            let mut target = relay::connect(&authority, context.options.connect_timeout).await?;
            if !pipelined.is_empty() {
                target.write_all(&pipelined).await?;
                metrics::record_bytes(Direction::Upstream, pipelined.len() as u64);
            }
            tracing::info!(target_addr = %authority, early_bytes = pipelined.len(), "Tunnel opened");

            let mut report = relay::run_tunnel(client, target, &context.options).await;
            report.upstream += pipelined.len() as u64;
            match &report.end {
                TunnelEnd::Reset { direction, error } => tracing::info!(
                    target_addr = %authority,
                    %direction,
                    error = %error,
                    upstream = report.upstream,
                    downstream = report.downstream,
                    "Tunnel reset"
                ),
                end => tracing::info!(
                    target_addr = %authority,
                    end = ?end,
                    upstream = report.upstream,
                    downstream = report.downstream,
                    "Tunnel closed"
                ),
            }
        }
        Dispatch::Relay(request) => {
            metrics::record_request("relay");
            tracing::info!(request = %request_line, target_addr = %request.authority, "Relaying");

            let mut obfuscator = HostObfuscator::from_config(&context.config.obfuscation);
            let report = relay::forward(client, &request, &context.options, &mut obfuscator).await?;
            tracing::debug!(
                request_bytes = report.request,
                response_bytes = report.response,
                "Relay done"
            );
        }
    }

    Ok(())
}
