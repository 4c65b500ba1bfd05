//! warp-proxy: forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                   FORWARD PROXY                   │
//!     Client             │  ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//!     ───────────────────┼─▶│   net    │──▶│  framer  │──▶│   dispatch   │   │
//!                        │  │ listener │   │ CRLFCRLF │   │ CONNECT? /   │   │
//!                        │  └──────────┘   └──────────┘   │ rewrite      │   │
//!                        │                                └──────┬───────┘   │
//!                        │                     ┌─────────────────┴──────┐    │
//!                        │                     ▼                        ▼    │
//!                        │             ┌──────────────┐        ┌────────────┐│
//!                        │             │  forwarder   │        │   tunnel   ││
//!                        │             │ + fragmented │        │ two copy   ││       Target
//!     ◀──────────────────┼─────────────│   Host       │        │ loops      │├────▶ host:port
//!                        │             └──────────────┘        └────────────┘│
//!                        │                                                   │
//!                        │  config · timeouts · logging · metrics · shutdown │
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use warp_proxy::config::loader::load_config;
use warp_proxy::observability::{logging, metrics};
use warp_proxy::{lifecycle, Listener, ProxyConfig, ProxyServer, Shutdown};

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Parser)]
#[command(name = "warp-proxy")]
#[command(about = "Forward HTTP proxy that fragments the Host header", long_about = None)]
struct Cli {
    /// Address to listen on [default: 127.0.0.1]
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on [default: 8080]
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Fold command-line overrides into `config`.
    ///
    /// Without a config file the listener defaults to 127.0.0.1:8080; an
    /// explicit `--host` or `--port` replaces only its own half of the
    /// configured bind address.
    fn apply(&self, config: &mut ProxyConfig) {
        let configured = config
            .listener
            .bind_address
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::new(DEFAULT_HOST, DEFAULT_PORT));

        if self.host.is_some() || self.port.is_some() {
            let addr = SocketAddr::new(
                self.host.unwrap_or(configured.ip()),
                self.port.unwrap_or(configured.port()),
            );
            config.listener.bind_address = addr.to_string();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("!!! Invalid configuration {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("!!! Failed to initialize logging: {}", e);
    }

    tracing::info!("warp-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        obfuscation = config.obfuscation.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Bind failed");
            eprintln!("!!! Failed to bind server at [{}]", config.listener.bind_address);
            std::process::exit(1);
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        lifecycle::signals::wait_for_signal().await;
        shutdown.trigger();
    });

    if let Err(e) = ProxyServer::new(config).run(listener, server_shutdown).await {
        tracing::error!(error = %e, "Proxy server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}
