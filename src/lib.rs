//! Forward HTTP proxy with CONNECT tunnelling and Host header fragmentation.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use net::listener::Listener;
