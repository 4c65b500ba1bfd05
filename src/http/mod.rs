//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → framer.rs (CRLFCRLF matcher, Content-Length body)
//!     → request.rs (request line, ordered headers, authority)
//!     → dispatch.rs (CONNECT → tunnel, anything else → relay rewrite)
//!     → server.rs hands off to relay::forwarder or relay::tunnel
//! ```
//!
//! # Design Decisions
//! - One request per connection; the client sees a close after the response
//! - Errors are logged and answered with a closed socket, never an HTTP error

pub mod dispatch;
pub mod framer;
pub mod request;
pub mod server;

pub use dispatch::{classify, Dispatch, RelayRequest, CONNECT_ESTABLISHED};
pub use framer::{Framer, Terminator};
pub use request::{Authority, ParsedRequest};
pub use server::ProxyServer;
