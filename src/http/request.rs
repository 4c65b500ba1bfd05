//! Parsed request model.
//!
//! # Responsibilities
//! - Split a decoded header block into request line and header lines
//! - Keep header lines in arrival order, untouched, for forwarding
//! - Resolve the routing authority from the request target or Host header
//!
//! # Design Decisions
//! - Header names compare case-insensitively; values are forwarded verbatim
//! - Only `http` absolute-form targets are relayed; TLS goes through CONNECT

use std::fmt;

use url::{Host, Url};

use crate::error::MalformedRequest;

pub const HOST: &str = "Host";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONNECTION: &str = "Connection";
pub const PROXY_CONNECTION: &str = "Proxy-Connection";
pub const KEEP_ALIVE: &str = "Keep-Alive";

pub const CONNECT: &str = "CONNECT";

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_TUNNEL_PORT: u16 = 443;

/// `METHOD target VERSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

impl RequestLine {
    pub fn parse(line: &str) -> Result<Self, MalformedRequest> {
        let mut parts = line.split(' ');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(target), Some(version), None)
                if !method.is_empty() && !target.is_empty() && version.starts_with("HTTP/") =>
            {
                Ok(Self {
                    method: method.to_string(),
                    target: target.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(MalformedRequest::BadRequestLine(line.to_string())),
        }
    }

    pub fn is_connect(&self) -> bool {
        self.method == CONNECT
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.target, self.version)
    }
}

/// One raw `Name: value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    raw: String,
    colon: usize,
}

impl HeaderLine {
    pub fn parse(raw: &str) -> Result<Self, MalformedRequest> {
        match raw.find(':') {
            Some(colon) if colon > 0 && !raw[..colon].contains(char::is_whitespace) => Ok(Self {
                raw: raw.to_string(),
                colon,
            }),
            _ => Err(MalformedRequest::BadHeaderLine(raw.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.raw[..self.colon]
    }

    /// Value with surrounding optional whitespace removed.
    pub fn value(&self) -> &str {
        self.raw[self.colon + 1..].trim()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Ordered header lines of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<HeaderLine>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|h| h.is(name)).map(HeaderLine::value)
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter(move |h| h.is(name)).map(HeaderLine::value)
    }

    /// Remove every line named `name`, returning the first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self.get(name).map(str::to_string);
        self.0.retain(|h| !h.is(name));
        first
    }

    pub fn push(&mut self, line: HeaderLine) {
        self.0.push(line);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderLine> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Declared body length, if any. Repeated headers must agree.
    pub fn content_length(&self) -> Result<Option<usize>, MalformedRequest> {
        let mut declared = None;
        for value in self.get_all(CONTENT_LENGTH) {
            let length = parse_content_length(value)?;
            match declared {
                Some(previous) if previous != length => {
                    return Err(MalformedRequest::ConflictingContentLength)
                }
                _ => declared = Some(length),
            }
        }
        Ok(declared)
    }
}

fn parse_content_length(value: &str) -> Result<usize, MalformedRequest> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedRequest::BadContentLength(value.to_string()));
    }
    value
        .parse()
        .map_err(|_| MalformedRequest::BadContentLength(value.to_string()))
}

/// A complete client request: header block plus fixed-length body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub line: RequestLine,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Bytes read from the stream after the end of this request.
    pub pipelined: Vec<u8>,
}

impl ParsedRequest {
    /// Parse a decoded header block. The terminating CRLFCRLF may be present.
    pub fn parse_head(head: &str) -> Result<Self, MalformedRequest> {
        let head = head.strip_suffix("\r\n\r\n").unwrap_or(head);
        let mut lines = head.split("\r\n");
        let line = RequestLine::parse(lines.next().unwrap_or_default())?;

        let mut headers = Headers::default();
        for raw in lines {
            headers.push(HeaderLine::parse(raw)?);
        }

        Ok(Self {
            line,
            headers,
            body: Vec::new(),
            pipelined: Vec::new(),
        })
    }
}

/// Host and port of an outbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    /// Hostname or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl Authority {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, MalformedRequest> {
        let bad = || MalformedRequest::BadAuthority(input.to_string());
        let input_trimmed = input.trim();

        let (host, port) = if let Some(rest) = input_trimmed.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(bad)?;
            let port = match after {
                "" => None,
                _ => Some(after.strip_prefix(':').ok_or_else(bad)?),
            };
            (host, port)
        } else {
            match input_trimmed.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => return Err(bad()),
                Some((host, port)) => (host, Some(port)),
                None => (input_trimmed, None),
            }
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(bad());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| bad())?,
            None => default_port,
        };
        if port == 0 {
            return Err(bad());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Authority of a CONNECT request target.
    pub fn from_connect_target(target: &str) -> Result<Self, MalformedRequest> {
        Self::parse(target, DEFAULT_TUNNEL_PORT)
    }

    /// Authority from a Host header value.
    pub fn from_host_header(value: &str) -> Result<Self, MalformedRequest> {
        Self::parse(value, DEFAULT_HTTP_PORT)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Where a relayed request goes and what path it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTarget {
    pub authority: Authority,
    /// Path and query in origin-form.
    pub path: String,
    /// Authority as written in an absolute-form target, for a missing Host.
    pub host_fallback: Option<String>,
}

impl RelayTarget {
    /// Resolve a non-CONNECT request target.
    ///
    /// Targets that open with `scheme://` are absolute-form and carry their
    /// own authority; everything else is origin-form and routes by `host`.
    pub fn resolve(target: &str, host: Option<&str>) -> Result<Self, MalformedRequest> {
        if has_scheme(target) {
            return Self::from_absolute(target);
        }

        let host = host.ok_or(MalformedRequest::MissingHost)?;
        Ok(Self {
            authority: Authority::from_host_header(host)?,
            path: target.to_string(),
            host_fallback: None,
        })
    }

    fn from_absolute(target: &str) -> Result<Self, MalformedRequest> {
        let url = Url::parse(target).map_err(|_| MalformedRequest::BadAuthority(target.to_string()))?;
        if url.scheme() != "http" {
            return Err(MalformedRequest::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(MalformedRequest::BadAuthority(target.to_string())),
        };
        let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        let host_fallback = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => Some(format!("{}:{}", h, p)),
            (Some(h), None) => Some(h.to_string()),
            (None, _) => None,
        };

        Ok(Self {
            authority: Authority { host, port },
            path,
            host_fallback,
        })
    }
}

/// True when `target` starts with `scheme://`. A `://` later in the path or
/// query does not count.
fn has_scheme(target: &str) -> bool {
    match target.split_once("://") {
        Some((scheme, _)) => {
            scheme
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
