//! Message framing over a raw byte stream.
//!
//! # Responsibilities
//! - Find the end of the header block with an explicit CRLFCRLF matcher
//! - Decode and parse the header block
//! - Read exactly `Content-Length` body bytes, never more
//!
//! # Design Decisions
//! - Header and body receipt each run under their own deadline
//! - The header read may pull up to one buffer past the terminator; those
//!   bytes start the body, and whatever lies beyond the body is handed back
//!   as `ParsedRequest::pipelined` instead of being dropped
//! - Body reads are bounded by the bytes still owed, so the body read itself
//!   never consumes past the declared length

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::{LimitsConfig, TimeoutConfig};
use crate::error::{MalformedRequest, Phase, ProxyError, Result};
use crate::http::request::ParsedRequest;
use crate::resilience::timeouts::with_deadline;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Matcher state for the CR LF CR LF header terminator.
///
/// | state    | CR       | LF       | other |
/// |----------|----------|----------|-------|
/// | `Start`  | `Cr`     | `Start`  | `Start` |
/// | `Cr`     | `Cr`     | `CrLf`   | `Start` |
/// | `CrLf`   | `CrLfCr` | `Start`  | `Start` |
/// | `CrLfCr` | `Cr`     | `Done`   | `Start` |
/// | `Done`   | `Done`   | `Done`   | `Done`  |
///
/// A CR that breaks a partial match still opens a new one, so `\r\r\n\r\n`
/// terminates while `\r\n\n\r\n` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminator {
    #[default]
    Start,
    Cr,
    CrLf,
    CrLfCr,
    Done,
}

impl Terminator {
    pub fn advance(self, byte: u8) -> Self {
        use Terminator::*;

        match (self, byte) {
            (Done, _) => Done,
            (CrLf, CR) => CrLfCr,
            (CrLfCr, LF) => Done,
            (_, CR) => Cr,
            (Cr, LF) => CrLf,
            _ => Start,
        }
    }

    pub fn is_done(self) -> bool {
        self == Terminator::Done
    }
}

/// Reads one complete request from a client stream.
#[derive(Debug, Clone)]
pub struct Framer {
    limits: LimitsConfig,
    timeouts: TimeoutConfig,
}

impl Framer {
    pub fn new(limits: LimitsConfig, timeouts: TimeoutConfig) -> Self {
        Self { limits, timeouts }
    }

    /// Read a header block and its fixed-length body.
    pub async fn read_request<R>(&self, reader: &mut R) -> Result<ParsedRequest>
    where
        R: AsyncRead + Unpin,
    {
        let (head, mut extra) =
            with_deadline(Phase::Headers, self.timeouts.header(), self.read_head(reader)).await?;

        let head = String::from_utf8(head).map_err(|_| MalformedRequest::InvalidEncoding)?;
        let mut request = ParsedRequest::parse_head(&head)?;

        match request.headers.content_length()? {
            Some(length) => {
                if length > self.limits.max_body_bytes {
                    return Err(MalformedRequest::BodyTooLarge {
                        length,
                        limit: self.limits.max_body_bytes,
                    }
                    .into());
                }
                let mut body = extra;
                extra = body.split_off(length.min(body.len()));
                with_deadline(
                    Phase::Body,
                    self.timeouts.body(),
                    self.read_body(reader, &mut body, length),
                )
                .await?;
                request.body = body;
            }
            None => request.body = Vec::new(),
        }
        request.pipelined = extra;

        Ok(request)
    }

    /// Returns the header block (terminator included) and any bytes read past it.
    async fn read_head<R>(&self, reader: &mut R) -> Result<(Vec<u8>, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        let mut state = Terminator::default();
        let mut head = Vec::with_capacity(self.limits.buffer_size);
        let mut buf = vec![0u8; self.limits.buffer_size];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Err(MalformedRequest::TruncatedHeaders.into());
            }

            for (i, &byte) in buf[..n].iter().enumerate() {
                state = state.advance(byte);
                head.push(byte);

                if head.len() > self.limits.max_header_bytes {
                    return Err(MalformedRequest::HeadersTooLarge {
                        limit: self.limits.max_header_bytes,
                    }
                    .into());
                }
                if state.is_done() {
                    return Ok((head, buf[i + 1..n].to_vec()));
                }
            }
        }
    }

    async fn read_body<R>(&self, reader: &mut R, body: &mut Vec<u8>, length: usize) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        body.reserve(length - body.len());
        let mut buf = vec![0u8; self.limits.buffer_size];

        while body.len() < length {
            let want = buf.len().min(length - body.len());
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(ProxyError::MalformedRequest(MalformedRequest::TruncatedBody {
                    expected: length,
                    received: body.len(),
                }));
            }
            body.extend_from_slice(&buf[..n]);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, ReadBuf};

    fn scan(bytes: &[u8]) -> Terminator {
        bytes.iter().fold(Terminator::default(), |s, &b| s.advance(b))
    }

    fn framer() -> Framer {
        Framer::new(LimitsConfig::default(), TimeoutConfig::default())
    }

    /// Hands out at most `step` bytes per read and remembers how far it got.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let end = (self.pos + self.step).min(self.data.len());
            let n = (end - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn terminator_matches_crlfcrlf() {
        assert_eq!(scan(b"\r\n\r\n"), Terminator::Done);
        assert_eq!(scan(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"), Terminator::Done);
        assert_eq!(scan(b"\r\r\n\r\n"), Terminator::Done);
        assert_eq!(scan(b"\r\n\r\r\n\r\n"), Terminator::Done);
    }

    #[test]
    fn terminator_rejects_near_misses() {
        assert_ne!(scan(b"\r\r\n\n"), Terminator::Done);
        assert_ne!(scan(b"\r\n\rx"), Terminator::Done);
        assert_ne!(scan(b"\r\n\n\r\n"), Terminator::Done);
        assert_ne!(scan(b"\n\r\n\r"), Terminator::Done);
        assert_ne!(scan(b"\n\n\n\n"), Terminator::Done);
        assert_eq!(scan(b"\r\n\rx"), Terminator::Start);
        assert_eq!(scan(b"\r\n\r\r"), Terminator::Cr);
    }

    #[test]
    fn terminator_stays_done() {
        assert_eq!(Terminator::Done.advance(b'x'), Terminator::Done);
    }

    #[tokio::test]
    async fn reads_request_without_body() {
        let mut input: &[u8] = b"GET /x HTTP/1.1\r\nHost: example.com\r\n\r\ntrailing";
        let request = framer().read_request(&mut input).await.unwrap();
        assert_eq!(request.line.target, "/x");
        assert_eq!(request.headers.get("Host"), Some("example.com"));
        assert!(request.body.is_empty());
        assert_eq!(request.pipelined, b"trailing");
    }

    #[tokio::test]
    async fn keeps_bytes_sent_right_after_connect() {
        let mut input: &[u8] = b"CONNECT example.com:443 HTTP/1.1\r\n\r\n\x16\x03\x01hello";
        let request = framer().read_request(&mut input).await.unwrap();
        assert!(request.line.is_connect());
        assert!(request.body.is_empty());
        assert_eq!(request.pipelined, b"\x16\x03\x01hello");
    }

    #[tokio::test]
    async fn reads_exactly_content_length() {
        let mut input: &[u8] =
            b"POST /p HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhelloEXTRA";
        let request = framer().read_request(&mut input).await.unwrap();
        assert_eq!(request.body, b"hello");
        assert_eq!(request.pipelined, b"EXTRA");
    }

    #[tokio::test]
    async fn never_consumes_past_the_body() {
        let head = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n";
        let mut data = head.to_vec();
        data.extend_from_slice(b"bodyNEXT");

        for step in [1, 3, 7] {
            let mut reader = Trickle { data: data.clone(), pos: 0, step };
            let request = framer().read_request(&mut reader).await.unwrap();
            assert_eq!(request.body, b"body");
            if step == 1 {
                assert_eq!(reader.pos, head.len() + 4);
            }
        }
    }

    #[tokio::test]
    async fn reassembles_split_arrivals() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            for part in [&b"POST / HTTP/1.1\r"[..], b"\nContent-Length: 3\r\n\r", b"\na", b"bc"] {
                client.write_all(part).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let request = framer().read_request(&mut server).await.unwrap();
        assert_eq!(request.headers.content_length(), Ok(Some(3)));
        assert_eq!(request.body, b"abc");
    }

    #[tokio::test]
    async fn eof_before_terminator_is_malformed() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: a\r\n\r";
        let err = framer().read_request(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedRequest(MalformedRequest::TruncatedHeaders)
        ));
    }

    #[tokio::test]
    async fn short_body_is_malformed() {
        let mut input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        let err = framer().read_request(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedRequest(MalformedRequest::TruncatedBody { expected: 10, received: 3 })
        ));
    }

    #[tokio::test]
    async fn non_numeric_length_is_malformed() {
        let mut input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n";
        let err = framer().read_request(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedRequest(MalformedRequest::BadContentLength(_))
        ));
    }

    #[tokio::test]
    async fn enforces_limits() {
        let limits = LimitsConfig {
            max_header_bytes: 16,
            max_body_bytes: 2,
            buffer_size: 8,
        };
        let framer = Framer::new(limits, TimeoutConfig::default());

        let mut input: &[u8] = b"GET /a-long-path HTTP/1.1\r\n\r\n";
        let err = framer.read_request(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedRequest(MalformedRequest::HeadersTooLarge { limit: 16 })
        ));

        let mut input: &[u8] = b"P / HTTP/1.1\r\n\r\n";
        assert!(framer.read_request(&mut input).await.is_ok());
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected() {
        let limits = LimitsConfig {
            max_body_bytes: 2,
            ..LimitsConfig::default()
        };
        let framer = Framer::new(limits, TimeoutConfig::default());
        let mut input: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
        let err = framer.read_request(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedRequest(MalformedRequest::BodyTooLarge { length: 3, limit: 2 })
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_is_malformed() {
        let mut input: &[u8] = b"GET /\xff HTTP/1.1\r\n\r\n";
        let err = framer().read_request(&mut input).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MalformedRequest(MalformedRequest::InvalidEncoding)
        ));
    }
}
