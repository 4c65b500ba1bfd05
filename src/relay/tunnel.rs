//! Bidirectional CONNECT tunnel.
//!
//! Two copy loops run concurrently, one per direction, raced in a single
//! `select!`. Whichever loop ends first (EOF, reset) or the inactivity
//! watchdog drops the others, which releases both streams. Bytes are copied
//! in bounded reads, in order, unmodified.
//!
//! Failures never leave this module: the outcome is reported as a
//! [`TunnelEnd`] for the caller to log.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::observability::metrics::{self, Direction};
use crate::relay::RelayOptions;

/// Why a tunnel closed.
#[derive(Debug)]
pub enum TunnelEnd {
    /// The client closed its side.
    ClientClosed,
    /// The target closed its side.
    TargetClosed,
    /// A read or write failed in the given direction.
    Reset { direction: Direction, error: io::Error },
    /// Neither side sent anything for the idle timeout.
    Idle(Duration),
}

/// Outcome and byte counts of one tunnel.
#[derive(Debug)]
pub struct TunnelReport {
    pub end: TunnelEnd,
    /// Client → target.
    pub upstream: u64,
    /// Target → client.
    pub downstream: u64,
}

/// Last-activity clock and byte counters shared by the copy loops.
#[derive(Debug)]
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
    upstream: AtomicU64,
    downstream: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
            upstream: AtomicU64::new(0),
            downstream: AtomicU64::new(0),
        }
    }

    fn record(&self, direction: Direction, n: usize) {
        let counter = match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        };
        counter.fetch_add(n as u64, Ordering::Relaxed);
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

/// Relay bytes between `client` and `target` until either side ends.
pub async fn run_tunnel<C, T>(client: C, target: T, options: &RelayOptions) -> TunnelReport
where
    C: AsyncRead + AsyncWrite + Unpin,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rx, mut client_tx) = tokio::io::split(client);
    let (mut target_rx, mut target_tx) = tokio::io::split(target);
    let activity = Activity::new();

    let end = tokio::select! {
        result = pipe(&mut client_rx, &mut target_tx, Direction::Upstream, options.buffer_size, &activity) => {
            match result {
                Ok(()) => TunnelEnd::ClientClosed,
                Err(error) => TunnelEnd::Reset { direction: Direction::Upstream, error },
            }
        }
        result = pipe(&mut target_rx, &mut client_tx, Direction::Downstream, options.buffer_size, &activity) => {
            match result {
                Ok(()) => TunnelEnd::TargetClosed,
                Err(error) => TunnelEnd::Reset { direction: Direction::Downstream, error },
            }
        }
        _ = idle_watchdog(&activity, options.idle_timeout) => TunnelEnd::Idle(options.idle_timeout),
    };

    let _ = client_tx.shutdown().await;
    let _ = target_tx.shutdown().await;

    let upstream = activity.upstream.load(Ordering::Relaxed);
    let downstream = activity.downstream.load(Ordering::Relaxed);
    metrics::record_bytes(Direction::Upstream, upstream);
    metrics::record_bytes(Direction::Downstream, downstream);

    TunnelReport {
        end,
        upstream,
        downstream,
    }
}

/// Copy one direction. Ends with `Ok` on EOF, after passing the EOF on.
async fn pipe<R, W>(
    reader: &mut R,
    writer: &mut W,
    direction: Direction,
    buffer_size: usize,
    activity: &Activity,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        activity.record(direction, n);
    }
}

async fn idle_watchdog(activity: &Activity, idle: Duration) {
    loop {
        let quiet = activity.idle_for();
        if quiet >= idle {
            return;
        }
        tokio::time::sleep(idle - quiet).await;
    }
}
