//! Host header fragmentation.
//!
//! The Host value is never written as one contiguous token. It leaves in
//! small fragments, each preceded by a short jittered pause, so a middlebox
//! matching on `Host: <name>` within one segment sees only pieces of it.
//!
//! Fragment sizes and pauses come from a [`ChunkSource`], which the caller
//! injects. Production uses [`RandomChunks`]; tests script exact sequences.

use std::ops::Range;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::ObfuscationConfig;

/// Supplies fragment sizes and inter-fragment pauses.
pub trait ChunkSource: Send {
    /// Size, in characters, of the fragment after the current one.
    fn next_chunk(&mut self) -> usize;

    /// Pause before the next fragment is written.
    fn next_delay(&mut self) -> Duration;
}

/// Draws sizes and pauses uniformly from the configured ranges.
#[derive(Debug)]
pub struct RandomChunks {
    rng: StdRng,
    chunk: Range<usize>,
    delay_ms: Range<u64>,
}

impl RandomChunks {
    pub fn new(chunk: Range<usize>, delay_ms: Range<u64>) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            chunk,
            delay_ms,
        }
    }

    pub fn from_config(config: &ObfuscationConfig) -> Self {
        Self::new(
            config.chunk_min..config.chunk_max,
            config.delay_min_ms..config.delay_max_ms,
        )
    }

    /// Seeded variant for reproducible runs.
    pub fn seeded(seed: u64, chunk: Range<usize>, delay_ms: Range<u64>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            chunk,
            delay_ms,
        }
    }
}

impl ChunkSource for RandomChunks {
    fn next_chunk(&mut self) -> usize {
        if self.chunk.is_empty() {
            return self.chunk.start.max(1);
        }
        self.rng.gen_range(self.chunk.clone()).max(1)
    }

    fn next_delay(&mut self) -> Duration {
        if self.delay_ms.is_empty() {
            return Duration::from_millis(self.delay_ms.start);
        }
        Duration::from_millis(self.rng.gen_range(self.delay_ms.clone()))
    }
}

/// What is left of one Host value and how much of it goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationState<'a> {
    remaining: &'a str,
    chunk: usize,
}

impl<'a> ObfuscationState<'a> {
    pub fn new(host: &'a str, first_chunk: usize) -> Self {
        Self {
            remaining: host,
            chunk: first_chunk,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Split off the next fragment and set the size of the one after it.
    ///
    /// Fragments hold at least one character and end on a char boundary.
    pub fn next_fragment(&mut self, following: usize) -> Option<&'a str> {
        if self.remaining.is_empty() {
            return None;
        }

        let take = self.chunk.max(1);
        let split = self
            .remaining
            .char_indices()
            .nth(take)
            .map(|(i, _)| i)
            .unwrap_or(self.remaining.len());

        let (fragment, rest) = self.remaining.split_at(split);
        self.remaining = rest;
        self.chunk = following;
        Some(fragment)
    }
}

/// Writes Host values fragment by fragment.
#[derive(Debug)]
pub struct HostObfuscator<S> {
    source: S,
    first_chunk: usize,
    enabled: bool,
}

impl HostObfuscator<RandomChunks> {
    pub fn from_config(config: &ObfuscationConfig) -> Self {
        Self::new(RandomChunks::from_config(config), config)
    }
}

impl<S: ChunkSource> HostObfuscator<S> {
    pub fn new(source: S, config: &ObfuscationConfig) -> Self {
        Self {
            source,
            first_chunk: config.first_chunk,
            enabled: config.enabled,
        }
    }

    /// Write `host` to `writer`, flushing after every fragment.
    ///
    /// Returns the number of fragments written.
    pub async fn write_host<W>(&mut self, writer: &mut W, host: &str) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        if !self.enabled {
            writer.write_all(host.as_bytes()).await?;
            writer.flush().await?;
            return Ok(usize::from(!host.is_empty()));
        }

        let mut state = ObfuscationState::new(host, self.first_chunk);
        let mut fragments = 0;

        while !state.is_empty() {
            let delay = self.source.next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let following = self.source.next_chunk();
            if let Some(fragment) = state.next_fragment(following) {
                writer.write_all(fragment.as_bytes()).await?;
                writer.flush().await?;
                fragments += 1;
            }
        }

        tracing::trace!(host, fragments, "Host header written in fragments");
        Ok(fragments)
    }
}
