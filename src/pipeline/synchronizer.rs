//! Cross-stream timestamp synchronization.
//!
//! `StreamSynchronizer` keeps one FIFO buffer per named stream. Each time a
//! message arrives its timestamp becomes the reference: every buffer is
//! scanned for its oldest entry within `tolerance` of the reference. When all
//! streams have one, entries older than the match are discarded and the
//! matches are emitted together as a [`SyncedSet`].
//!
//! Buffers are bounded by `max_backlog`. Under sustained skew the oldest
//! entry of an overflowing stream is dropped and a warning logged.

use crate::pipeline::message::Timestamped;
use std::collections::VecDeque;
use std::time::Duration;

/// Default bound on unmatched messages per stream.
pub const DEFAULT_MAX_BACKLOG: usize = 100;

/// Tolerance and buffering limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    pub tolerance: Duration,
    pub max_backlog: usize,
}

impl SyncConfig {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }

    /// Tolerance of `ceil(window_ms / fps)` milliseconds.
    pub fn from_fps(window_ms: u64, fps: f32) -> Self {
        let fps = if fps > 0.0 { fps as f64 } else { 1.0 };
        let ms = (window_ms as f64 / fps).ceil() as u64;
        Self::new(Duration::from_millis(ms))
    }

    pub fn with_max_backlog(mut self, max_backlog: usize) -> Self {
        self.max_backlog = max_backlog.max(1);
        self
    }
}

/// One aligned message per stream, in stream declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedSet<T> {
    pub entries: Vec<(String, T)>,
}

impl<T> SyncedSet<T> {
    pub fn get(&self, stream: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(name, _)| name == stream)
            .map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counters kept by the synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub received: u64,
    pub emitted_sets: u64,
    /// Entries discarded because a newer entry of the same stream matched.
    pub discarded_stale: u64,
    /// Entries dropped because a stream exceeded its backlog bound.
    pub overflow_drops: u64,
}

#[derive(Debug)]
struct StreamBuffer<T> {
    name: String,
    entries: VecDeque<T>,
}

pub struct StreamSynchronizer<T> {
    streams: Vec<StreamBuffer<T>>,
    config: SyncConfig,
    stats: SyncStats,
}

impl<T: Timestamped> StreamSynchronizer<T> {
    /// Track `names`; the set is fixed for the synchronizer's lifetime.
    pub fn new<I, S>(names: I, config: SyncConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut streams: Vec<StreamBuffer<T>> = Vec::new();
        for name in names {
            let name = name.into();
            if streams.iter().any(|s| s.name == name) {
                continue;
            }
            streams.push(StreamBuffer {
                name,
                entries: VecDeque::new(),
            });
        }
        Self {
            streams,
            config,
            stats: SyncStats::default(),
        }
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(|s| s.name.as_str())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Unmatched entries buffered for `stream`.
    pub fn backlog(&self, stream: &str) -> Option<usize> {
        self.streams
            .iter()
            .find(|s| s.name == stream)
            .map(|s| s.entries.len())
    }

    /// Feed one message. Returns the aligned set when this arrival completes
    /// a match. Messages on untracked streams are handed back as `Err`.
    pub fn push(&mut self, stream: &str, item: T) -> Result<Option<SyncedSet<T>>, T> {
        let Some(idx) = self.streams.iter().position(|s| s.name == stream) else {
            return Err(item);
        };

        let reference = item.timestamp();
        self.stats.received += 1;

        let buffer = &mut self.streams[idx];
        buffer.entries.push_back(item);
        if buffer.entries.len() > self.config.max_backlog {
            buffer.entries.pop_front();
            self.stats.overflow_drops += 1;
            tracing::warn!(
                "Sync backlog for '{}' exceeded {} entries, dropped oldest",
                buffer.name,
                self.config.max_backlog
            );
        }

        Ok(self.try_match(reference))
    }

    fn try_match(&mut self, reference: Duration) -> Option<SyncedSet<T>> {
        let tolerance = self.config.tolerance;
        let mut matched = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            let hit = stream
                .entries
                .iter()
                .position(|e| time_diff(e.timestamp(), reference) <= tolerance)?;
            matched.push(hit);
        }

        let mut entries = Vec::with_capacity(self.streams.len());
        for (stream, hit) in self.streams.iter_mut().zip(matched) {
            stream.entries.drain(..hit);
            self.stats.discarded_stale += hit as u64;
            // `hit` was a valid index before draining, so the front exists.
            if let Some(item) = stream.entries.pop_front() {
                entries.push((stream.name.clone(), item));
            }
        }
        self.stats.emitted_sets += 1;
        Some(SyncedSet { entries })
    }

    /// Drop every buffered entry and reset counters.
    pub fn reset(&mut self) {
        for stream in &mut self.streams {
            stream.entries.clear();
        }
        self.stats = SyncStats::default();
    }
}

fn time_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}
