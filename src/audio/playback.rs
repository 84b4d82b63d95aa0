use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

use super::codec::AudioBuffer;

/// Identifier for one scheduled playback unit
pub type PlaybackId = u64;

/// Playback output device
///
/// Exposes a monotonically advancing output clock and schedule-at semantics.
/// Natural completion of a scheduled buffer is reported on the ended channel
/// supplied when the device was opened; `stop_all` discards everything
/// without ended notifications.
pub trait PlaybackSink: Send + Sync {
    /// Current position of the output clock, in seconds
    fn current_time(&self) -> f64;

    /// Schedule a buffer to start rendering at `at` seconds on the output
    /// clock. Returns an id tracked until the rendering ends.
    fn schedule(&mut self, buffer: AudioBuffer, at: f64) -> Result<PlaybackId>;

    /// Immediately stop and discard every playing and pending buffer
    fn stop_all(&mut self);
}

/// Schedules decoded inbound buffers gap-free on the output timeline.
///
/// A single virtual cursor (`next_start_time`) guarantees frames play in
/// strict arrival order, back-to-back, and never overlap: each buffer starts
/// at `max(next_start_time, current_time)` and advances the cursor by its
/// own duration. On interruption the live set is force-stopped and the
/// cursor rebased to the current output time so later audio does not play
/// from a stale offset.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    next_start_time: f64,
    live: HashSet<PlaybackId>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        let next_start_time = sink.current_time();
        Self {
            sink,
            next_start_time,
            live: HashSet::new(),
        }
    }

    /// Schedule one decoded buffer after everything already queued
    pub fn enqueue(&mut self, buffer: AudioBuffer) -> Result<()> {
        let now = self.sink.current_time();
        let start = self.next_start_time.max(now);
        let duration = buffer.duration_secs();

        let id = self.sink.schedule(buffer, start)?;
        self.live.insert(id);
        self.next_start_time = start + duration;

        debug!(
            "Scheduled playback unit {} at {:.3}s ({:.3}s long, {} live)",
            id,
            start,
            duration,
            self.live.len()
        );

        Ok(())
    }

    /// A scheduled unit finished rendering naturally
    pub fn on_ended(&mut self, id: PlaybackId) {
        if !self.live.remove(&id) {
            // Already flushed; the ended notification raced the stop
            debug!("Ended notification for unknown playback unit {}", id);
        }
    }

    /// Stop and discard all playing and queued audio, then rebase the
    /// cursor to the current output time (barge-in, teardown).
    pub fn flush(&mut self) {
        let discarded = self.live.len();
        self.sink.stop_all();
        self.live.clear();
        self.next_start_time = self.sink.current_time();

        if discarded > 0 {
            debug!("Flushed {} playback units", discarded);
        }
    }

    /// Rebase the cursor to the current output time without stopping
    /// anything (fresh session open).
    pub fn rebase(&mut self) {
        self.next_start_time = self.sink.current_time();
    }

    /// Number of units currently playing or pending
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}
