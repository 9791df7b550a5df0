//! Coalescing of buffered process output into timed model writes.
//!
//! Output is buffered per tab. The first byte arms a quiet-period timer;
//! when it fires the buffer is flushed if output has been quiet for the
//! profile's `quiet` time or has been pending for its `max` time, and the
//! timer is re-armed for the remainder otherwise. A flush writes at most one
//! chunk and re-arms a short follow-up while data remains, so a large burst
//! never stalls the consumer in a single call.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Quiet and maximum latency for one kind of output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushProfile {
    pub quiet: Duration,
    pub max: Duration,
}

impl FlushProfile {
    pub const FAST: FlushProfile = FlushProfile {
        quiet: Duration::from_millis(12),
        max: Duration::from_millis(50),
    };

    /// Full-screen programs redraw in bursts and tolerate more latency.
    pub const SLOW: FlushProfile = FlushProfile {
        quiet: Duration::from_millis(30),
        max: Duration::from_millis(120),
    };
}

/// Outcome of a flush timer firing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerAction {
    /// Nothing is buffered.
    Idle,
    /// Too early; fire again after the given delay.
    Rearm(Duration),
    /// Write a chunk now.
    Flush,
}

/// Bytes received from the reader but not yet written to the model.
#[derive(Debug, Default)]
pub struct PendingOutput {
    buf: VecDeque<u8>,
    last_output_at: Option<Instant>,
    pending_since: Option<Instant>,
    flush_scheduled: bool,
    /// A chunked flush is in progress; the next timer flushes without waiting.
    draining: bool,
    dropped: u64,
    reported: u64,
}

impl PendingOutput {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes discarded by the overflow cap.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes dropped since the last call, for logging once per flush.
    pub fn take_unreported_drops(&mut self) -> u64 {
        let unreported = self.dropped - self.reported;
        self.reported = self.dropped;
        unreported
    }

    pub fn flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    pub fn last_output_at(&self) -> Option<Instant> {
        self.last_output_at
    }

    /// Buffer `bytes`, enforcing `cap` by discarding the oldest bytes.
    ///
    /// Returns the number of bytes dropped by this call, and a delay when
    /// the caller must arm the flush timer.
    pub fn push(
        &mut self,
        bytes: &[u8],
        now: Instant,
        profile: FlushProfile,
        cap: usize,
    ) -> (usize, Option<Duration>) {
        if bytes.is_empty() {
            return (0, None);
        }

        self.buf.extend(bytes);
        self.last_output_at = Some(now);
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }

        let mut dropped = 0;
        if cap > 0 && self.buf.len() > cap {
            dropped = self.buf.len() - cap;
            self.buf.drain(..dropped);
            self.dropped += dropped as u64;
        }

        if self.flush_scheduled {
            return (dropped, None);
        }
        self.flush_scheduled = true;
        (dropped, Some(profile.quiet))
    }

    /// Called when the flush timer fires.
    ///
    /// On `Rearm` the timer is considered armed again; on `Flush` the caller
    /// must follow up with [`PendingOutput::take_chunk`].
    pub fn on_timer(&mut self, now: Instant, profile: FlushProfile) -> TimerAction {
        self.flush_scheduled = false;

        if self.buf.is_empty() {
            self.pending_since = None;
            self.draining = false;
            return TimerAction::Idle;
        }
        if self.draining {
            return TimerAction::Flush;
        }

        let since_output = self
            .last_output_at
            .map_or(profile.quiet, |t| now.saturating_duration_since(t));
        let since_pending = self
            .pending_since
            .map_or(profile.max, |t| now.saturating_duration_since(t));

        if since_output < profile.quiet && since_pending < profile.max {
            let remaining = (profile.quiet - since_output).min(profile.max - since_pending);
            self.flush_scheduled = true;
            return TimerAction::Rearm(remaining);
        }
        TimerAction::Flush
    }

    /// Remove up to `limit` bytes from the front of the buffer.
    ///
    /// Returns the chunk and whether bytes remain. When they do the caller
    /// must arm the follow-up timer; the pending flush is then marked as a
    /// drain so it will not wait for quiet again.
    pub fn take_chunk(&mut self, limit: usize) -> (Vec<u8>, bool) {
        let n = self.buf.len().min(limit.max(1));
        let chunk: Vec<u8> = self.buf.drain(..n).collect();
        let more = !self.buf.is_empty();
        if more {
            self.draining = true;
            self.flush_scheduled = true;
        } else {
            self.draining = false;
            self.pending_since = None;
        }
        (chunk, more)
    }

    /// Drop everything buffered, e.g. when the tab is closed.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending_since = None;
        self.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: usize = 4 * 1024 * 1024;

    #[test]
    fn test_first_byte_arms_quiet_timer_once() {
        let mut pending = PendingOutput::default();
        let now = Instant::now();

        let (_, arm) = pending.push(b"a", now, FlushProfile::FAST, CAP);
        assert_eq!(arm, Some(FlushProfile::FAST.quiet));
        let (_, arm) = pending.push(b"b", now, FlushProfile::FAST, CAP);
        assert_eq!(arm, None, "timer already armed");
    }

    #[test]
    fn test_rearms_while_output_keeps_arriving() {
        let mut pending = PendingOutput::default();
        let t0 = Instant::now();
        pending.push(b"a", t0, FlushProfile::FAST, CAP);
        pending.push(b"b", t0 + Duration::from_millis(10), FlushProfile::FAST, CAP);

        let action = pending.on_timer(t0 + Duration::from_millis(12), FlushProfile::FAST);
        assert_eq!(action, TimerAction::Rearm(Duration::from_millis(10)));
        assert!(pending.flush_scheduled());

        let action = pending.on_timer(t0 + Duration::from_millis(22), FlushProfile::FAST);
        assert_eq!(action, TimerAction::Flush);
    }

    #[test]
    fn test_max_latency_forces_flush_under_steady_output() {
        let mut pending = PendingOutput::default();
        let t0 = Instant::now();
        let mut t = t0;
        pending.push(b"x", t, FlushProfile::FAST, CAP);

        // Output every 5ms never leaves a 12ms quiet gap.
        loop {
            t += Duration::from_millis(5);
            pending.push(b"x", t, FlushProfile::FAST, CAP);
            match pending.on_timer(t, FlushProfile::FAST) {
                TimerAction::Rearm(delay) => assert!(delay <= FlushProfile::FAST.max),
                TimerAction::Flush => break,
                TimerAction::Idle => panic!("buffer is not empty"),
            }
        }
        assert!(t - t0 >= FlushProfile::FAST.max);
        assert!(t - t0 < FlushProfile::FAST.max + Duration::from_millis(5));
    }

    #[test]
    fn test_rearm_never_exceeds_max_deadline() {
        let mut pending = PendingOutput::default();
        let t0 = Instant::now();
        pending.push(b"a", t0, FlushProfile::SLOW, CAP);
        pending.push(b"b", t0 + Duration::from_millis(115), FlushProfile::SLOW, CAP);

        let action = pending.on_timer(t0 + Duration::from_millis(116), FlushProfile::SLOW);
        assert_eq!(action, TimerAction::Rearm(Duration::from_millis(4)));
    }

    #[test]
    fn test_chunked_flush_drains_without_waiting() {
        let mut pending = PendingOutput::default();
        let t0 = Instant::now();
        pending.push(&[1u8; 100], t0, FlushProfile::FAST, CAP);

        let t1 = t0 + Duration::from_millis(12);
        assert_eq!(pending.on_timer(t1, FlushProfile::FAST), TimerAction::Flush);
        let (chunk, more) = pending.take_chunk(40);
        assert_eq!(chunk.len(), 40);
        assert!(more);

        // New output arriving mid-drain does not delay the follow-up.
        pending.push(b"z", t1, FlushProfile::FAST, CAP);
        assert_eq!(pending.on_timer(t1, FlushProfile::FAST), TimerAction::Flush);
        let (chunk, more) = pending.take_chunk(40);
        assert_eq!(chunk.len(), 40);
        assert!(more);

        assert_eq!(pending.on_timer(t1, FlushProfile::FAST), TimerAction::Flush);
        let (chunk, more) = pending.take_chunk(40);
        assert_eq!(chunk.len(), 21);
        assert!(!more);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest_bytes() {
        let mut pending = PendingOutput::default();
        let now = Instant::now();
        pending.push(b"abcdef", now, FlushProfile::FAST, 8);
        let (dropped, _) = pending.push(b"ghij", now, FlushProfile::FAST, 8);

        assert_eq!(dropped, 2);
        assert_eq!(pending.dropped(), 2);
        assert_eq!(pending.take_unreported_drops(), 2);
        assert_eq!(pending.take_unreported_drops(), 0);
        let (chunk, _) = pending.take_chunk(usize::MAX);
        assert_eq!(chunk, b"cdefghij");
    }

    #[test]
    fn test_large_burst_in_small_reads_is_flushed_exactly() {
        let input: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
        let limit = 32 * 1024;
        let mut pending = PendingOutput::default();
        let mut now = Instant::now();
        let mut timer: Option<Instant> = None;
        let mut flushed = Vec::new();
        let mut flush_sizes = Vec::new();

        let mut run_timer = |pending: &mut PendingOutput,
                             timer: &mut Option<Instant>,
                             now: Instant| {
            if let Some(due) = *timer {
                if due <= now {
                    *timer = None;
                    match pending.on_timer(now, FlushProfile::FAST) {
                        TimerAction::Idle => {}
                        TimerAction::Rearm(delay) => *timer = Some(now + delay),
                        TimerAction::Flush => {
                            let (chunk, more) = pending.take_chunk(limit);
                            flush_sizes.push(chunk.len());
                            flushed.extend_from_slice(&chunk);
                            if more {
                                *timer = Some(now + Duration::from_millis(1));
                            }
                        }
                    }
                }
            }
        };

        for piece in input.chunks(9) {
            if let (_, Some(delay)) = pending.push(piece, now, FlushProfile::FAST, CAP) {
                timer = Some(now + delay);
            }
            now += Duration::from_micros(20);
            run_timer(&mut pending, &mut timer, now);
        }
        while timer.is_some() {
            now += Duration::from_millis(1);
            run_timer(&mut pending, &mut timer, now);
        }

        assert!(flush_sizes.iter().all(|&n| n <= limit));
        assert_eq!(flushed, input);
    }
}
