//! Per-frame telemetry with bounded rolling history.
//!
//! Every completed frame produces a [`FrameReport`], recorded into a
//! fixed-capacity ring so long battles never grow telemetry without bound.
//! Rolling statistics (effective FPS, average frame time, event counts) are
//! computed over whatever the ring currently holds.

use serde::{Deserialize, Serialize};

use std::collections::VecDeque;
use std::time::Duration;

/// Default rolling-history capacity, ~2 seconds at 60 fps.
pub const DEFAULT_HISTORY_CAPACITY: usize = 120;

// ---------------------------------------------------------------------------
// FrameReport
// ---------------------------------------------------------------------------

/// The outbound per-frame notification payload. Emitted every frame,
/// whether or not visible state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: u64,
    pub events_processed: usize,
    /// Dispatches that failed: missing handler, handler error, or a handler
    /// that tried to defer.
    pub failed_dispatches: usize,
    pub members_updated: usize,
    /// Wall-clock time spent processing the frame, in microseconds.
    pub processing_us: u64,
}

// ---------------------------------------------------------------------------
// TelemetryStats
// ---------------------------------------------------------------------------

/// Rolling statistics over the recorded history window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub frames_recorded: usize,
    /// Mean frame processing time in microseconds.
    pub avg_processing_us: f64,
    pub max_processing_us: u64,
    pub avg_events_per_frame: f64,
    pub total_failed_dispatches: usize,
    /// Frames the window could sustain per second at the mean cost.
    pub effective_fps: f64,
}

// ---------------------------------------------------------------------------
// FrameTelemetry
// ---------------------------------------------------------------------------

/// Bounded ring of frame reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameTelemetry {
    history: VecDeque<FrameReport>,
    capacity: usize,
    /// Lifetime counters, not bounded by the ring.
    total_frames: u64,
    total_events: u64,
}

impl Default for FrameTelemetry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl FrameTelemetry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            total_frames: 0,
            total_events: 0,
        }
    }

    /// Record one frame, evicting the oldest report when the ring is full.
    pub fn record(&mut self, report: FrameReport) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.total_frames += 1;
        self.total_events += report.events_processed as u64;
        self.history.push_back(report);
    }

    pub fn last(&self) -> Option<&FrameReport> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &FrameReport> {
        self.history.iter()
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// Statistics over the current window. Zeroed when empty.
    pub fn stats(&self) -> TelemetryStats {
        let n = self.history.len();
        if n == 0 {
            return TelemetryStats::default();
        }
        let total_us: u64 = self.history.iter().map(|r| r.processing_us).sum();
        let max_us = self
            .history
            .iter()
            .map(|r| r.processing_us)
            .max()
            .unwrap_or(0);
        let total_events: usize = self.history.iter().map(|r| r.events_processed).sum();
        let failed: usize = self.history.iter().map(|r| r.failed_dispatches).sum();

        let avg_us = total_us as f64 / n as f64;
        let effective_fps = if avg_us > 0.0 {
            1_000_000.0 / avg_us
        } else {
            f64::INFINITY
        };

        TelemetryStats {
            frames_recorded: n,
            avg_processing_us: avg_us,
            max_processing_us: max_us,
            avg_events_per_frame: total_events as f64 / n as f64,
            total_failed_dispatches: failed,
            effective_fps,
        }
    }
}

/// Microsecond helper for report construction.
pub fn as_micros(duration: Duration) -> u64 {
    duration.as_micros() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn report(frame: u64, events: usize, us: u64) -> FrameReport {
        FrameReport {
            frame,
            events_processed: events,
            failed_dispatches: 0,
            members_updated: 0,
            processing_us: us,
        }
    }

    #[test]
    fn ring_evicts_oldest_when_full() {
        let mut telemetry = FrameTelemetry::with_capacity(3);
        for i in 0..5 {
            telemetry.record(report(i, 1, 100));
        }
        let frames: Vec<u64> = telemetry.history().map(|r| r.frame).collect();
        assert_eq!(frames, vec![2, 3, 4]);
        // Lifetime counters are not bounded by the ring.
        assert_eq!(telemetry.total_frames(), 5);
        assert_eq!(telemetry.total_events(), 5);
    }

    #[test]
    fn stats_over_window() {
        let mut telemetry = FrameTelemetry::with_capacity(10);
        telemetry.record(report(0, 2, 100));
        telemetry.record(report(1, 4, 300));

        let stats = telemetry.stats();
        assert_eq!(stats.frames_recorded, 2);
        assert_eq!(stats.avg_processing_us, 200.0);
        assert_eq!(stats.max_processing_us, 300);
        assert_eq!(stats.avg_events_per_frame, 3.0);
        assert_eq!(stats.effective_fps, 5_000.0);
    }

    #[test]
    fn empty_stats_are_zeroed() {
        let telemetry = FrameTelemetry::default();
        assert_eq!(telemetry.stats(), TelemetryStats::default());
        assert!(telemetry.last().is_none());
    }
}
