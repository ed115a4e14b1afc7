// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame performance metrics

use crate::constants::timing::FPS_WINDOW;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot returned by `FilterSdk::processing_metrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessingMetrics {
    /// Frames completed during the last second
    pub fps: f64,
    pub avg_processing_time_ms: f64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

#[derive(Default)]
struct Counters {
    recent: VecDeque<Instant>,
    total_processing: Duration,
    frames_processed: u64,
    frames_dropped: u64,
}

impl Counters {
    fn expire(&mut self, now: Instant) {
        while self
            .recent
            .front()
            .is_some_and(|t| now.duration_since(*t) > FPS_WINDOW)
        {
            self.recent.pop_front();
        }
    }
}

/// Thread-safe accumulator updated by the processing loop
#[derive(Default)]
pub struct MetricsTracker {
    counters: Mutex<Counters>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame that made it through the chain
    pub fn record_processed(&self, elapsed: Duration) {
        self.record_processed_at(Instant::now(), elapsed);
    }

    fn record_processed_at(&self, now: Instant, elapsed: Duration) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.frames_processed += 1;
        counters.total_processing += elapsed;
        counters.recent.push_back(now);
        counters.expire(now);
    }

    /// Record a frame that was discarded (fault, stale source, cancellation)
    pub fn record_dropped(&self) {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames_dropped += 1;
    }

    pub fn snapshot(&self) -> ProcessingMetrics {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.expire(Instant::now());
        let avg_processing_time_ms = if counters.frames_processed == 0 {
            0.0
        } else {
            counters.total_processing.as_secs_f64() * 1000.0 / counters.frames_processed as f64
        };
        ProcessingMetrics {
            fps: counters.recent.len() as f64 / FPS_WINDOW.as_secs_f64(),
            avg_processing_time_ms,
            frames_processed: counters.frames_processed,
            frames_dropped: counters.frames_dropped,
        }
    }

    pub fn reset(&self) {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner) = Counters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_and_counts() {
        let metrics = MetricsTracker::new();
        metrics.record_processed(Duration::from_millis(2));
        metrics.record_processed(Duration::from_millis(4));
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_processed, 2);
        assert_eq!(snapshot.frames_dropped, 1);
        assert!((snapshot.avg_processing_time_ms - 3.0).abs() < 1e-9);
        assert_eq!(snapshot.fps, 2.0);
    }

    #[test]
    fn test_window_expires_old_frames() {
        let metrics = MetricsTracker::new();
        let now = Instant::now();
        if let Some(old) = now.checked_sub(Duration::from_secs(5)) {
            metrics.record_processed_at(old, Duration::ZERO);
        }
        metrics.record_processed_at(now, Duration::ZERO);
        assert_eq!(metrics.snapshot().fps, 1.0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), ProcessingMetrics::default());
    }
}
