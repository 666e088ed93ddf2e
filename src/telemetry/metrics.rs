//! Conversion metrics
//!
//! Per-player frame counters and conversion cost statistics. All counters are
//! monotonic for the life of the player and read as zero before the first frame.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use crate::video::AccessKind;

/// Conversion costs kept for percentile statistics
const RECENT_WINDOW: usize = 240;

/// Snapshot of a player's conversion statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionStats {
    /// Frames converted from real sample data
    pub decoded_frames: u64,
    /// Zero-filled or synthetic frames
    pub fallback_frames: u64,
    pub gpu_staged_frames: u64,
    pub cpu_mapped_frames: u64,
    pub avg_us: f64,
    pub peak_us: f64,
    pub last_us: f64,
    /// 95th percentile over the recent window
    pub p95_us: f64,
    pub sample_count: u64,
}

#[derive(Debug, Clone)]
pub struct ConversionMetrics {
    decoded_frames: u64,
    fallback_frames: u64,
    gpu_staged_frames: u64,
    cpu_mapped_frames: u64,
    last: Duration,
    peak: Duration,
    total: Duration,
    samples: u64,
    recent: VecDeque<Duration>,
}

impl Default for ConversionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionMetrics {
    pub fn new() -> Self {
        Self {
            decoded_frames: 0,
            fallback_frames: 0,
            gpu_staged_frames: 0,
            cpu_mapped_frames: 0,
            last: Duration::ZERO,
            peak: Duration::ZERO,
            total: Duration::ZERO,
            samples: 0,
            recent: VecDeque::with_capacity(RECENT_WINDOW),
        }
    }

    /// Record a frame converted from real sample data.
    pub fn record_decoded(&mut self, cost: Duration, access: AccessKind) {
        self.decoded_frames += 1;
        self.count_access(access);

        self.last = cost;
        self.peak = self.peak.max(cost);
        self.total += cost;
        self.samples += 1;

        self.recent.push_back(cost);
        if self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    /// Record a frame with no usable source data. Excluded from cost statistics.
    pub fn record_fallback(&mut self, access: Option<AccessKind>) {
        self.fallback_frames += 1;
        if let Some(access) = access {
            self.count_access(access);
        }
    }

    fn count_access(&mut self, access: AccessKind) {
        match access {
            AccessKind::GpuStaged => self.gpu_staged_frames += 1,
            AccessKind::CpuMapped => self.cpu_mapped_frames += 1,
        }
    }

    pub fn decoded_frames(&self) -> u64 {
        self.decoded_frames
    }

    pub fn fallback_frames(&self) -> u64 {
        self.fallback_frames
    }

    /// Frames served by (GPU staging, CPU mapping)
    pub fn access_counts(&self) -> (u64, u64) {
        (self.gpu_staged_frames, self.cpu_mapped_frames)
    }

    pub fn average_micros(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        micros(self.total) / self.samples as f64
    }

    pub fn peak_micros(&self) -> f64 {
        micros(self.peak)
    }

    pub fn last_micros(&self) -> f64 {
        micros(self.last)
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn stats(&self) -> ConversionStats {
        let mut recent: Vec<f64> = self.recent.iter().copied().map(micros).collect();
        recent.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        ConversionStats {
            decoded_frames: self.decoded_frames,
            fallback_frames: self.fallback_frames,
            gpu_staged_frames: self.gpu_staged_frames,
            cpu_mapped_frames: self.cpu_mapped_frames,
            avg_us: self.average_micros(),
            peak_us: self.peak_micros(),
            last_us: self.last_micros(),
            p95_us: percentile(&recent, 0.95),
            sample_count: self.samples,
        }
    }
}

fn micros(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000_000.0
}

/// Calculate percentile from sorted array
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics_read_zero() {
        let metrics = ConversionMetrics::new();
        assert_eq!(metrics.stats(), ConversionStats::default());
        assert_eq!(metrics.average_micros(), 0.0);
    }

    #[test]
    fn test_cost_statistics() {
        let mut metrics = ConversionMetrics::new();
        metrics.record_decoded(Duration::from_micros(100), AccessKind::CpuMapped);
        metrics.record_decoded(Duration::from_micros(300), AccessKind::GpuStaged);
        metrics.record_decoded(Duration::from_micros(200), AccessKind::CpuMapped);

        assert_eq!(metrics.decoded_frames(), 3);
        assert_eq!(metrics.sample_count(), 3);
        assert!((metrics.average_micros() - 200.0).abs() < 1e-6);
        assert!((metrics.peak_micros() - 300.0).abs() < 1e-6);
        assert!((metrics.last_micros() - 200.0).abs() < 1e-6);
        assert_eq!(metrics.access_counts(), (1, 2));
    }

    #[test]
    fn test_fallback_excluded_from_costs() {
        let mut metrics = ConversionMetrics::new();
        metrics.record_decoded(Duration::from_micros(50), AccessKind::CpuMapped);
        metrics.record_fallback(Some(AccessKind::CpuMapped));
        metrics.record_fallback(None);

        assert_eq!(metrics.fallback_frames(), 2);
        assert_eq!(metrics.decoded_frames(), 1);
        assert_eq!(metrics.sample_count(), 1);
        assert!((metrics.last_micros() - 50.0).abs() < 1e-6);
        assert_eq!(metrics.access_counts(), (0, 2));
    }

    #[test]
    fn test_percentile() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.5), 3.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }
}
