// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::Serialize;
use std::time::Instant;

/// Preview metrics collected while frames are delivered
#[derive(Debug, Clone, Serialize)]
pub struct FrameMetrics {
    /// Total number of frames delivered to the consumer
    pub frames_delivered: u64,
    /// Total plane bytes delivered
    pub bytes_delivered: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Average throughput in frames per second
    pub throughput_fps: f64,
    /// Minimum interval between frames in microseconds
    pub interval_min_us: u64,
    /// Maximum interval between frames in microseconds
    pub interval_max_us: u64,
    /// Average interval between frames in microseconds
    pub interval_avg_us: u64,
    /// 50th percentile (median) interval in microseconds
    pub interval_p50_us: u64,
    /// 95th percentile interval in microseconds
    pub interval_p95_us: u64,
    /// 99th percentile interval in microseconds
    pub interval_p99_us: u64,
    /// Frames the camera skipped because no image was free
    pub skipped_frames: u64,
}

/// Metrics collector for tracking frame delivery
pub struct MetricsCollector {
    start_time: Instant,
    last_frame: Option<Instant>,
    frames: u64,
    intervals_us: Vec<u64>,
    bytes: u64,
    skipped_frames: u64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            last_frame: None,
            frames: 0,
            intervals_us: Vec::new(),
            bytes: 0,
            skipped_frames: 0,
        }
    }

    /// Record a delivered frame of `bytes` plane bytes arriving now
    pub fn record_frame(&mut self, bytes: u64) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            self.record_interval_us(now.duration_since(last).as_micros() as u64);
        }
        self.last_frame = Some(now);
        self.frames += 1;
        self.bytes += bytes;
    }

    /// Record an interval between two frames in microseconds
    pub fn record_interval_us(&mut self, interval_us: u64) {
        self.intervals_us.push(interval_us);
    }

    pub fn set_skipped_frames(&mut self, skipped: u64) {
        self.skipped_frames = skipped;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&mut self) -> FrameMetrics {
        let duration = self.start_time.elapsed();
        let duration_ms = duration.as_millis() as u64;
        let duration_secs = duration.as_secs_f64();

        let throughput_fps = if duration_secs > 0.0 {
            self.frames as f64 / duration_secs
        } else {
            0.0
        };

        self.intervals_us.sort_unstable();
        let (min_us, max_us, avg_us) = match (self.intervals_us.first(), self.intervals_us.last())
        {
            (Some(&min), Some(&max)) => {
                let sum: u64 = self.intervals_us.iter().sum();
                (min, max, sum / self.intervals_us.len() as u64)
            }
            _ => (0, 0, 0),
        };

        FrameMetrics {
            frames_delivered: self.frames,
            bytes_delivered: self.bytes,
            duration_ms,
            throughput_fps,
            interval_min_us: min_us,
            interval_max_us: max_us,
            interval_avg_us: avg_us,
            interval_p50_us: self.percentile(50.0),
            interval_p95_us: self.percentile(95.0),
            interval_p99_us: self.percentile(99.0),
            skipped_frames: self.skipped_frames,
        }
    }

    /// Calculate percentile from sorted interval data
    /// Assumes self.intervals_us is already sorted
    fn percentile(&self, p: f64) -> u64 {
        if self.intervals_us.is_empty() {
            return 0;
        }

        let len = self.intervals_us.len();
        let idx = ((p / 100.0) * (len - 1) as f64).round() as usize;
        self.intervals_us[idx.min(len - 1)]
    }

    /// Print metrics in human-readable format
    pub fn print_text(&mut self) {
        let metrics = self.finalize();
        println!("\n=== Preview Metrics ===");
        println!("Frames delivered:  {}", metrics.frames_delivered);
        println!(
            "Bytes delivered:   {} ({:.2} MB)",
            metrics.bytes_delivered,
            metrics.bytes_delivered as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Throughput:        {:.2} fps", metrics.throughput_fps);

        if metrics.frames_delivered > 1 {
            println!("\nFrame Interval (us):");
            println!("  Min:    {}", metrics.interval_min_us);
            println!("  Max:    {}", metrics.interval_max_us);
            println!("  Avg:    {}", metrics.interval_avg_us);
            println!("  P50:    {}", metrics.interval_p50_us);
            println!("  P95:    {}", metrics.interval_p95_us);
            println!("  P99:    {}", metrics.interval_p99_us);
        }

        if metrics.skipped_frames > 0 {
            println!("\nSkipped frames:    {}", metrics.skipped_frames);
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_calculation() {
        let mut collector = MetricsCollector::new();

        // 0, 10, 20, ..., 100 (11 values)
        for i in 0..=10 {
            collector.record_interval_us(i * 10);
        }

        let metrics = collector.finalize();

        assert_eq!(metrics.interval_p50_us, 50);
        assert_eq!(metrics.interval_p95_us, 100);
        assert_eq!(metrics.interval_min_us, 0);
        assert_eq!(metrics.interval_max_us, 100);
        assert_eq!(metrics.interval_avg_us, 50);
    }

    #[test]
    fn test_frames_record_intervals() {
        let mut collector = MetricsCollector::new();

        for _ in 0..30 {
            collector.record_frame(100_000);
        }

        std::thread::sleep(std::time::Duration::from_millis(100));

        let metrics = collector.finalize();

        assert_eq!(metrics.frames_delivered, 30);
        assert_eq!(metrics.bytes_delivered, 3_000_000);
        assert_eq!(collector.intervals_us.len(), 29);

        // Throughput should be roughly 300 fps (30 frames / 0.1 sec)
        assert!(metrics.throughput_fps > 100.0 && metrics.throughput_fps < 400.0);
    }

    #[test]
    fn test_empty_metrics() {
        let mut collector = MetricsCollector::new();
        collector.set_skipped_frames(4);
        let metrics = collector.finalize();

        assert_eq!(metrics.frames_delivered, 0);
        assert_eq!(metrics.bytes_delivered, 0);
        assert_eq!(metrics.interval_min_us, 0);
        assert_eq!(metrics.interval_max_us, 0);
        assert_eq!(metrics.skipped_frames, 4);
    }
}
