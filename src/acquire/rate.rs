// src/acquire/rate.rs

//! Smoothed throughput and ETA estimation

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Upper bound on samples kept in the window
pub const MAX_WINDOW: usize = 8;

/// Sliding window over recent byte-rate samples
///
/// Each sample is `Δbytes / Δt` between two consecutive observations. The
/// smoothed rate is the mean of the last `capacity` samples.
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    last: Option<(Instant, u64)>,
}

impl ThroughputWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_WINDOW);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            last: None,
        }
    }

    /// Feed the cumulative byte count observed at `now`; returns the
    /// smoothed rate in bytes per second
    pub fn record(&mut self, now: Instant, bytes_done: u64) -> f64 {
        if let Some((then, before)) = self.last {
            let dt = now.saturating_duration_since(then).as_secs_f64();
            if dt > 0.0 {
                let delta = bytes_done.saturating_sub(before) as f64;
                if self.samples.len() == self.capacity {
                    self.samples.pop_front();
                }
                self.samples.push_back(delta / dt);
                self.last = Some((now, bytes_done));
            }
        } else {
            self.last = Some((now, bytes_done));
        }
        self.smoothed()
    }

    pub fn smoothed(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Time to fetch `remaining` bytes; `None` while the rate is at or below
    /// `min_rate` bytes/s
    pub fn eta(&self, remaining: u64, min_rate: u64) -> Option<Duration> {
        let rate = self.smoothed();
        if rate <= min_rate as f64 || rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Human-readable byte count (binary units)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Compact duration such as `1h02m`, `3m05s` or `42s`
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_smooths_and_caps() {
        let mut window = ThroughputWindow::new(3);
        let start = Instant::now();

        assert_eq!(window.record(start, 0), 0.0);
        window.record(start + Duration::from_secs(1), 1000);
        window.record(start + Duration::from_secs(2), 3000);
        let rate = window.record(start + Duration::from_secs(3), 6000);
        assert_eq!(rate, 2000.0);

        // Fourth sample evicts the first
        let rate = window.record(start + Duration::from_secs(4), 10_000);
        assert_eq!(window.len(), 3);
        assert_eq!(rate, 3000.0);
    }

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(ThroughputWindow::new(0).capacity, 1);
        assert_eq!(ThroughputWindow::new(64).capacity, MAX_WINDOW);
    }

    #[test]
    fn test_eta_requires_minimum_rate() {
        let mut window = ThroughputWindow::new(8);
        let start = Instant::now();
        window.record(start, 0);
        window.record(start + Duration::from_secs(1), 100);

        assert!(window.eta(1000, 16 * 1024).is_none());
        assert_eq!(window.eta(1000, 10), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
        assert_eq!(format_eta(Duration::from_secs(42)), "42s");
        assert_eq!(format_eta(Duration::from_secs(185)), "3m05s");
        assert_eq!(format_eta(Duration::from_secs(3720)), "1h02m");
    }
}
