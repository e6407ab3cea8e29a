use crate::landmark::seconds_between;
use std::collections::VecDeque;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Tuning for the rolling angle filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    /// Number of accepted raw values kept for median and smoothing
    pub window_size: usize,
    /// Deviation from the window median (degrees) treated as a spike
    pub outlier_threshold: f64,
    /// Consecutive spikes tolerated before a sample is accepted as a real step change (0 disables)
    pub max_consecutive_outliers: u32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            window_size: 5,
            outlier_threshold: 30.0,
            max_consecutive_outliers: 3,
        }
    }
}

/// One filtered angle measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleSample {
    /// Angle as measured this frame, before outlier rejection
    pub raw: f64,
    /// Recency-weighted average over the window
    pub smoothed: f64,
    /// Smoothed angle rate of change in degrees per second
    pub velocity: f64,
    pub timestamp: SystemTime,
}

/// Median-gated, recency-weighted moving average for one joint triple
#[derive(Debug, Clone)]
pub struct AngleFilter {
    settings: FilterSettings,
    window: VecDeque<f64>,
    consecutive_outliers: u32,
    last_smoothed: Option<f64>,
    last_timestamp: Option<SystemTime>,
    velocity: f64,
}

impl AngleFilter {
    pub fn new(settings: FilterSettings) -> Self {
        let window_size = settings.window_size.max(1);
        Self {
            settings: FilterSettings {
                window_size,
                ..settings
            },
            window: VecDeque::with_capacity(window_size + 1),
            consecutive_outliers: 0,
            last_smoothed: None,
            last_timestamp: None,
            velocity: 0.0,
        }
    }

    /// Feed a raw angle and get the filtered sample
    pub fn update(&mut self, raw: f64, timestamp: SystemTime) -> AngleSample {
        if self.window.is_empty() {
            // No history: pass through unsmoothed
            self.window.push_back(raw);
            self.consecutive_outliers = 0;
            return self.finish(raw, raw, timestamp);
        }

        let median = self.median();
        let value = if (raw - median).abs() > self.settings.outlier_threshold {
            if self.settings.max_consecutive_outliers > 0
                && self.consecutive_outliers >= self.settings.max_consecutive_outliers
            {
                debug!(
                    "Accepting {:.1}° as a step change after {} rejected samples (median {:.1}°)",
                    raw, self.consecutive_outliers, median
                );
                self.window.clear();
                self.consecutive_outliers = 0;
                raw
            } else {
                self.consecutive_outliers += 1;
                trace!(
                    "Rejecting outlier {:.1}° (median {:.1}°), substituting median",
                    raw,
                    median
                );
                median
            }
        } else {
            self.consecutive_outliers = 0;
            raw
        };

        self.window.push_back(value);
        while self.window.len() > self.settings.window_size {
            self.window.pop_front();
        }

        let smoothed = self.weighted_average();
        self.finish(raw, smoothed, timestamp)
    }

    fn finish(&mut self, raw: f64, smoothed: f64, timestamp: SystemTime) -> AngleSample {
        if let (Some(previous), Some(last_timestamp)) = (self.last_smoothed, self.last_timestamp) {
            let elapsed = seconds_between(last_timestamp, timestamp);
            if elapsed > 0.0 {
                self.velocity = (smoothed - previous) / elapsed;
            } else {
                trace!(
                    "Non-positive frame interval ({:.3}s), holding velocity at {:.1}°/s",
                    elapsed,
                    self.velocity
                );
            }
        }

        self.last_smoothed = Some(smoothed);
        self.last_timestamp = Some(timestamp);

        AngleSample {
            raw,
            smoothed,
            velocity: self.velocity,
            timestamp,
        }
    }

    fn median(&self) -> f64 {
        let mut values: Vec<f64> = self.window.iter().copied().collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }

    /// Linear weights, oldest 1 through newest n, expressed as an offset from
    /// the newest value so a constant window averages to exactly that value.
    fn weighted_average(&self) -> f64 {
        let newest = match self.window.back() {
            Some(value) => *value,
            None => return 0.0,
        };

        let (weighted, total) = self
            .window
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(weighted, total), (i, value)| {
                let weight = (i + 1) as f64;
                (weighted + weight * (value - newest), total + weight)
            });

        newest + weighted / total
    }

    /// Clear all history
    pub fn reset(&mut self) {
        self.window.clear();
        self.consecutive_outliers = 0;
        self.last_smoothed = None;
        self.last_timestamp = None;
        self.velocity = 0.0;
    }

    /// Number of values currently in the window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn last_smoothed(&self) -> Option<f64> {
        self.last_smoothed
    }
}
