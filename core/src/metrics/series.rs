//! Bounded rolling window of numeric samples for charting.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::MetricSample;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Sliding window of the most recent points; the oldest point is evicted
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct MetricSeries {
    capacity: usize,
    points: VecDeque<SeriesPoint>,
}

impl Default for MetricSeries {
    fn default() -> Self {
        Self::new(60)
    }
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, at: DateTime<Utc>, value: f64) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(SeriesPoint { at, value });
    }

    /// Append a cache sample. Non-numeric samples are skipped.
    pub fn push_sample(&mut self, sample: &MetricSample) -> bool {
        match sample.as_f64() {
            Some(value) => {
                self.push(sample.server_timestamp.unwrap_or(sample.received_at), value);
                true
            }
            None => false,
        }
    }

    pub fn latest(&self) -> Option<SeriesPoint> {
        self.points.back().copied()
    }

    /// Values oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn points(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    pub fn min(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().map(|p| p.value).sum::<f64>() / self.points.len() as f64)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
