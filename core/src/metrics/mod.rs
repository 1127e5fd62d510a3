// Metrics cache
//
// Last-value-wins store for metric_update frames. One sample per stream id;
// older samples are discarded. Consumers that chart a series keep their own
// MetricSeries fed from the update listener.

mod series;

pub use series::{MetricSeries, SeriesPoint};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::listeners::{ListenerId, Listeners};
use crate::protocol::MetricUpdate;

/// Current value of one metric stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub topic: String,
    pub value: Value,
    /// Local arrival time.
    pub received_at: DateTime<Utc>,
    /// Sample time reported by the server, if any.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Cache-wide arrival counter; strictly increasing.
    pub sequence: u64,
}

impl MetricSample {
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }
}

/// Latest sample per stream, shared by every consumer.
#[derive(Debug, Default)]
pub struct MetricsCache {
    samples: DashMap<String, MetricSample>,
    sequence: AtomicU64,
    listeners: Listeners<MetricSample>,
    cleared: Listeners<()>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached value for the update's topic and notify listeners.
    pub fn apply(&self, update: MetricUpdate) -> MetricSample {
        let sample = MetricSample {
            topic: update.topic,
            value: update.value,
            received_at: Utc::now(),
            server_timestamp: update.timestamp,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
        };
        debug!(topic = %sample.topic, seq = sample.sequence, "Metric updated");
        // Guard dropped before listeners run
        self.samples.insert(sample.topic.clone(), sample.clone());
        self.listeners.notify(&sample);
        sample
    }

    pub fn get(&self, topic: &str) -> Option<MetricSample> {
        self.samples.get(topic).map(|s| s.clone())
    }

    pub fn value(&self, topic: &str) -> Option<Value> {
        self.samples.get(topic).map(|s| s.value.clone())
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn snapshot(&self) -> HashMap<String, MetricSample> {
        self.samples
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop every cached sample and notify clear listeners.
    pub fn clear(&self) {
        self.samples.clear();
        debug!("Metrics cache cleared");
        self.cleared.notify(&());
    }

    /// Called with every new sample, synchronously, after it is stored.
    pub fn on_update<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&MetricSample) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Called after `clear()`, so charting consumers can reset their series.
    pub fn on_clear<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleared.add(move |_| callback())
    }

    pub fn remove_clear_listener(&self, id: ListenerId) -> bool {
        self.cleared.remove(id)
    }
}
