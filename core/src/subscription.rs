// Subscription registry
//
// Several views can want realtime data at once. Each registers its own
// option set under a ConsumerId; the server only ever sees the union.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notification::NotificationCategory;
use crate::BrainwireError;

/// Metric streams a view can ask the server to push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTopic {
    Dashboard,
    SocialMedia,
    Campaigns,
    Leads,
    SystemHealth,
    AiAgents,
}

impl MetricTopic {
    pub const ALL: [MetricTopic; 6] = [
        MetricTopic::Dashboard,
        MetricTopic::SocialMedia,
        MetricTopic::Campaigns,
        MetricTopic::Leads,
        MetricTopic::SystemHealth,
        MetricTopic::AiAgents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricTopic::Dashboard => "dashboard",
            MetricTopic::SocialMedia => "social_media",
            MetricTopic::Campaigns => "campaigns",
            MetricTopic::Leads => "leads",
            MetricTopic::SystemHealth => "system_health",
            MetricTopic::AiAgents => "ai_agents",
        }
    }
}

impl fmt::Display for MetricTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricTopic {
    type Err = BrainwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricTopic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s.trim())
            .ok_or_else(|| BrainwireError::Config(format!("unknown metric topic: {}", s)))
    }
}

/// What one consumer wants the server to push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    #[serde(default)]
    pub metrics: BTreeSet<MetricTopic>,
    #[serde(default)]
    pub notifications: bool,
    #[serde(default)]
    pub categories: BTreeSet<NotificationCategory>,
    #[serde(default = "default_real_time_updates")]
    pub real_time_updates: bool,
}

fn default_real_time_updates() -> bool {
    true
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            metrics: BTreeSet::new(),
            notifications: false,
            categories: BTreeSet::new(),
            real_time_updates: true,
        }
    }
}

impl SubscriptionOptions {
    /// The merged set of a registry with no consumers.
    pub fn empty() -> Self {
        Self {
            real_time_updates: false,
            ..Self::default()
        }
    }

    pub fn with_metrics<I: IntoIterator<Item = MetricTopic>>(mut self, topics: I) -> Self {
        self.metrics.extend(topics);
        self
    }

    pub fn with_notifications<I: IntoIterator<Item = NotificationCategory>>(
        mut self,
        categories: I,
    ) -> Self {
        self.notifications = true;
        self.categories.extend(categories);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && !self.notifications && self.categories.is_empty()
    }

    fn merge(&mut self, other: &SubscriptionOptions) {
        self.metrics.extend(other.metrics.iter().copied());
        self.categories.extend(other.categories.iter().copied());
        self.notifications |= other.notifications;
        self.real_time_updates |= other.real_time_updates;
    }
}

/// Opaque handle naming one registered consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Registry of consumer interests and their union.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    consumers: Mutex<HashMap<ConsumerId, SubscriptionOptions>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new consumer. Nothing is registered yet.
    pub fn register_consumer(&self) -> ConsumerId {
        ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Record (or replace) a consumer's interest.
    ///
    /// Returns the new merged set when the union changed, `None` when the
    /// call did not change what the server should be sending.
    pub fn subscribe(
        &self,
        consumer: ConsumerId,
        options: SubscriptionOptions,
    ) -> Option<SubscriptionOptions> {
        let mut consumers = self.lock();
        let before = Self::union(&consumers);
        consumers.insert(consumer, options);
        let after = Self::union(&consumers);
        if before == after {
            debug!(%consumer, "Subscription unchanged");
            None
        } else {
            debug!(%consumer, topics = ?after.metrics, "Subscription set changed");
            Some(after)
        }
    }

    /// Drop a consumer's interest. Topics other consumers still want stay.
    pub fn unsubscribe(&self, consumer: ConsumerId) -> Option<SubscriptionOptions> {
        let mut consumers = self.lock();
        let before = Self::union(&consumers);
        consumers.remove(&consumer)?;
        let after = Self::union(&consumers);
        if before == after {
            None
        } else {
            debug!(%consumer, topics = ?after.metrics, "Subscription set shrank");
            Some(after)
        }
    }

    /// Union of every registered consumer's options.
    pub fn merged(&self) -> SubscriptionOptions {
        Self::union(&self.lock())
    }

    pub fn consumer_count(&self) -> usize {
        self.lock().len()
    }

    /// How many consumers currently want a metric topic.
    pub fn interest_in(&self, topic: MetricTopic) -> usize {
        self.lock()
            .values()
            .filter(|options| options.metrics.contains(&topic))
            .count()
    }

    fn union(consumers: &HashMap<ConsumerId, SubscriptionOptions>) -> SubscriptionOptions {
        consumers
            .values()
            .fold(SubscriptionOptions::empty(), |mut acc, options| {
                acc.merge(options);
                acc
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConsumerId, SubscriptionOptions>> {
        self.consumers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
