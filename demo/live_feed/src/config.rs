use std::fs;
use std::path::Path;
use std::time::Duration;

use brainwire_core::config::parse_list;
use brainwire_core::{MetricTopic, NotificationCategory, RealtimeConfig, SubscriptionOptions};

/// Configuration for the live_feed demo
#[derive(Clone, Debug)]
pub struct LiveFeedConfig {
    pub realtime: RealtimeConfig,
    /// What the demo's own view subscribes to, on top of the default subscription
    pub view: SubscriptionOptions,
    /// How often to print the notification-center summary
    pub summary_every: Duration,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        let topics = std::env::var("LIVE_FEED_TOPICS")
            .ok()
            .and_then(|raw| parse_list::<MetricTopic>(&raw).ok())
            .unwrap_or_else(|| vec![MetricTopic::Dashboard, MetricTopic::SystemHealth]);

        Self {
            realtime: RealtimeConfig::from_env(),
            view: SubscriptionOptions::default()
                .with_metrics(topics)
                .with_notifications(NotificationCategory::ALL),
            summary_every: Duration::from_secs(
                std::env::var("LIVE_FEED_SUMMARY_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

impl LiveFeedConfig {
    /// Load configuration from a TOML file (path via LIVE_FEED_CONFIG or ./live_feed.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("LIVE_FEED_CONFIG").unwrap_or_else(|_| "live_feed.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "live_feed", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<LiveFeedToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target = "live_feed", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "live_feed", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct LiveFeedToml {
    pub topics: Option<Vec<MetricTopic>>,
    pub notifications: Option<bool>,
    pub categories: Option<Vec<NotificationCategory>>,
    pub summary_every_secs: Option<u64>,
    pub connection: Option<ConnectionToml>,
    pub notifications_ui: Option<NotificationsToml>,
}

impl LiveFeedToml {
    fn overlay(self, mut base: LiveFeedConfig) -> LiveFeedConfig {
        if let Some(topics) = self.topics {
            base.view.metrics = topics.into_iter().collect();
        }
        if let Some(enabled) = self.notifications {
            base.view.notifications = enabled;
            if !enabled {
                base.view.categories.clear();
            }
        }
        if let Some(categories) = self.categories {
            base.view.categories = categories.into_iter().collect();
        }
        if let Some(secs) = self.summary_every_secs {
            base.summary_every = Duration::from_secs(secs.max(1));
        }
        if let Some(c) = self.connection {
            c.apply(&mut base.realtime);
        }
        if let Some(n) = self.notifications_ui {
            n.apply(&mut base.realtime);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ConnectionToml {
    pub url: Option<String>,
    pub heartbeat_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub reconnect_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub backoff_multiplier: Option<f64>,
    pub max_backoff_ms: Option<u64>,
}
impl ConnectionToml {
    fn apply(self, r: &mut RealtimeConfig) {
        if let Some(v) = self.url {
            r.url = v;
        }
        if let Some(v) = self.heartbeat_ms {
            r.heartbeat_interval = Duration::from_millis(v);
            r.heartbeat_timeout = Duration::from_millis(v.saturating_mul(2));
        }
        if let Some(v) = self.heartbeat_timeout_ms {
            r.heartbeat_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.reconnect_ms {
            r.reconnect_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.max_reconnect_attempts {
            r.max_reconnect_attempts = v;
        }
        if let Some(v) = self.backoff_multiplier {
            r.backoff_multiplier = v;
        }
        if let Some(v) = self.max_backoff_ms {
            r.max_backoff_delay = Duration::from_millis(v);
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct NotificationsToml {
    pub toast_window_ms: Option<u64>,
    pub max_toasts: Option<usize>,
    pub history_limit: Option<usize>,
    pub default_dismiss_ms: Option<u64>,
}
impl NotificationsToml {
    fn apply(self, r: &mut RealtimeConfig) {
        let n = &mut r.notifications;
        if let Some(v) = self.toast_window_ms {
            n.toast_window = Duration::from_millis(v);
        }
        if let Some(v) = self.max_toasts {
            n.max_toasts = v;
        }
        if let Some(v) = self.history_limit {
            n.history_limit = v;
        }
        if let Some(v) = self.default_dismiss_ms {
            n.default_dismiss_after = Duration::from_millis(v);
        }
    }
}
