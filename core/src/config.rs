// Realtime pipeline configuration
//
// Defaults match what the dashboard shipped with; every field can be
// overridden by the host at construction time or through BRAINWIRE_* env vars.

use std::str::FromStr;
use std::time::Duration;

use crate::connection::BackoffPolicy;
use crate::notification::NotificationCategory;
use crate::subscription::{MetricTopic, SubscriptionOptions};
use crate::{BrainwireError, Result};

pub const DEFAULT_URL: &str = "ws://localhost:8080/ws";

/// Toast and notification-center tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationConfig {
    /// A notification older than this is no longer shown as a toast.
    pub toast_window: Duration,
    /// Maximum toasts visible at once; the oldest is evicted first.
    pub max_toasts: usize,
    /// Maximum notifications retained for the notification center.
    pub history_limit: usize,
    /// Delay used for `auto_dismiss` notifications that carry no explicit one.
    pub default_dismiss_after: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            toast_window: Duration::from_secs(5),
            max_toasts: 5,
            history_limit: 200,
            default_dismiss_after: Duration::from_secs(5),
        }
    }
}

/// Connection, subscription and notification settings for one provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RealtimeConfig {
    pub url: String,
    pub heartbeat_interval: Duration,
    /// No inbound frame for this long means the connection is dead.
    pub heartbeat_timeout: Duration,
    /// First reconnect delay; later ones grow by `backoff_multiplier`.
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub backoff_multiplier: f64,
    pub max_backoff_delay: Duration,
    /// Interest registered on the provider's own behalf at start-up.
    pub default_subscription: SubscriptionOptions,
    pub notifications: NotificationConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            backoff_multiplier: 2.0,
            max_backoff_delay: Duration::from_secs(30),
            default_subscription: SubscriptionOptions::default()
                .with_metrics([MetricTopic::Dashboard])
                .with_notifications(NotificationCategory::ALL),
            notifications: NotificationConfig::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Defaults overlaid with any BRAINWIRE_* environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = std::env::var("BRAINWIRE_WS_URL")
            .ok()
            .filter(|s| !s.is_empty())
        {
            config.url = url;
        }
        if let Some(ms) = env_parse::<u64>("BRAINWIRE_HEARTBEAT_MS") {
            config.heartbeat_interval = Duration::from_millis(ms);
            config.heartbeat_timeout = Duration::from_millis(ms.saturating_mul(2));
        }
        if let Some(ms) = env_parse::<u64>("BRAINWIRE_HEARTBEAT_TIMEOUT_MS") {
            config.heartbeat_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("BRAINWIRE_RECONNECT_MS") {
            config.reconnect_interval = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("BRAINWIRE_MAX_RECONNECT_ATTEMPTS") {
            config.max_reconnect_attempts = n;
        }
        if let Some(m) = env_parse::<f64>("BRAINWIRE_BACKOFF_MULTIPLIER") {
            config.backoff_multiplier = m;
        }
        if let Some(ms) = env_parse::<u64>("BRAINWIRE_MAX_BACKOFF_MS") {
            config.max_backoff_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("BRAINWIRE_TOAST_WINDOW_MS") {
            config.notifications.toast_window = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("BRAINWIRE_MAX_TOASTS") {
            config.notifications.max_toasts = n;
        }
        if let Some(n) = env_parse::<usize>("BRAINWIRE_HISTORY_LIMIT") {
            config.notifications.history_limit = n;
        }
        if let Ok(raw) = std::env::var("BRAINWIRE_TOPICS") {
            match parse_list::<MetricTopic>(&raw) {
                Ok(topics) => config.default_subscription.metrics = topics.into_iter().collect(),
                Err(e) => tracing::warn!(error = %e, "Ignoring BRAINWIRE_TOPICS"),
            }
        }
        config
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: self.reconnect_interval,
            multiplier: self.backoff_multiplier,
            max_delay: self.max_backoff_delay,
            max_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(BrainwireError::Config(format!(
                "url must use ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(BrainwireError::Config(
                "heartbeat_interval must be positive".into(),
            ));
        }
        if self.heartbeat_timeout < self.heartbeat_interval {
            return Err(BrainwireError::Config(
                "heartbeat_timeout must be at least heartbeat_interval".into(),
            ));
        }
        if self.reconnect_interval.is_zero() {
            return Err(BrainwireError::Config(
                "reconnect_interval must be positive".into(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(BrainwireError::Config(
                "backoff_multiplier must be >= 1.0".into(),
            ));
        }
        if self.notifications.max_toasts == 0 {
            return Err(BrainwireError::Config("max_toasts must be >= 1".into()));
        }
        if self.notifications.history_limit == 0 {
            return Err(BrainwireError::Config("history_limit must be >= 1".into()));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a comma separated list, ignoring blanks.
pub fn parse_list<T>(raw: &str) -> Result<Vec<T>>
where
    T: FromStr<Err = BrainwireError>,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
