//! Notifications: inbound events, their per-item state and the queue that
//! backs both the toast stack and the notification center.
//!
//! Per-notification state machine:
//!
//! ```text
//! active-unread ──mark_read──▶ active-read
//!       │                          │
//!       └────dismiss / auto────────┴──▶ dismissed (terminal)
//! ```

mod queue;

pub use queue::{NotificationQueue, QueueEvent};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BrainwireError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    #[default]
    System,
    Campaign,
    Lead,
    Payment,
    AiAgent,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 5] = [
        NotificationCategory::System,
        NotificationCategory::Campaign,
        NotificationCategory::Lead,
        NotificationCategory::Payment,
        NotificationCategory::AiAgent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::System => "system",
            NotificationCategory::Campaign => "campaign",
            NotificationCategory::Lead => "lead",
            NotificationCategory::Payment => "payment",
            NotificationCategory::AiAgent => "ai_agent",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationCategory {
    type Err = BrainwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| BrainwireError::Config(format!("unknown notification category: {}", s)))
    }
}

/// Notification as delivered on the wire (or pushed locally by the host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Server-assigned id. A random id is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub category: NotificationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(default)]
    pub auto_dismiss: bool,
    /// Milliseconds until automatic dismissal.
    #[serde(
        default,
        rename = "dismiss_after",
        skip_serializing_if = "Option::is_none"
    )]
    pub dismiss_after_ms: Option<u64>,
}

impl NotificationEvent {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            message: message.into(),
            severity: Severity::default(),
            category: NotificationCategory::default(),
            timestamp: None,
            action_url: None,
            auto_dismiss: false,
            dismiss_after_ms: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: NotificationCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// Auto-dismiss after `ms`; `None` uses the queue default.
    pub fn auto_dismiss(mut self, ms: Option<u64>) -> Self {
        self.auto_dismiss = true;
        self.dismiss_after_ms = ms;
        self
    }
}

/// Notification as held by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub category: NotificationCategory,
    pub timestamp: DateTime<Utc>,
    pub action_url: Option<String>,
    pub read: bool,
    pub dismissed: bool,
    /// Effective auto-dismiss delay, when auto-dismiss applies.
    pub dismiss_after_ms: Option<u64>,
}

impl Notification {
    pub fn is_active(&self) -> bool {
        !self.dismissed
    }

    pub fn is_unread(&self) -> bool {
        !self.dismissed && !self.read
    }
}

/// Notification center view selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
    Category(NotificationCategory),
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Unread => notification.is_unread(),
            NotificationFilter::Category(category) => notification.category == *category,
        }
    }
}

impl FromStr for NotificationFilter {
    type Err = BrainwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(NotificationFilter::All),
            "unread" => Ok(NotificationFilter::Unread),
            other => other.parse().map(NotificationFilter::Category),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parsing() {
        assert_eq!(
            "unread".parse::<NotificationFilter>().unwrap(),
            NotificationFilter::Unread
        );
        assert_eq!(
            "ai_agent".parse::<NotificationFilter>().unwrap(),
            NotificationFilter::Category(NotificationCategory::AiAgent)
        );
        assert!("billing".parse::<NotificationFilter>().is_err());
    }

    #[test]
    fn event_builder_sets_auto_dismiss() {
        let event = NotificationEvent::new("Payment received", "$120 from Acme")
            .with_category(NotificationCategory::Payment)
            .with_severity(Severity::Success)
            .auto_dismiss(Some(3_000));
        assert!(event.auto_dismiss);
        assert_eq!(event.dismiss_after_ms, Some(3_000));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["dismiss_after"], 3_000);
        assert_eq!(json["category"], "payment");
        assert_eq!(json["severity"], "success");
    }
}
