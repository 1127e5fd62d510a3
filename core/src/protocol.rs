//! Wire protocol spoken with the Brain realtime endpoint.
//!
//! Every frame is a JSON text message with a `"type"` discriminator. Frames
//! are decoded exactly once, at the connection boundary, into
//! [`ServerMessage`]; nothing downstream looks at raw JSON again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notification::NotificationEvent;
use crate::subscription::SubscriptionOptions;
use crate::{BrainwireError, Result};

/// Messages pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Latest value for one metric stream.
    MetricUpdate(MetricUpdate),

    /// An event that should surface as a notification.
    Notification(NotificationEvent),

    /// Liveness signal. Older servers answer pings with `"pong"`.
    #[serde(alias = "pong")]
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },

    /// Server-side failure report. Informational only.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl ServerMessage {
    /// Short label used in logs and stats.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::MetricUpdate(_) => "metric_update",
            ServerMessage::Notification(_) => "notification",
            ServerMessage::Heartbeat { .. } => "heartbeat",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// Payload of a `metric_update` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdate {
    /// Stream id, e.g. `campaigns` or `system_health`.
    pub topic: String,
    pub value: Value,
    /// Server-side sample time (RFC 3339), when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Commands sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Replace the server-side subscription with this merged option set.
    Subscribe(SubscriptionOptions),

    /// Keepalive, sent every heartbeat interval.
    Ping { timestamp: i64 },
}

impl ClientCommand {
    pub fn ping_now() -> Self {
        ClientCommand::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Decode one inbound text frame.
pub fn decode(frame: &str) -> Result<ServerMessage> {
    serde_json::from_str(frame).map_err(|e| BrainwireError::Decode(e.to_string()))
}

/// Encode one outbound command as a text frame.
pub fn encode(command: &ClientCommand) -> Result<String> {
    Ok(serde_json::to_string(command)?)
}
