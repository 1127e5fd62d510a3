use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Automatic retries exhausted. Not fatal: `reconnect()` starts over.
    Error,
}

impl ConnectionState {
    pub fn indicator(&self) -> LiveIndicator {
        match self {
            ConnectionState::Connected => LiveIndicator::Live,
            ConnectionState::Connecting | ConnectionState::Reconnecting => LiveIndicator::Polling,
            ConnectionState::Disconnected | ConnectionState::Error => LiveIndicator::Offline,
        }
    }
}

/// Badge shown next to realtime widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveIndicator {
    Live,
    Polling,
    Offline,
}

impl fmt::Display for LiveIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LiveIndicator::Live => "Live",
            LiveIndicator::Polling => "Polling",
            LiveIndicator::Offline => "Offline",
        })
    }
}

/// Snapshot published on every connection state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnect attempt in progress (0 while connected or on first connect).
    pub attempt: u32,
    pub last_error: Option<String>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn indicator(&self) -> LiveIndicator {
        self.state.indicator()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_mapping() {
        assert_eq!(ConnectionState::Connected.indicator(), LiveIndicator::Live);
        assert_eq!(ConnectionState::Reconnecting.indicator(), LiveIndicator::Polling);
        assert_eq!(ConnectionState::Connecting.indicator(), LiveIndicator::Polling);
        assert_eq!(ConnectionState::Error.indicator(), LiveIndicator::Offline);
        assert_eq!(ConnectionState::Disconnected.indicator(), LiveIndicator::Offline);
        assert_eq!(LiveIndicator::Polling.to_string(), "Polling");
    }

    #[test]
    fn default_status_is_offline() {
        let status = ConnectionStatus::default();
        assert!(!status.is_connected());
        assert_eq!(status.indicator(), LiveIndicator::Offline);
    }
}
