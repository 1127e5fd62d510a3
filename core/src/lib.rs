// Brainwire Core Library
// Realtime event pipeline for the Brain dashboard

pub mod config;
pub mod connection;
pub mod listeners;
pub mod metrics;
pub mod notification;
pub mod protocol;
pub mod provider;
pub mod router;
pub mod stats;
pub mod subscription;
pub mod telemetry;

// Export core types
pub use config::{NotificationConfig, RealtimeConfig};
pub use connection::{
    BackoffPolicy, ChannelTransport, Connection, ConnectionManager, ConnectionState,
    ConnectionStatus, LiveIndicator, Transport, WebSocketTransport,
};
pub use listeners::ListenerId;
pub use metrics::{MetricSample, MetricSeries, MetricsCache};
pub use notification::{
    Notification, NotificationCategory, NotificationEvent, NotificationFilter, NotificationQueue,
    QueueEvent, Severity,
};
pub use protocol::{ClientCommand, MetricUpdate, ServerMessage};
pub use provider::{RealtimeProvider, SubscriptionHandle};
pub use router::MessageRouter;
pub use stats::{PipelineStats, StatsSnapshot};
pub use subscription::{ConsumerId, MetricTopic, SubscriptionOptions, SubscriptionRegistry};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrainwireError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Already running")]
    AlreadyRunning,

    #[error("Not running")]
    NotRunning,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, BrainwireError>;
