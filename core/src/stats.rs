// Pipeline statistics
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared by the connection manager and the router.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_received: AtomicU64,
    metric_updates: AtomicU64,
    notifications: AtomicU64,
    duplicate_notifications: AtomicU64,
    heartbeats: AtomicU64,
    server_errors: AtomicU64,
    dropped_frames: AtomicU64,
    frames_sent: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub metric_updates: u64,
    pub notifications: u64,
    pub duplicate_notifications: u64,
    pub heartbeats: u64,
    pub server_errors: u64,
    pub dropped_frames: u64,
    pub frames_sent: u64,
    pub connects: u64,
    pub connect_failures: u64,
    pub reconnects: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&self) {
        bump(&self.frames_received);
    }

    pub(crate) fn record_metric_update(&self) {
        bump(&self.metric_updates);
    }

    pub(crate) fn record_notification(&self, accepted: bool) {
        if accepted {
            bump(&self.notifications);
        } else {
            bump(&self.duplicate_notifications);
        }
    }

    pub(crate) fn record_heartbeat(&self) {
        bump(&self.heartbeats);
    }

    pub(crate) fn record_server_error(&self) {
        bump(&self.server_errors);
    }

    pub(crate) fn record_dropped(&self) {
        bump(&self.dropped_frames);
    }

    pub(crate) fn record_sent(&self) {
        bump(&self.frames_sent);
    }

    /// A session was established; `reconnect` is true for every one after the first.
    pub(crate) fn record_connect(&self, reconnect: bool) {
        bump(&self.connects);
        if reconnect {
            bump(&self.reconnects);
        }
    }

    pub(crate) fn record_connect_failure(&self) {
        bump(&self.connect_failures);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_received: load(&self.frames_received),
            metric_updates: load(&self.metric_updates),
            notifications: load(&self.notifications),
            duplicate_notifications: load(&self.duplicate_notifications),
            heartbeats: load(&self.heartbeats),
            server_errors: load(&self.server_errors),
            dropped_frames: load(&self.dropped_frames),
            frames_sent: load(&self.frames_sent),
            connects: load(&self.connects),
            connect_failures: load(&self.connect_failures),
            reconnects: load(&self.reconnects),
        }
    }
}
