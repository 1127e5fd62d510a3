// Message router - dispatches decoded server messages to the stores
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::metrics::MetricsCache;
use crate::notification::NotificationQueue;
use crate::protocol::ServerMessage;
use crate::stats::PipelineStats;

/// Fans decoded [`ServerMessage`]s out to the metrics cache and the
/// notification queue.
#[derive(Clone)]
pub struct MessageRouter {
    metrics: Arc<MetricsCache>,
    notifications: Arc<NotificationQueue>,
    stats: Arc<PipelineStats>,
}

impl MessageRouter {
    pub fn new(
        metrics: Arc<MetricsCache>,
        notifications: Arc<NotificationQueue>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            metrics,
            notifications,
            stats,
        }
    }

    pub fn route(&self, message: ServerMessage) {
        match message {
            ServerMessage::MetricUpdate(update) => {
                let sample = self.metrics.apply(update);
                trace!(topic = %sample.topic, sequence = sample.sequence, "Metric updated");
                self.stats.record_metric_update();
            }
            ServerMessage::Notification(event) => {
                let accepted = self.notifications.push(event);
                if accepted.is_none() {
                    debug!("Duplicate notification ignored");
                }
                self.stats.record_notification(accepted.is_some());
            }
            ServerMessage::Heartbeat { .. } => {
                self.stats.record_heartbeat();
            }
            ServerMessage::Error { code, message } => {
                warn!(code = code.as_deref().unwrap_or("-"), %message, "Server reported error");
                self.stats.record_server_error();
            }
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsCache> {
        &self.metrics
    }

    pub fn notifications(&self) -> &Arc<NotificationQueue> {
        &self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationEvent, Severity};
    use crate::protocol::MetricUpdate;
    use serde_json::json;

    fn router() -> (MessageRouter, Arc<PipelineStats>) {
        let stats = Arc::new(PipelineStats::new());
        let router = MessageRouter::new(
            Arc::new(MetricsCache::new()),
            Arc::new(NotificationQueue::default()),
            stats.clone(),
        );
        (router, stats)
    }

    #[tokio::test]
    async fn routes_each_kind_to_its_store() {
        let (router, stats) = router();

        router.route(ServerMessage::MetricUpdate(MetricUpdate {
            topic: "leads".into(),
            value: json!(12),
            timestamp: None,
        }));
        router.route(ServerMessage::Notification(
            NotificationEvent::new("Payment failed", "Card declined")
                .with_id("n-1")
                .with_severity(Severity::Error),
        ));
        router.route(ServerMessage::Heartbeat { timestamp: None });
        router.route(ServerMessage::Error {
            code: None,
            message: "boom".into(),
        });

        assert_eq!(router.metrics().value("leads"), Some(json!(12)));
        assert_eq!(router.notifications().len(), 1);
        let snap = stats.snapshot();
        assert_eq!(snap.metric_updates, 1);
        assert_eq!(snap.notifications, 1);
        assert_eq!(snap.heartbeats, 1);
        assert_eq!(snap.server_errors, 1);
    }

    #[tokio::test]
    async fn duplicate_notification_is_counted_not_stored() {
        let (router, stats) = router();
        let event = NotificationEvent::new("Lead", "Acme").with_id("same");
        router.route(ServerMessage::Notification(event.clone()));
        router.route(ServerMessage::Notification(event));

        assert_eq!(router.notifications().len(), 1);
        assert_eq!(stats.snapshot().duplicate_notifications, 1);
    }
}
