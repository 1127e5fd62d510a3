// Realtime provider
//
// One value owns the whole pipeline: connection manager, subscription
// registry, metrics cache, notification queue and the auto-dismiss sweeper.
// Hosts build one per session; nothing here is process-global.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use crate::config::RealtimeConfig;
use crate::connection::{
    ConnectionManager, ConnectionStatus, LiveIndicator, Transport, WebSocketTransport,
};
use crate::metrics::MetricsCache;
use crate::notification::{NotificationEvent, NotificationQueue};
use crate::router::MessageRouter;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::subscription::{ConsumerId, SubscriptionOptions, SubscriptionRegistry};
use crate::Result;

struct Sweeper {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

pub struct RealtimeProvider {
    config: RealtimeConfig,
    metrics: Arc<MetricsCache>,
    notifications: Arc<NotificationQueue>,
    stats: Arc<PipelineStats>,
    connection: Arc<ConnectionManager>,
    default_consumer: ConsumerId,
    sweeper: Mutex<Option<Sweeper>>,
}

impl RealtimeProvider {
    pub fn new(config: RealtimeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsCache::new());
        let notifications = Arc::new(NotificationQueue::new(config.notifications.clone()));
        let stats = Arc::new(PipelineStats::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let router = MessageRouter::new(metrics.clone(), notifications.clone(), stats.clone());
        let default_consumer = registry.register_consumer();
        let connection = Arc::new(ConnectionManager::new(
            config.clone(),
            transport,
            registry,
            router,
            stats.clone(),
        ));

        Ok(Self {
            config,
            metrics,
            notifications,
            stats,
            connection,
            default_consumer,
            sweeper: Mutex::new(None),
        })
    }

    /// Provider speaking WebSocket to `config.url`.
    pub fn websocket(config: RealtimeConfig) -> Result<Self> {
        Self::new(config, Arc::new(WebSocketTransport::default()))
    }

    /// Register the default subscription, open the connection and start
    /// the auto-dismiss sweeper.
    pub fn start(&self) -> Result<()> {
        self.connection
            .subscribe(self.default_consumer, self.config.default_subscription.clone());
        self.connection.start()?;

        let mut sweeper = self.lock_sweeper();
        if sweeper.is_none() {
            let (shutdown, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(sweep(self.notifications.clone(), shutdown_rx));
            *sweeper = Some(Sweeper { task, shutdown });
        }
        info!(url = %self.config.url, "Realtime provider started");
        Ok(())
    }

    /// Stop the connection and the sweeper. Cached state is kept.
    pub async fn shutdown(&self) {
        self.connection.stop().await;
        let sweeper = self.lock_sweeper().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown.send(true);
            let _ = sweeper.task.await;
        }
        info!("Realtime provider stopped");
    }

    /// Register interest for one view. Dropping the handle releases it.
    pub fn subscribe(&self, options: SubscriptionOptions) -> SubscriptionHandle {
        let consumer = self.connection.registry().register_consumer();
        self.connection.subscribe(consumer, options);
        SubscriptionHandle {
            connection: self.connection.clone(),
            consumer,
        }
    }

    /// Queue a locally raised notification as if the server had sent it.
    pub fn notify(&self, event: NotificationEvent) -> Option<String> {
        self.notifications.push(event)
    }

    /// Ask for an immediate reconnect. See [`ConnectionManager::reconnect`].
    pub fn reconnect(&self) -> bool {
        self.connection.reconnect()
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCache> {
        &self.metrics
    }

    pub fn notifications(&self) -> &Arc<NotificationQueue> {
        &self.notifications
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.connection.registry()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    pub fn indicator(&self) -> LiveIndicator {
        self.status().indicator()
    }

    fn lock_sweeper(&self) -> MutexGuard<'_, Option<Sweeper>> {
        self.sweeper.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RealtimeProvider {
    fn drop(&mut self) {
        if let Some(sweeper) = self.lock_sweeper().take() {
            sweeper.task.abort();
        }
    }
}

/// One consumer's registered interest.
pub struct SubscriptionHandle {
    connection: Arc<ConnectionManager>,
    consumer: ConsumerId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> ConsumerId {
        self.consumer
    }

    /// Replace this consumer's options.
    pub fn update(&self, options: SubscriptionOptions) {
        self.connection.subscribe(self.consumer, options);
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.connection.unsubscribe(self.consumer);
    }
}

async fn sweep(queue: Arc<NotificationQueue>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let next = queue.next_auto_dismiss();
        let due = async {
            match next {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = due => {
                let dismissed = queue.dismiss_expired(Instant::now());
                debug!(count = dismissed.len(), "Auto-dismiss sweep");
            }
            _ = queue.changed() => {}
            _ = shutdown.changed() => break,
        }
    }
}
