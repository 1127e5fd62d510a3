// Connection manager
//
// Owns the single logical connection to the realtime endpoint: connects,
// re-sends the merged subscription on every (re)connect, keeps the link
// alive with pings, and reconnects with bounded exponential backoff.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::state::{ConnectionState, ConnectionStatus};
use super::transport::{Connection, Transport};
use crate::config::RealtimeConfig;
use crate::protocol::{self, ClientCommand};
use crate::router::MessageRouter;
use crate::stats::PipelineStats;
use crate::subscription::{ConsumerId, SubscriptionOptions, SubscriptionRegistry};
use crate::{BrainwireError, Result};

struct Shared {
    config: RealtimeConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    router: MessageRouter,
    stats: Arc<PipelineStats>,
    status: watch::Sender<ConnectionStatus>,
    // Present only while a session is open
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
    reconnect_now: Notify,
}

#[derive(Default)]
struct Control {
    task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

enum SessionEnd {
    Lost(String),
    Shutdown,
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl ConnectionManager {
    pub fn new(
        config: RealtimeConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
        router: MessageRouter,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                registry,
                router,
                stats,
                status,
                outbound: Mutex::new(None),
                reconnect_now: Notify::new(),
            }),
            control: Mutex::new(Control::default()),
        }
    }

    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut control = self.lock_control();
        if control.task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(BrainwireError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        info!(url = %shared.config.url, "Starting realtime connection");
        control.task = Some(tokio::spawn(run(shared, shutdown_rx)));
        control.shutdown = Some(shutdown_tx);
        Ok(())
    }

    /// Close the connection and cancel every pending timer.
    pub async fn stop(&self) {
        let (task, shutdown) = {
            let mut control = self.lock_control();
            (control.task.take(), control.shutdown.take())
        };
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Connection task failed");
                }
            }
            info!("Realtime connection stopped");
        }
        *self.shared.lock_outbound() = None;
        self.shared.status.send_modify(|status| {
            status.state = ConnectionState::Disconnected;
            status.attempt = 0;
        });
    }

    /// Reconnect immediately, resetting the attempt budget.
    ///
    /// Only acts while backing off or after retries are exhausted; returns
    /// false otherwise (connected, connect in flight, or not started).
    pub fn reconnect(&self) -> bool {
        let waiting = matches!(
            self.status().state,
            ConnectionState::Reconnecting | ConnectionState::Error
        );
        if !self.is_running() || !waiting {
            return false;
        }
        info!("Manual reconnect requested");
        self.shared.reconnect_now.notify_one();
        true
    }

    pub fn is_running(&self) -> bool {
        self.lock_control()
            .task
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.shared.registry
    }

    /// Register or replace a consumer's interest. The merged set is sent
    /// only when it changed and a session is open; otherwise the next
    /// connect carries it.
    pub fn subscribe(&self, consumer: ConsumerId, options: SubscriptionOptions) {
        let outbound = self.shared.lock_outbound();
        if let Some(merged) = self.shared.registry.subscribe(consumer, options) {
            if let Some(tx) = outbound.as_ref() {
                let _ = tx.send(ClientCommand::Subscribe(merged));
            }
        }
    }

    pub fn unsubscribe(&self, consumer: ConsumerId) {
        let outbound = self.shared.lock_outbound();
        if let Some(merged) = self.shared.registry.unsubscribe(consumer) {
            if let Some(tx) = outbound.as_ref() {
                let _ = tx.send(ClientCommand::Subscribe(merged));
            }
        }
    }

    /// Queue a command on the open session. False while disconnected.
    pub fn send(&self, command: ClientCommand) -> bool {
        match self.shared.lock_outbound().as_ref() {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.lock_control().task.take() {
            task.abort();
        }
    }
}

impl Shared {
    fn lock_outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ClientCommand>>> {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState, attempt: u32) {
        self.status.send_if_modified(|status| {
            let changed = status.state != state || status.attempt != attempt;
            status.state = state;
            status.attempt = attempt;
            changed
        });
    }

    fn discard_reconnect_request(&self) {
        let _ = self.reconnect_now.notified().now_or_never();
    }

    fn set_error(&self, message: String) {
        self.status.send_modify(|status| status.last_error = Some(message));
    }

    fn mark_connected(&self) {
        self.status.send_modify(|status| {
            status.state = ConnectionState::Connected;
            status.attempt = 0;
            status.last_error = None;
            status.last_connected_at = Some(Utc::now());
        });
    }

    async fn transmit(&self, conn: &mut Box<dyn Connection>, command: &ClientCommand) -> Result<()> {
        let frame = protocol::encode(command)?;
        conn.send(frame).await?;
        self.stats.record_sent();
        Ok(())
    }
}

async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let policy = shared.config.backoff();
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        let state = if attempt == 0 && !connected_before {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        };
        shared.set_state(state, attempt);

        let connected = tokio::select! {
            result = shared.transport.connect(&shared.config.url) => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(conn) => {
                info!(url = %shared.config.url, "Realtime connection established");
                shared.stats.record_connect(connected_before);
                connected_before = true;
                attempt = 0;
                shared.mark_connected();

                match session(&shared, conn, &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(reason) => {
                        // A reconnect request that raced the connect must not skip this backoff
                        shared.discard_reconnect_request();
                        warn!(%reason, "Realtime connection lost");
                        shared.set_error(reason);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, attempt, "Connect failed");
                shared.stats.record_connect_failure();
                shared.set_error(e.to_string());
            }
        }

        if !policy.allows(attempt) {
            error!(
                attempts = attempt,
                "Reconnect attempts exhausted, waiting for manual reconnect"
            );
            shared.set_state(ConnectionState::Error, attempt);
            tokio::select! {
                _ = shared.reconnect_now.notified() => {
                    attempt = 0;
                    continue;
                }
                _ = shutdown.changed() => break,
            }
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;
        shared.set_state(ConnectionState::Reconnecting, attempt);
        debug!(?delay, attempt, "Scheduling reconnect");

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = shared.reconnect_now.notified() => {
                attempt = 0;
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Connection task exiting");
}

async fn session(
    shared: &Shared,
    mut conn: Box<dyn Connection>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (tx, mut outbound) = mpsc::unbounded_channel();
    let merged = {
        let mut slot = shared.lock_outbound();
        *slot = Some(tx);
        shared.registry.merged()
    };

    let end = 'session: {
        if let Err(e) = shared
            .transmit(&mut conn, &ClientCommand::Subscribe(merged))
            .await
        {
            break 'session SessionEnd::Lost(e.to_string());
        }

        let interval = shared.config.heartbeat_interval;
        let timeout = shared.config.heartbeat_timeout;
        let mut heartbeat = time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                frame = conn.recv() => match frame {
                    Some(Ok(text)) => {
                        deadline = Instant::now() + timeout;
                        shared.stats.record_frame();
                        match protocol::decode(&text) {
                            Ok(message) => shared.router.route(message),
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed frame");
                                shared.stats.record_dropped();
                            }
                        }
                    }
                    Some(Err(BrainwireError::Decode(e))) => {
                        deadline = Instant::now() + timeout;
                        shared.stats.record_frame();
                        warn!(error = %e, "Dropping undecodable frame");
                        shared.stats.record_dropped();
                    }
                    Some(Err(e)) => break SessionEnd::Lost(e.to_string()),
                    None => break SessionEnd::Lost("closed by server".into()),
                },
                Some(command) = outbound.recv() => {
                    if let Err(e) = shared.transmit(&mut conn, &command).await {
                        break SessionEnd::Lost(e.to_string());
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = shared.transmit(&mut conn, &ClientCommand::ping_now()).await {
                        break SessionEnd::Lost(e.to_string());
                    }
                }
                _ = time::sleep_until(deadline) => {
                    break SessionEnd::Lost("heartbeat timeout".into());
                }
                _ = shutdown.changed() => break SessionEnd::Shutdown,
            }
        }
    };

    *shared.lock_outbound() = None;
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Error closing connection");
    }
    end
}
