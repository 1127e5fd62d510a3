// Notification queue
//
// Holds every retained notification (oldest first) plus the bookkeeping the
// toast stack needs. Ages are measured on tokio's clock so timer behavior can
// be driven deterministically in tests.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Notification, NotificationEvent, NotificationFilter};
use crate::config::NotificationConfig;
use crate::listeners::{ListenerId, Listeners};

/// Mutation reported to queue listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Added(Notification),
    Read(String),
    AllRead(usize),
    Dismissed(String),
    /// Dropped by the retention cap.
    Evicted(String),
    Cleared,
}

#[derive(Debug)]
struct Entry {
    notification: Notification,
    received_at: Instant,
    dismiss_at: Option<Instant>,
}

#[derive(Debug)]
pub struct NotificationQueue {
    config: NotificationConfig,
    entries: std::sync::Mutex<VecDeque<Entry>>,
    listeners: Listeners<QueueEvent>,
    changed: Notify,
}

impl NotificationQueue {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            entries: std::sync::Mutex::new(VecDeque::new()),
            listeners: Listeners::new(),
            changed: Notify::new(),
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Queue an inbound notification. Returns its id, or `None` when a
    /// notification with the same id is already queued.
    pub fn push(&self, event: NotificationEvent) -> Option<String> {
        self.push_at(event, Instant::now())
    }

    pub fn push_at(&self, event: NotificationEvent, now: Instant) -> Option<String> {
        let id = event
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let dismiss_after = if event.auto_dismiss {
            Some(
                event
                    .dismiss_after_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.config.default_dismiss_after),
            )
        } else {
            None
        };

        let notification = Notification {
            id: id.clone(),
            title: event.title,
            message: event.message,
            severity: event.severity,
            category: event.category,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            action_url: event.action_url,
            read: false,
            dismissed: false,
            dismiss_after_ms: dismiss_after.map(|d| d.as_millis() as u64),
        };

        let mut events = Vec::new();
        {
            let mut entries = self.lock();
            if entries.iter().any(|e| e.notification.id == id) {
                debug!(%id, "Duplicate notification ignored");
                return None;
            }
            entries.push_back(Entry {
                notification: notification.clone(),
                received_at: now,
                dismiss_at: dismiss_after.map(|d| now + d),
            });
            events.push(QueueEvent::Added(notification));

            while entries.len() > self.config.history_limit {
                let victim = entries
                    .iter()
                    .position(|e| e.notification.dismissed)
                    .unwrap_or(0);
                if let Some(evicted) = entries.remove(victim) {
                    debug!(id = %evicted.notification.id, "Notification evicted by retention cap");
                    events.push(QueueEvent::Evicted(evicted.notification.id));
                }
            }
        }

        debug!(%id, "Notification queued");
        self.emit(events);
        Some(id)
    }

    /// active-unread → active-read. False if unknown, dismissed or already read.
    pub fn mark_read(&self, id: &str) -> bool {
        let changed = {
            let mut entries = self.lock();
            match entries.iter_mut().find(|e| e.notification.id == id) {
                Some(entry) if entry.notification.is_unread() => {
                    entry.notification.read = true;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(vec![QueueEvent::Read(id.to_string())]);
        }
        changed
    }

    /// Marks every active notification read; returns how many changed.
    pub fn mark_all_read(&self) -> usize {
        let count = {
            let mut entries = self.lock();
            let mut count = 0;
            for entry in entries.iter_mut().filter(|e| e.notification.is_unread()) {
                entry.notification.read = true;
                count += 1;
            }
            count
        };
        if count > 0 {
            self.emit(vec![QueueEvent::AllRead(count)]);
        }
        count
    }

    /// Terminal transition. False if unknown or already dismissed.
    pub fn dismiss(&self, id: &str) -> bool {
        let changed = {
            let mut entries = self.lock();
            match entries.iter_mut().find(|e| e.notification.id == id) {
                Some(entry) if !entry.notification.dismissed => {
                    entry.notification.dismissed = true;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(vec![QueueEvent::Dismissed(id.to_string())]);
        }
        changed
    }

    pub fn dismiss_all(&self) -> usize {
        let ids = {
            let mut entries = self.lock();
            let mut ids = Vec::new();
            for entry in entries.iter_mut().filter(|e| !e.notification.dismissed) {
                entry.notification.dismissed = true;
                ids.push(entry.notification.id.clone());
            }
            ids
        };
        let count = ids.len();
        self.emit(ids.into_iter().map(QueueEvent::Dismissed).collect());
        count
    }

    /// Dismiss auto-dismiss notifications whose deadline is at or before `now`.
    pub fn dismiss_expired(&self, now: Instant) -> Vec<String> {
        let ids = {
            let mut entries = self.lock();
            let mut ids = Vec::new();
            for entry in entries.iter_mut() {
                let due = entry.dismiss_at.is_some_and(|at| at <= now);
                if due && !entry.notification.dismissed {
                    entry.notification.dismissed = true;
                    ids.push(entry.notification.id.clone());
                }
            }
            ids
        };
        if !ids.is_empty() {
            debug!(count = ids.len(), "Auto-dismissed notifications");
            self.emit(ids.iter().cloned().map(QueueEvent::Dismissed).collect());
        }
        ids
    }

    /// Earliest pending auto-dismiss deadline.
    pub fn next_auto_dismiss(&self) -> Option<Instant> {
        self.lock()
            .iter()
            .filter(|e| !e.notification.dismissed)
            .filter_map(|e| e.dismiss_at)
            .min()
    }

    /// Toasts to display now, oldest first.
    pub fn toasts(&self) -> Vec<Notification> {
        self.toasts_at(Instant::now())
    }

    pub fn toasts_at(&self, now: Instant) -> Vec<Notification> {
        let entries = self.lock();
        let mut visible: Vec<Notification> = entries
            .iter()
            .rev()
            .filter(|e| {
                !e.notification.dismissed
                    && now.saturating_duration_since(e.received_at) < self.config.toast_window
            })
            .take(self.config.max_toasts)
            .map(|e| e.notification.clone())
            .collect();
        visible.reverse();
        visible
    }

    /// Notification center view, newest first. Never mutates.
    pub fn list(&self, filter: NotificationFilter) -> Vec<Notification> {
        self.lock()
            .iter()
            .rev()
            .filter(|e| filter.matches(&e.notification))
            .map(|e| e.notification.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.lock()
            .iter()
            .find(|e| e.notification.id == id)
            .map(|e| e.notification.clone())
    }

    /// Badge count: notifications not yet dismissed.
    pub fn unread_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| !e.notification.dismissed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
        info!("Notification queue cleared");
        self.emit(vec![QueueEvent::Cleared]);
    }

    pub fn on_change<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Resolves after the next mutation; used by the auto-dismiss sweeper.
    pub(crate) async fn changed(&self) {
        self.changed.notified().await
    }

    fn emit(&self, events: Vec<QueueEvent>) {
        if events.is_empty() {
            return;
        }
        self.changed.notify_one();
        for event in &events {
            self.listeners.notify(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}
