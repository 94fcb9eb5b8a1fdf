use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

static NEXT_NOTIFICATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_notification_id() -> String {
    let sequence = NEXT_NOTIFICATION_ID.fetch_add(1, Ordering::Relaxed);
    format!("ntf-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelImportance {
    Default,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: ChannelImportance,
    pub sound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub timer_id: String,
    pub title: String,
    pub body: String,
    pub sound: bool,
    pub channel_id: String,
    pub fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredNotification {
    pub notification_id: String,
    pub timer_id: String,
    pub title: String,
    pub body: String,
    pub fired_at: DateTime<Utc>,
}

/// A service that shows a notification at an absolute point in time.
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    async fn request_permission(&self) -> Result<NotificationPermission, InfraError>;

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), InfraError>;

    async fn schedule(&self, notification: ScheduledNotification) -> Result<String, InfraError>;

    async fn cancel(&self, notification_id: &str) -> Result<(), InfraError>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, InfraError> {
    mutex
        .lock()
        .map_err(|error| InfraError::Notification(format!("{what} lock poisoned: {error}")))
}

#[derive(Debug)]
pub struct InMemoryNotificationScheduler {
    permission: NotificationPermission,
    pending: Mutex<HashMap<String, ScheduledNotification>>,
    channels: Mutex<Vec<NotificationChannel>>,
}

impl Default for InMemoryNotificationScheduler {
    fn default() -> Self {
        Self::with_permission(NotificationPermission::Granted)
    }
}

impl InMemoryNotificationScheduler {
    pub fn with_permission(permission: NotificationPermission) -> Self {
        Self {
            permission,
            pending: Mutex::new(HashMap::new()),
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn pending(&self) -> Result<Vec<(String, ScheduledNotification)>, InfraError> {
        let pending = lock(&self.pending, "pending notifications")?;
        let mut entries: Vec<_> = pending
            .iter()
            .map(|(id, notification)| (id.clone(), notification.clone()))
            .collect();
        entries.sort_by(|left, right| left.1.timer_id.cmp(&right.1.timer_id));
        Ok(entries)
    }

    pub fn channels(&self) -> Result<Vec<NotificationChannel>, InfraError> {
        Ok(lock(&self.channels, "notification channels")?.clone())
    }
}

#[async_trait]
impl NotificationScheduler for InMemoryNotificationScheduler {
    async fn request_permission(&self) -> Result<NotificationPermission, InfraError> {
        Ok(self.permission)
    }

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), InfraError> {
        let mut channels = lock(&self.channels, "notification channels")?;
        channels.retain(|existing| existing.id != channel.id);
        channels.push(channel.clone());
        Ok(())
    }

    async fn schedule(&self, notification: ScheduledNotification) -> Result<String, InfraError> {
        if self.permission == NotificationPermission::Denied {
            return Err(InfraError::PermissionDenied);
        }
        let notification_id = next_notification_id();
        lock(&self.pending, "pending notifications")?.insert(notification_id.clone(), notification);
        Ok(notification_id)
    }

    async fn cancel(&self, notification_id: &str) -> Result<(), InfraError> {
        lock(&self.pending, "pending notifications")?.remove(notification_id);
        Ok(())
    }
}

type TaskMap = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Fires notifications from sleeping tokio tasks for as long as the process runs.
pub struct TokioNotificationScheduler {
    tasks: TaskMap,
    fired_tx: mpsc::UnboundedSender<FiredNotification>,
}

impl TokioNotificationScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredNotification>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.tasks, "notification tasks")
            .map(|tasks| tasks.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationScheduler for TokioNotificationScheduler {
    async fn request_permission(&self) -> Result<NotificationPermission, InfraError> {
        Ok(NotificationPermission::Granted)
    }

    async fn ensure_channel(&self, _channel: &NotificationChannel) -> Result<(), InfraError> {
        Ok(())
    }

    async fn schedule(&self, notification: ScheduledNotification) -> Result<String, InfraError> {
        let notification_id = next_notification_id();
        let delay = (notification.fire_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        debug!(
            notification_id = %notification_id,
            timer_id = %notification.timer_id,
            delay_ms = delay.as_millis() as u64,
            "arming notification task"
        );

        let tasks = Arc::clone(&self.tasks);
        let fired_tx = self.fired_tx.clone();
        let task_id = notification_id.clone();
        // Hold the map lock across spawn so the task cannot finish before it is registered.
        let mut guard = lock(&self.tasks, "notification tasks")?;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut tasks) = tasks.lock() {
                tasks.remove(&task_id);
            }
            let _ = fired_tx.send(FiredNotification {
                notification_id: task_id,
                timer_id: notification.timer_id,
                title: notification.title,
                body: notification.body,
                fired_at: Utc::now(),
            });
        });
        guard.insert(notification_id.clone(), handle);
        Ok(notification_id)
    }

    async fn cancel(&self, notification_id: &str) -> Result<(), InfraError> {
        if let Some(handle) = lock(&self.tasks, "notification tasks")?.remove(notification_id) {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for TokioNotificationScheduler {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn notification_in(timer_id: &str, seconds: i64) -> ScheduledNotification {
        ScheduledNotification {
            timer_id: timer_id.to_string(),
            title: format!("⏰ Timer {timer_id} finished!"),
            body: "Your timer is up!".to_string(),
            sound: true,
            channel_id: "timer".to_string(),
            fire_at: Utc::now() + Duration::seconds(seconds),
        }
    }

    #[tokio::test]
    async fn in_memory_scheduler_tracks_pending_notifications() {
        let scheduler = InMemoryNotificationScheduler::default();
        let first = scheduler.schedule(notification_in("1", 60)).await.expect("schedule");
        let second = scheduler.schedule(notification_in("2", 60)).await.expect("schedule");
        assert_ne!(first, second);

        scheduler.cancel(&first).await.expect("cancel");
        scheduler.cancel("unknown").await.expect("cancel unknown is a no-op");

        let pending = scheduler.pending().expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, second);
    }

    #[tokio::test]
    async fn in_memory_scheduler_refuses_when_denied() {
        let scheduler = InMemoryNotificationScheduler::with_permission(NotificationPermission::Denied);
        assert_eq!(
            scheduler.request_permission().await.expect("permission"),
            NotificationPermission::Denied
        );
        assert!(matches!(
            scheduler.schedule(notification_in("1", 60)).await,
            Err(InfraError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn in_memory_scheduler_replaces_channels_by_id() {
        let scheduler = InMemoryNotificationScheduler::default();
        let mut channel = NotificationChannel {
            id: "timer".to_string(),
            name: "Timers".to_string(),
            importance: ChannelImportance::Default,
            sound: false,
        };
        scheduler.ensure_channel(&channel).await.expect("channel");
        channel.importance = ChannelImportance::High;
        scheduler.ensure_channel(&channel).await.expect("channel again");
        assert_eq!(scheduler.channels().expect("channels"), vec![channel]);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_fires_after_delay() {
        let (scheduler, mut fired_rx) = TokioNotificationScheduler::new();
        let notification_id = scheduler
            .schedule(notification_in("5", 30))
            .await
            .expect("schedule");
        assert_eq!(scheduler.pending_count(), 1);

        let fired = fired_rx.recv().await.expect("fired notification");
        assert_eq!(fired.notification_id, notification_id);
        assert_eq!(fired.timer_id, "5");
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_cancel_prevents_firing() {
        let (scheduler, mut fired_rx) = TokioNotificationScheduler::new();
        let notification_id = scheduler
            .schedule(notification_in("8", 30))
            .await
            .expect("schedule");
        scheduler.cancel(&notification_id).await.expect("cancel");

        tokio::time::sleep(StdDuration::from_secs(120)).await;
        assert!(fired_rx.try_recv().is_err());
        assert_eq!(scheduler.pending_count(), 0);
    }
}
