use crate::domain::models::{NotificationMap, TimerRecord};
use crate::domain::time::parse_duration_seconds;
use crate::infrastructure::config::NotificationSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification_scheduler::{
    ChannelImportance, NotificationChannel, NotificationPermission, NotificationScheduler,
    ScheduledNotification,
};
use crate::infrastructure::storage::KeyValueStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub const NOTIFICATIONS_KEY: &str = "timerNotifications";

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// When a timer started at `start` with `duration` runs out.
pub fn end_time(start: DateTime<Utc>, duration: &str) -> Option<DateTime<Utc>> {
    let total = parse_duration_seconds(duration).ok()?;
    let delta = TimeDelta::try_milliseconds(total.checked_mul(1000)?)?;
    start.checked_add_signed(delta)
}

/// Keeps at most one scheduled notification per timer and remembers the
/// pairing in storage so it survives restarts.
///
/// Every scheduler or storage failure is logged and treated as "no
/// notification"; none of the operations return an error.
pub struct NotificationReconciler<S, K>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    scheduler: Arc<S>,
    storage: Arc<K>,
    settings: NotificationSettings,
    now_provider: NowProvider,
    permission: Mutex<Option<NotificationPermission>>,
}

impl<S, K> NotificationReconciler<S, K>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    pub fn new(scheduler: Arc<S>, storage: Arc<K>) -> Self {
        Self {
            scheduler,
            storage,
            settings: NotificationSettings::default(),
            now_provider: Arc::new(Utc::now),
            permission: Mutex::new(None),
        }
    }

    pub fn with_settings(mut self, settings: NotificationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Asks for notification permission and registers the timer channel.
    /// Returns whether notifications will be delivered.
    pub async fn initialize(&self) -> bool {
        let permission = match self.scheduler.request_permission().await {
            Ok(permission) => permission,
            Err(error) => {
                warn!(%error, "failed to request notification permission");
                NotificationPermission::Denied
            }
        };
        self.set_permission(permission);

        if permission == NotificationPermission::Denied {
            warn!("notification permission denied; timers will run without alerts");
            return false;
        }

        let channel = NotificationChannel {
            id: self.settings.channel_id.clone(),
            name: self.settings.channel_name.clone(),
            importance: ChannelImportance::High,
            sound: true,
        };
        if let Err(error) = self.scheduler.ensure_channel(&channel).await {
            warn!(%error, channel_id = %channel.id, "failed to register notification channel");
        }
        true
    }

    pub fn permission(&self) -> Option<NotificationPermission> {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mapping(&self) -> NotificationMap {
        self.read_map()
    }

    /// Schedules the "timer finished" notification, replacing any earlier one
    /// for the same timer. Returns `None` when nothing was scheduled.
    pub async fn schedule(
        &self,
        timer_id: &str,
        start: DateTime<Utc>,
        duration: &str,
    ) -> Option<String> {
        if timer_id.trim().is_empty() {
            warn!("missing timer id; not scheduling");
            return None;
        }
        if self.permission() == Some(NotificationPermission::Denied) {
            debug!(timer_id, "notifications disabled; not scheduling");
            return None;
        }
        match parse_duration_seconds(duration) {
            Ok(total) if total > 0 => {}
            _ => {
                warn!(timer_id, duration, "invalid duration; not scheduling");
                return None;
            }
        }
        let Some(fire_at) = end_time(start, duration) else {
            warn!(timer_id, duration, "end time out of range; not scheduling");
            return None;
        };

        let now = (self.now_provider)();
        let millis_from_now = (fire_at - now).num_milliseconds();
        if millis_from_now <= 0 {
            info!(timer_id, "end is past or immediate; not scheduling");
            return None;
        }

        let mut map = self.read_map();
        if let Some(existing) = map.remove(timer_id) {
            if let Err(error) = self.scheduler.cancel(&existing).await {
                debug!(timer_id, notification_id = %existing, %error, "failed to cancel previous notification");
            }
            self.write_map(&map);
        }

        let request = ScheduledNotification {
            timer_id: timer_id.to_string(),
            title: self.settings.title_for(timer_id),
            body: self.settings.body.clone(),
            sound: true,
            channel_id: self.settings.channel_id.clone(),
            fire_at,
        };
        let notification_id = match self.scheduler.schedule(request).await {
            Ok(notification_id) => notification_id,
            Err(error) => {
                warn!(timer_id, %error, "failed to schedule notification");
                return None;
            }
        };

        let mut map = self.read_map();
        map.insert(timer_id.to_string(), notification_id.clone());
        self.write_map(&map);

        info!(
            timer_id,
            notification_id = %notification_id,
            seconds_from_now = (millis_from_now + 999) / 1000,
            "scheduled notification"
        );
        Some(notification_id)
    }

    pub async fn cancel_by_id(&self, notification_id: &str) {
        if let Err(error) = self.scheduler.cancel(notification_id).await {
            warn!(notification_id, %error, "failed to cancel notification");
            return;
        }
        info!(notification_id, "cancelled notification");
        self.forget_notification(notification_id);
    }

    pub async fn cancel_for_timer(&self, timer_id: &str) {
        let mut map = self.read_map();
        let Some(notification_id) = map.get(timer_id).cloned() else {
            return;
        };
        if let Err(error) = self.scheduler.cancel(&notification_id).await {
            warn!(timer_id, %error, "failed to cancel notification for timer");
            return;
        }
        map.remove(timer_id);
        self.write_map(&map);
        info!(timer_id, "cancelled notification for timer");
    }

    /// Records that a notification was delivered, so its entry is no longer live.
    pub fn acknowledge_fired(&self, notification_id: &str) -> Option<String> {
        let timer_id = self.forget_notification(notification_id);
        if let Some(timer_id) = timer_id.as_deref() {
            info!(timer_id, notification_id, "notification fired");
        }
        timer_id
    }

    /// Cancels everything that is mapped and schedules afresh from `timers`.
    /// Running the same input twice yields the same set of live notifications.
    pub async fn restore_all(&self, timers: &[TimerRecord]) -> NotificationMap {
        self.cancel_mapped().await;

        let now = (self.now_provider)();
        let mut restored = NotificationMap::new();
        for timer in timers {
            let Some(start) = timer.start else {
                continue;
            };
            match end_time(start, &timer.duration) {
                Some(fire_at) if fire_at > now => {}
                _ => continue,
            }
            if let Some(notification_id) = self.schedule(&timer.id, start, &timer.duration).await {
                restored.insert(timer.id.clone(), notification_id);
            }
        }

        self.write_map(&restored);
        info!(restored = restored.len(), "restored notifications");
        restored
    }

    pub async fn cancel_all_tracked(&self) {
        self.cancel_mapped().await;
        info!("cancelled all tracked notifications");
    }

    async fn cancel_mapped(&self) {
        for notification_id in self.read_map().values() {
            if let Err(error) = self.scheduler.cancel(notification_id).await {
                debug!(notification_id = %notification_id, %error, "ignoring cancel failure");
            }
        }
        self.write_map(&NotificationMap::new());
    }

    fn forget_notification(&self, notification_id: &str) -> Option<String> {
        let mut map = self.read_map();
        let timer_id = map
            .iter()
            .find(|(_, mapped)| mapped.as_str() == notification_id)
            .map(|(timer_id, _)| timer_id.clone())?;
        map.remove(&timer_id);
        self.write_map(&map);
        Some(timer_id)
    }

    fn set_permission(&self, permission: NotificationPermission) {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = Some(permission);
    }

    fn read_map(&self) -> NotificationMap {
        let raw = match self.storage.get(NOTIFICATIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return NotificationMap::new(),
            Err(error) => {
                warn!(%error, "failed to read notification map");
                return NotificationMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|error| {
            warn!(%error, "failed to parse notification map");
            NotificationMap::new()
        })
    }

    fn write_map(&self, map: &NotificationMap) {
        let result = serde_json::to_string(map)
            .map_err(InfraError::from)
            .and_then(|payload| self.storage.set(NOTIFICATIONS_KEY, &payload));
        if let Err(error) = result {
            warn!(%error, "failed to write notification map");
        }
    }
}
