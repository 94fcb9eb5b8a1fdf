use crate::application::bootstrap::bootstrap_workspace;
use crate::application::countdown::{TimerView, views_at};
use crate::application::notification_reconciler::NotificationReconciler;
use crate::application::timer_store::TimerStore;
use crate::domain::models::{FloorArea, NotificationMap, TimerPatch};
use crate::domain::time::{minutes_entry_from_duration, parse_duration_seconds};
use crate::infrastructure::config::{AppConfig, load_app_config};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification_scheduler::{FiredNotification, NotificationScheduler};
use crate::infrastructure::storage::{KeyValueStore, SqliteKeyValueStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AppState<S, K>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    store: TimerStore<K>,
    reconciler: NotificationReconciler<S, K>,
    config: AppConfig,
    now_provider: NowProvider,
}

impl<S> AppState<S, SqliteKeyValueStore>
where
    S: NotificationScheduler,
{
    pub fn open(workspace_root: &Path, scheduler: Arc<S>) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(workspace_root)?;
        let config = load_app_config(&bootstrap.config_dir)?;
        let storage = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        Ok(Self::from_parts(storage, scheduler, config))
    }
}

impl<S, K> AppState<S, K>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    pub fn from_parts(storage: Arc<K>, scheduler: Arc<S>, config: AppConfig) -> Self {
        let store =
            TimerStore::new(Arc::clone(&storage)).with_default_duration(config.default_duration.clone());
        let reconciler =
            NotificationReconciler::new(scheduler, storage).with_settings(config.notification.clone());
        Self {
            store,
            reconciler,
            config,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.reconciler = self.reconciler.with_now_provider(Arc::clone(&now_provider));
        self.now_provider = now_provider;
        self
    }

    pub fn store(&self) -> &TimerStore<K> {
        &self.store
    }

    pub fn reconciler(&self) -> &NotificationReconciler<S, K> {
        &self.reconciler
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn now_provider(&self) -> NowProvider {
        Arc::clone(&self.now_provider)
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StartupReport {
    pub timers: usize,
    pub notifications_enabled: bool,
    pub restored_notifications: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TapOutcome {
    /// The countdown had reached zero; the seat is idle again.
    Reset,
    OpenKeypad { prefill_minutes: String },
    ConfirmDisable,
}

/// Loads timers, sets up notifications and reschedules whatever is still running.
pub async fn startup_impl<S, K>(state: &AppState<S, K>) -> StartupReport
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let timers = state.store.load();
    let notifications_enabled = state.reconciler.initialize().await;
    let restored = state.reconciler.restore_all(&timers).await;
    info!(
        timers = timers.len(),
        notifications_enabled,
        restored = restored.len(),
        "startup complete"
    );
    StartupReport {
        timers: timers.len(),
        notifications_enabled,
        restored_notifications: restored.len(),
    }
}

pub fn list_timers_impl<S, K>(state: &AppState<S, K>, area: Option<FloorArea>) -> Vec<TimerView>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let timers = match area {
        Some(area) => state.store.in_area(area),
        None => state.store.snapshot(),
    };
    views_at(&timers, state.now())
}

pub fn timer_view_impl<S, K>(state: &AppState<S, K>, timer_id: String) -> Result<TimerView, InfraError>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let timer_id = normalize_timer_id(&timer_id)?;
    let timer = state
        .store
        .get(timer_id)
        .ok_or_else(|| InfraError::InvalidInput(format!("timer not found: {timer_id}")))?;
    Ok(TimerView::at(&timer, state.now()))
}

/// Starts the countdown now with `duration` and schedules its notification.
pub async fn start_timer_impl<S, K>(
    state: &AppState<S, K>,
    timer_id: String,
    duration: String,
) -> Result<TimerView, InfraError>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let timer_id = normalize_timer_id(&timer_id)?;
    let duration = duration.trim();
    match parse_duration_seconds(duration) {
        Ok(seconds) if seconds >= 0 => {}
        Ok(_) => {
            return Err(InfraError::InvalidInput(
                "duration must not be negative".to_string(),
            ));
        }
        Err(error) => return Err(InfraError::InvalidInput(error.to_string())),
    }
    if state.store.get(timer_id).is_none() {
        return Err(InfraError::InvalidInput(format!("timer not found: {timer_id}")));
    }

    let now = state.now();
    let timer = state
        .store
        .update(timer_id, &TimerPatch::started(now, duration))
        .ok_or_else(|| InfraError::InvalidInput(format!("timer {timer_id} rejected the update")))?;

    if state.reconciler.schedule(timer_id, now, duration).await.is_none() {
        // Nothing new was armed, so an older notification would be stale.
        state.reconciler.cancel_for_timer(timer_id).await;
    }
    info!(timer_id, duration, "timer started");
    Ok(TimerView::at(&timer, now))
}

/// Disables a timer: back to the idle default and no pending notification.
pub async fn cancel_timer_impl<S, K>(
    state: &AppState<S, K>,
    timer_id: String,
) -> Result<TimerView, InfraError>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let timer_id = normalize_timer_id(&timer_id)?;
    let timer = state
        .store
        .reset(timer_id)
        .ok_or_else(|| InfraError::InvalidInput(format!("timer not found: {timer_id}")))?;
    state.reconciler.cancel_for_timer(timer_id).await;
    Ok(TimerView::at(&timer, state.now()))
}

pub async fn tap_timer_impl<S, K>(
    state: &AppState<S, K>,
    timer_id: String,
) -> Result<TapOutcome, InfraError>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let view = timer_view_impl(state, timer_id)?;
    if view.is_finished() {
        cancel_timer_impl(state, view.id).await?;
        return Ok(TapOutcome::Reset);
    }
    if view.running {
        return Ok(TapOutcome::ConfirmDisable);
    }

    let duration = state
        .store
        .get(&view.id)
        .map(|timer| timer.duration)
        .unwrap_or_else(|| state.config.default_duration.clone());
    Ok(TapOutcome::OpenKeypad {
        prefill_minutes: minutes_entry_from_duration(&duration),
    })
}

pub async fn restore_notifications_impl<S, K>(state: &AppState<S, K>) -> NotificationMap
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    let timers = state.store.snapshot();
    state.reconciler.restore_all(&timers).await
}

pub fn handle_fired_impl<S, K>(state: &AppState<S, K>, fired: &FiredNotification) -> Option<String>
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    state.reconciler.acknowledge_fired(&fired.notification_id)
}

/// Withdraws every tracked notification. Call before exit when the scheduler
/// only delivers while this process runs; the next startup restores them.
pub async fn shutdown_impl<S, K>(state: &AppState<S, K>)
where
    S: NotificationScheduler,
    K: KeyValueStore,
{
    state.reconciler.cancel_all_tracked().await;
}

fn normalize_timer_id(timer_id: &str) -> Result<&str, InfraError> {
    let timer_id = timer_id.trim();
    if timer_id.is_empty() {
        return Err(InfraError::InvalidInput(
            "timer_id must not be empty".to_string(),
        ));
    }
    Ok(timer_id)
}
