pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    AppState, StartupReport, TapOutcome, cancel_timer_impl, handle_fired_impl, list_timers_impl,
    restore_notifications_impl, shutdown_impl, start_timer_impl, startup_impl, tap_timer_impl,
    timer_view_impl,
};
pub use application::countdown::{CountdownTicker, TimerView};
pub use application::notification_reconciler::NotificationReconciler;
pub use application::timer_store::TimerStore;
pub use domain::models::{FloorArea, NotificationMap, TimerPatch, TimerRecord, TimerShape};
pub use infrastructure::error::InfraError;
