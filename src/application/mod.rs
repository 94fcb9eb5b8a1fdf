pub mod bootstrap;
pub mod commands;
pub mod countdown;
pub mod notification_reconciler;
pub mod timer_store;
