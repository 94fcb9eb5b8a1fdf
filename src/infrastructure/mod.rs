pub mod config;
pub mod error;
pub mod notification_scheduler;
pub mod storage;
