use crate::domain::models::{FloorArea, TimerRecord, TimerShape};
use crate::domain::time::{progress_color, remaining};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const INVALID_DISPLAY: &str = "--:--";

/// What a seat shows at one instant.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerView {
    pub id: String,
    pub area: Option<FloorArea>,
    pub shape: TimerShape,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub display: String,
    pub remaining_seconds: i64,
    pub color: String,
    pub running: bool,
}

impl TimerView {
    pub fn at(timer: &TimerRecord, now: DateTime<Utc>) -> Self {
        let (display, remaining_seconds) = match remaining(timer.start, &timer.duration, now) {
            Ok(remaining) => (remaining.display, remaining.seconds),
            Err(_) => (INVALID_DISPLAY.to_string(), 0),
        };
        Self {
            id: timer.id.clone(),
            area: timer.area(),
            shape: timer.shape,
            x: timer.x,
            y: timer.y,
            scale: timer.scale,
            display,
            remaining_seconds,
            color: progress_color(timer.start, &timer.duration, now).to_css(),
            running: timer.is_running(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.display == "00:00"
    }
}

pub fn views_at(timers: &[TimerRecord], now: DateTime<Utc>) -> Vec<TimerView> {
    timers.iter().map(|timer| TimerView::at(timer, now)).collect()
}

/// Recomputes views from a fixed snapshot on every tick. Only reads the
/// snapshot it was given; stops when dropped.
pub struct CountdownTicker {
    handle: JoinHandle<()>,
}

impl CountdownTicker {
    pub fn spawn<F>(
        timers: Vec<TimerRecord>,
        period: Duration,
        now_provider: NowProvider,
        mut on_tick: F,
    ) -> Self
    where
        F: FnMut(Vec<TimerView>) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                on_tick(views_at(&timers, now_provider()));
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
