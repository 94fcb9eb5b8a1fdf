use crate::domain::time::parse_duration_seconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_DURATION: &str = "45:00";
const INSIDE_LAST_SEAT: u32 = 30;
const OUTSIDE_LAST_SEAT: u32 = 51;

/// Timer id to scheduled notification id.
pub type NotificationMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerShape {
    #[default]
    Circle,
    Rectangle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FloorArea {
    Inside,
    Outside,
}

impl FloorArea {
    pub fn for_timer_id(timer_id: &str) -> Option<Self> {
        match timer_id.trim().parse::<u32>().ok()? {
            1..=INSIDE_LAST_SEAT => Some(Self::Inside),
            seat if seat <= OUTSIDE_LAST_SEAT && seat > INSIDE_LAST_SEAT => Some(Self::Outside),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerRecord {
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub shape: TimerShape,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

impl TimerRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            scale: default_scale(),
            shape: TimerShape::Circle,
            duration: default_duration(),
            start: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.start.is_some()
    }

    pub fn area(&self) -> Option<FloorArea> {
        FloorArea::for_timer_id(&self.id)
    }

    pub fn apply(&mut self, patch: &TimerPatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(scale) = patch.scale {
            self.scale = scale;
        }
        if let Some(shape) = patch.shape {
            self.shape = shape;
        }
        if let Some(duration) = patch.duration.as_ref() {
            self.duration = duration.clone();
        }
        if let Some(start) = patch.start {
            self.start = start;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("timer.id must not be empty".to_string());
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err("timer.scale must be a positive number".to_string());
        }
        match parse_duration_seconds(&self.duration) {
            Ok(seconds) if seconds >= 0 => Ok(()),
            Ok(_) => Err("timer.duration must not be negative".to_string()),
            Err(error) => Err(format!("timer.duration is invalid: {error}")),
        }
    }
}

/// Field overrides for a timer. `start: Some(None)` stops the timer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub scale: Option<f64>,
    pub shape: Option<TimerShape>,
    pub duration: Option<String>,
    pub start: Option<Option<DateTime<Utc>>>,
}

impl TimerPatch {
    pub fn started(start: DateTime<Utc>, duration: impl Into<String>) -> Self {
        Self {
            duration: Some(duration.into()),
            start: Some(Some(start)),
            ..Self::default()
        }
    }
}

fn default_scale() -> f64 {
    1.0
}

fn default_duration() -> String {
    DEFAULT_DURATION.to_string()
}
