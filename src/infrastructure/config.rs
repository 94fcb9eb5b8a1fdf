use crate::domain::models::DEFAULT_DURATION;
use crate::domain::time::parse_duration_seconds;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;
const MIN_TICK_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub channel_id: String,
    pub channel_name: String,
    /// `{id}` is replaced with the timer id.
    pub title: String,
    pub body: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            channel_id: "timer".to_string(),
            channel_name: "Timer Notifications".to_string(),
            title: "⏰ Timer {id} finished!".to_string(),
            body: "Your timer is up!".to_string(),
        }
    }
}

impl NotificationSettings {
    pub fn title_for(&self, timer_id: &str) -> String {
        self.title.replace("{id}", timer_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub app_name: String,
    pub default_duration: String,
    pub tick_interval_ms: u64,
    pub notification: NotificationSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            app_name: "Cafe Kai".to_string(),
            default_duration: DEFAULT_DURATION.to_string(),
            tick_interval_ms: 1000,
            notification: NotificationSettings::default(),
        }
    }
}

impl AppConfig {
    fn validate(&self, path: &Path) -> Result<(), InfraError> {
        match parse_duration_seconds(&self.default_duration) {
            Ok(seconds) if seconds >= 0 => {}
            _ => {
                return Err(InfraError::InvalidConfig(format!(
                    "defaultDuration '{}' in {} is not a duration",
                    self.default_duration,
                    path.display()
                )));
            }
        }
        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(InfraError::InvalidConfig(format!(
                "tickIntervalMs must be at least {MIN_TICK_INTERVAL_MS} in {}",
                path.display()
            )));
        }
        if self.notification.channel_id.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!(
                "notification.channelId must not be empty in {}",
                path.display()
            )));
        }
        Ok(())
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Reads `app.json`, filling keys the file omits from the defaults.
pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let mut merged = serde_json::to_value(AppConfig::default())?;
    let overrides = read_config(&path)?;
    merge_objects(&mut merged, overrides);

    let config: AppConfig = serde_json::from_value(merged)
        .map_err(|error| InfraError::InvalidConfig(format!("{}: {error}", path.display())))?;
    config.validate(&path)?;
    Ok(config)
}

fn merge_objects(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                let nested = value.is_object()
                    && base.get(&key).is_some_and(serde_json::Value::is_object);
                if !nested {
                    base.insert(key, value);
                } else if let Some(existing) = base.get_mut(&key) {
                    merge_objects(existing, value);
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}
