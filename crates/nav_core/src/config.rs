use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::DataMode;
use tracing::warn;

use crate::{error::NavigationError, handler::DEFAULT_WATCHDOG};

pub const SETTINGS_FILE: &str = "navigator.toml";
const DEFAULT_INIT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub data_mode: String,
    pub watchdog_ms: u64,
    pub init_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_mode: DataMode::Bookmarkable.as_str().into(),
            watchdog_ms: DEFAULT_WATCHDOG.as_millis() as u64,
            init_poll_ms: DEFAULT_INIT_POLL.as_millis() as u64,
        }
    }
}

/// Validated runtime options of a navigator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigatorOptions {
    pub data_mode: DataMode,
    pub watchdog: Duration,
    pub init_poll_interval: Duration,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            data_mode: DataMode::Bookmarkable,
            watchdog: DEFAULT_WATCHDOG,
            init_poll_interval: DEFAULT_INIT_POLL,
        }
    }
}

impl Settings {
    pub fn options(&self) -> Result<NavigatorOptions, NavigationError> {
        let data_mode = self.data_mode.parse::<DataMode>()?;
        if self.watchdog_ms == 0 {
            return Err(NavigationError::Settings("watchdog_ms must be positive".into()));
        }
        if self.init_poll_ms == 0 {
            return Err(NavigationError::Settings("init_poll_ms must be positive".into()));
        }
        Ok(NavigatorOptions {
            data_mode,
            watchdog: Duration::from_millis(self.watchdog_ms),
            init_poll_interval: Duration::from_millis(self.init_poll_ms),
        })
    }
}

/// Defaults, then `navigator.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "config: ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("NAV_DATA_MODE").or_else(|| env("APP__DATA_MODE")) {
        settings.data_mode = v;
    }
    if let Some(v) = env("NAV_WATCHDOG_MS").or_else(|| env("APP__WATCHDOG_MS")) {
        set_millis(&mut settings.watchdog_ms, "watchdog_ms", &v);
    }
    if let Some(v) = env("NAV_INIT_POLL_MS").or_else(|| env("APP__INIT_POLL_MS")) {
        set_millis(&mut settings.init_poll_ms, "init_poll_ms", &v);
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("data_mode").and_then(toml::Value::as_str) {
        settings.data_mode = v.to_string();
    }
    if let Some(v) = file_cfg.get("watchdog_ms").and_then(toml::Value::as_integer) {
        set_millis(&mut settings.watchdog_ms, "watchdog_ms", &v.to_string());
    }
    if let Some(v) = file_cfg.get("init_poll_ms").and_then(toml::Value::as_integer) {
        set_millis(&mut settings.init_poll_ms, "init_poll_ms", &v.to_string());
    }
}

fn set_millis(slot: &mut u64, key: &str, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = raw, "config: ignoring non-numeric duration"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
