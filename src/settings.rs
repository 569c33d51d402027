use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

pub const DEFAULT_STUDY_MINUTES: u64 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u64 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u64 = 15;
pub const DEFAULT_POMODORO_CYCLES: u32 = 4;

/// Durations are in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub study_time: u64,
    pub short_break_time: u64,
    pub long_break_time: u64,
    pub pomodoro_cycles: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            study_time: DEFAULT_STUDY_MINUTES,
            short_break_time: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_time: DEFAULT_LONG_BREAK_MINUTES,
            pomodoro_cycles: DEFAULT_POMODORO_CYCLES,
            auto_start_breaks: true,
            auto_start_pomodoros: false,
        }
    }
}

impl TimerSettings {
    /// Replaces zero durations and cycle lengths with the defaults.
    pub fn sanitized(mut self) -> Self {
        fn fix<T: PartialEq + Default + Copy + std::fmt::Display>(
            name: &str,
            value: &mut T,
            fallback: T,
        ) {
            if *value == T::default() {
                warn!("invalid {name} '{value}', using default {fallback}");
                *value = fallback;
            }
        }

        fix("study_time", &mut self.study_time, DEFAULT_STUDY_MINUTES);
        fix(
            "short_break_time",
            &mut self.short_break_time,
            DEFAULT_SHORT_BREAK_MINUTES,
        );
        fix(
            "long_break_time",
            &mut self.long_break_time,
            DEFAULT_LONG_BREAK_MINUTES,
        );
        fix(
            "pomodoro_cycles",
            &mut self.pomodoro_cycles,
            DEFAULT_POMODORO_CYCLES,
        );
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    timer: TimerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_or_default(&contents, &path)
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Current timer settings with invalid values already replaced.
    pub fn timer(&self) -> TimerSettings {
        self.read().timer.clone().sanitized()
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        let mut guard = self.write();
        guard.timer = settings.sanitized();
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data = parse_or_default(&contents, &self.path);
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_or_default(contents: &str, path: &std::path::Path) -> UserSettings {
    serde_json::from_str(contents).unwrap_or_else(|err| {
        warn!(
            "Ignoring unreadable settings at {}: {err}; using defaults",
            path.display()
        );
        UserSettings::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        assert_eq!(store.timer(), TimerSettings::default());
    }

    #[test]
    fn partial_and_invalid_values_fall_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "timer": { "study_time": 50, "short_break_time": 0, "pomodoro_cycles": 0 } }"#,
        )
        .unwrap();

        let timer = SettingsStore::new(path).unwrap().timer();

        assert_eq!(timer.study_time, 50);
        assert_eq!(timer.short_break_time, DEFAULT_SHORT_BREAK_MINUTES);
        assert_eq!(timer.long_break_time, DEFAULT_LONG_BREAK_MINUTES);
        assert_eq!(timer.pomodoro_cycles, DEFAULT_POMODORO_CYCLES);
    }

    #[test]
    fn corrupt_json_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.timer(), TimerSettings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        store
            .update_timer(TimerSettings {
                study_time: 40,
                pomodoro_cycles: 3,
                auto_start_pomodoros: true,
                ..TimerSettings::default()
            })
            .unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.timer().study_time, 40);
        assert_eq!(reopened.timer().pomodoro_cycles, 3);
        assert!(reopened.timer().auto_start_pomodoros);

        reopened.reload().unwrap();
        assert_eq!(reopened.timer().study_time, 40);
    }
}
