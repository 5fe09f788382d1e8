//! Configuration of a conversation timeline, persistable as JSON.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::descriptor::Millis;

/// Settings that affect how a timeline is composed and driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// How long the fade-out of a both-deleted item lasts.
    pub fade_out_duration_ms: Millis,
    /// How often the progress ring of armed ephemeral items is refreshed.
    pub progress_tick_interval_ms: Millis,
    /// Whether this is a group conversation, where peer runs are split by sender.
    pub group_chat: bool,
    pub separators: SeparatorSettings,
    pub appearance: AppearanceSettings,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            fade_out_duration_ms: 1_000,
            progress_tick_interval_ms: 1_000,
            group_chat: false,
            separators: SeparatorSettings::default(),
            appearance: AppearanceSettings::default(),
        }
    }
}

/// Inputs of the default separator policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparatorSettings {
    /// Insert a date row whenever the calendar day changes.
    pub day_separators: bool,
    /// In group chats, insert the peer's name before each of their runs.
    pub name_separators: bool,
    /// The UTC offset (in minutes) used to determine calendar days.
    pub utc_offset_minutes: i32,
}

impl Default for SeparatorSettings {
    fn default() -> Self {
        Self {
            day_separators: true,
            name_separators: true,
            utc_offset_minutes: 0,
        }
    }
}

/// The parts of the user's custom appearance that affect composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceSettings {
    /// Group consecutive bubbles from the same sender with tight corners.
    pub group_runs: bool,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self { group_runs: true }
    }
}

/// Loads timeline settings from the JSON file at `path`.
///
/// If the file doesn't exist, the default settings are returned.
/// If it cannot be deserialized (e.g., due to an incompatible format from an older version),
/// the bad file is backed up next to the original and the default settings are returned.
pub fn load_settings(path: &Path) -> anyhow::Result<TimelineSettings> {
    let file_bytes = match std::fs::read(path) {
        Ok(fb) => fb,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No timeline settings found at {}, using defaults.", path.display());
            return Ok(TimelineSettings::default());
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    match serde_json::from_slice(&file_bytes) {
        Ok(settings) => {
            debug!("Loaded timeline settings from {}.", path.display());
            Ok(settings)
        }
        Err(e) => {
            error!("Failed to deserialize timeline settings: {e}. Backing up the old file and using defaults.");
            let backup_path = path.with_extension("json.bak");
            std::fs::rename(path, &backup_path)
                .with_context(|| format!("failed to back up {}", path.display()))?;
            Ok(TimelineSettings::default())
        }
    }
}

/// Saves the given settings as pretty-printed JSON to `path`.
pub fn save_settings(settings: &TimelineSettings, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!("Saved timeline settings to {}.", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("chat-timeline-settings-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("settings.json")
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = temp_path("missing");
        let _ = std::fs::remove_file(&path);
        assert_eq!(load_settings(&path).unwrap(), TimelineSettings::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{ "group_chat": true, "separators": { "utc_offset_minutes": 120 } }"#).unwrap();
        let settings = load_settings(&path).unwrap();
        assert!(settings.group_chat);
        assert_eq!(settings.separators.utc_offset_minutes, 120);
        assert!(settings.separators.day_separators);
        assert_eq!(settings.fade_out_duration_ms, 1_000);
    }

    #[test]
    fn test_malformed_file_is_backed_up() {
        let path = temp_path("malformed");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_settings(&path).unwrap(), TimelineSettings::default());
        assert!(!path.exists());
        assert!(path.with_extension("json.bak").exists());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("save");
        let settings = TimelineSettings {
            group_chat: true,
            appearance: AppearanceSettings { group_runs: false },
            ..TimelineSettings::default()
        };
        save_settings(&settings, &path).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }
}
