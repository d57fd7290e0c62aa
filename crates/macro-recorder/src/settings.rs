//! User settings: tracking toggles and the two global shortcuts

use crate::hotkey::Shortcuts;
use crate::recorder::TrackingOptions;
use crate::storage::{default_dir, write_json};
use macro_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_RECORD_KEY: &str = "ctrl+s";
pub const DEFAULT_REPLAY_KEY: &str = "ctrl+r";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub track_mouse: bool,
    pub track_keyboard: bool,
    pub record_key: String,
    pub replay_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            track_mouse: true,
            track_keyboard: true,
            record_key: DEFAULT_RECORD_KEY.into(),
            replay_key: DEFAULT_REPLAY_KEY.into(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Result<PathBuf> {
        Ok(default_dir()?.join(SETTINGS_FILE))
    }

    /// Load from `path`. Never fails: a missing file, bad JSON, or a bad
    /// field each fall back to the defaults for what could not be read.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings unreadable, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings are not valid JSON, using defaults");
                Self::default()
            }
        }
    }

    /// Field-by-field read; each missing or mistyped field keeps its default
    pub fn from_value(value: &Value) -> Self {
        let d = Self::default();
        let flag = |key: &str, default: bool| value.get(key).and_then(Value::as_bool).unwrap_or(default);
        let text = |key: &str, default: String| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(default)
        };
        Self {
            track_mouse: flag("track_mouse", d.track_mouse),
            track_keyboard: flag("track_keyboard", d.track_keyboard),
            record_key: text("record_key", d.record_key),
            replay_key: text("replay_key", d.replay_key),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        write_json(path, self)
    }

    pub fn tracking(&self) -> TrackingOptions {
        TrackingOptions {
            mouse: self.track_mouse,
            keyboard: self.track_keyboard,
        }
    }

    pub fn set_tracking(&mut self, options: TrackingOptions) {
        self.track_mouse = options.mouse;
        self.track_keyboard = options.keyboard;
    }

    /// Validate and store a new shortcut pair (lower-cased, as displayed)
    pub fn set_shortcuts(&mut self, record: &str, replay: &str) -> Result<Shortcuts> {
        let shortcuts = Shortcuts::validate(record, replay)?;
        self.record_key = shortcuts.record.to_string();
        self.replay_key = shortcuts.replay.to_string();
        Ok(shortcuts)
    }

    pub fn reset_shortcuts(&mut self) {
        self.record_key = DEFAULT_RECORD_KEY.into();
        self.replay_key = DEFAULT_REPLAY_KEY.into();
    }

    /// The configured shortcuts, or the defaults if the stored pair is invalid
    pub fn shortcuts(&self) -> Shortcuts {
        Shortcuts::validate(&self.record_key, &self.replay_key).unwrap_or_else(|e| {
            warn!(error = %e, "stored shortcuts invalid, using defaults");
            Shortcuts::default()
        })
    }
}
