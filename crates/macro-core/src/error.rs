//! Structured errors shared by every component

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[{code:?}] {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoTrackingEnabled,
    ListenerUnavailable,
    AlreadyReplaying,
    AlreadyRecording,
    NotRecording,
    MalformedEvent,
    DuplicateOrIncompleteShortcut,
    FavoriteNotFound,
    InvalidMacroName,
    NoMacroRecorded,
    InjectionFailed,
    ChordCaptureCancelled,
    EngineStopped,
    Io,
}

impl ErrorCode {
    /// Short message suitable for showing to the user as-is.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NoTrackingEnabled => "At least one tracking option must be enabled!",
            Self::ListenerUnavailable => "Input listener unavailable, check input permissions.",
            Self::AlreadyReplaying => "A macro is currently playing!",
            Self::AlreadyRecording => "Stop the current recording first.",
            Self::NotRecording => "Nothing is being recorded.",
            Self::MalformedEvent => "Stored macro data is damaged.",
            Self::DuplicateOrIncompleteShortcut => "Shortcut keys must be set and distinct!",
            Self::FavoriteNotFound => "No favorite macro with that name.",
            Self::InvalidMacroName => "Enter a name for the macro.",
            Self::NoMacroRecorded => "No recorded macro found!",
            Self::InjectionFailed => "Could not simulate an input event.",
            Self::ChordCaptureCancelled => "Key combination capture was cancelled.",
            Self::EngineStopped => "The recorder is not running.",
            Self::Io => "Could not read or write macro files.",
        }
    }
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn no_tracking_enabled() -> Self {
        Self::new(ErrorCode::NoTrackingEnabled, ErrorCode::NoTrackingEnabled.user_message())
            .with_suggestions(vec!["enable mouse or keyboard tracking".into()])
    }

    pub fn listener_unavailable(reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ListenerUnavailable,
            format!("Input listener unavailable: {}", reason),
        )
    }

    pub fn already_replaying() -> Self {
        Self::new(ErrorCode::AlreadyReplaying, ErrorCode::AlreadyReplaying.user_message())
    }

    pub fn already_recording() -> Self {
        Self::new(ErrorCode::AlreadyRecording, ErrorCode::AlreadyRecording.user_message())
    }

    pub fn not_recording() -> Self {
        Self::new(ErrorCode::NotRecording, ErrorCode::NotRecording.user_message())
    }

    pub fn malformed_event(reason: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::MalformedEvent, format!("Malformed event: {}", reason))
    }

    pub fn shortcut(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateOrIncompleteShortcut, message)
    }

    pub fn favorite_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::FavoriteNotFound,
            format!("No favorite macro named '{}'", name),
        )
    }

    pub fn invalid_name() -> Self {
        Self::new(ErrorCode::InvalidMacroName, ErrorCode::InvalidMacroName.user_message())
    }

    pub fn no_macro_recorded() -> Self {
        Self::new(ErrorCode::NoMacroRecorded, ErrorCode::NoMacroRecorded.user_message())
    }

    pub fn injection_failed(action: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::InjectionFailed,
            format!("{} failed: {}", action, reason),
        )
    }

    pub fn capture_cancelled() -> Self {
        Self::new(
            ErrorCode::ChordCaptureCancelled,
            ErrorCode::ChordCaptureCancelled.user_message(),
        )
    }

    pub fn engine_stopped() -> Self {
        Self::new(ErrorCode::EngineStopped, ErrorCode::EngineStopped.user_message())
    }

    pub fn io(path: &std::path::Path, e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, format!("{}: {}", path.display(), e))
            .with_context(serde_json::json!({ "path": path.display().to_string() }))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let e = Error::already_replaying();
        assert_eq!(e.to_string(), "[AlreadyReplaying] A macro is currently playing!");
    }

    #[test]
    fn every_code_has_a_distinct_message() {
        let codes = [
            ErrorCode::NoTrackingEnabled,
            ErrorCode::ListenerUnavailable,
            ErrorCode::AlreadyReplaying,
            ErrorCode::AlreadyRecording,
            ErrorCode::NotRecording,
            ErrorCode::MalformedEvent,
            ErrorCode::DuplicateOrIncompleteShortcut,
            ErrorCode::FavoriteNotFound,
            ErrorCode::InvalidMacroName,
            ErrorCode::NoMacroRecorded,
            ErrorCode::InjectionFailed,
            ErrorCode::ChordCaptureCancelled,
            ErrorCode::EngineStopped,
            ErrorCode::Io,
        ];
        let messages: std::collections::HashSet<_> =
            codes.iter().map(|c| c.user_message()).collect();
        assert_eq!(messages.len(), codes.len());
    }

    #[test]
    fn serializes_code_in_screaming_case() {
        let json = serde_json::to_value(Error::invalid_name()).unwrap();
        assert_eq!(json["code"], "INVALID_MACRO_NAME");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn io_errors_carry_the_path() {
        let e = Error::io(
            std::path::Path::new("/tmp/macro.json"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(e.code, ErrorCode::Io);
        assert_eq!(e.context.unwrap()["path"], "/tmp/macro.json");
    }
}
