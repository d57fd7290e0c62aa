//! macro-recorder - Hotkey-driven macro capture and replay
//!
//! Records mouse and keyboard input with timing, stores macros as JSON and
//! replays them with the recorded gaps between events.
//!
//! ## Features
//!
//! - `native`: global input listener and injector via rdev. Without it the
//!   engine runs fine but input has to be fed through [`InputFeed`].

pub mod engine;
pub mod hotkey;
pub mod recorder;
pub mod replay;
pub mod settings;
pub mod status;
pub mod storage;

#[cfg(feature = "native")]
pub mod listener;

pub use engine::{Engine, EngineHandle, EngineSnapshot, InputFeed, SessionState};
pub use hotkey::{Chord, ChordCapture, HotkeyMatcher, HotkeySignal, Shortcuts};
pub use recorder::{CaptureSession, RawEvent, Rect, TrackingOptions};
pub use replay::{CancelToken, Clock, ReplayHandle, ReplayPhase, ReplayReport, Replayer, SystemClock};
pub use settings::Settings;
pub use status::{Status, StatusBus};
pub use storage::MacroStorage;

#[cfg(feature = "native")]
pub use listener::spawn_listener;

pub mod prelude {
    pub use crate::engine::{Engine, EngineHandle, SessionState};
    pub use crate::hotkey::Shortcuts;
    pub use crate::recorder::{Rect, TrackingOptions};
    pub use crate::replay::{ReplayReport, Replayer};
    pub use crate::settings::Settings;
    pub use crate::status::Status;
    pub use crate::storage::MacroStorage;
    pub use macro_core::prelude::*;

    #[cfg(feature = "native")]
    pub use crate::listener::spawn_listener;
}
