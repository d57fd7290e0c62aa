//! macro-core - Event model and input plumbing for the macro recorder
//!
//! Deterministic, OS-neutral types shared by capture and replay.
//!
//! ## Features
//!
//! - `rdev`: native input injection ([`RdevSink`]) via the rdev crate.
//!   Without it the crate is pure data and can be used (and tested)
//!   on machines with no input stack.

pub mod error;
pub mod events;
pub mod input;

pub use error::{Error, ErrorCode, Result};
pub use events::{
    Event, KeyToken, MacroSequence, MouseButton, NamedKey, RawInput, SequenceSummary,
};
pub use input::InputSink;
#[cfg(feature = "rdev")]
pub use input::RdevSink;

pub mod prelude {
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::events::*;
    pub use crate::input::InputSink;
    #[cfg(feature = "rdev")]
    pub use crate::input::RdevSink;
}
