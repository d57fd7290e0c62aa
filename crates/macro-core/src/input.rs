//! Virtual pointer and keyboard
//!
//! Replay drives an [`InputSink`]. Named keys and literal characters go
//! through separate calls because OS injection APIs treat them differently.

use crate::error::Result;
use crate::events::{MouseButton, NamedKey};

pub trait InputSink: Send + Sync {
    fn move_to(&self, x: i32, y: i32) -> Result<()>;
    fn button(&self, button: MouseButton, pressed: bool) -> Result<()>;
    fn press_named(&self, key: NamedKey) -> Result<()>;
    fn release_named(&self, key: NamedKey) -> Result<()>;
    fn press_literal(&self, text: &str) -> Result<()>;
    fn release_literal(&self, text: &str) -> Result<()>;
}

#[cfg(feature = "rdev")]
pub use native::{key_to_rdev, RdevSink};

#[cfg(feature = "rdev")]
mod native {
    use super::*;
    use crate::error::Error;
    use rdev::{simulate, Button, EventType, Key};
    use tracing::debug;

    /// Injects input through rdev's `simulate`
    #[derive(Debug, Default, Clone, Copy)]
    pub struct RdevSink;

    impl RdevSink {
        pub fn new() -> Self {
            Self
        }

        fn send(&self, action: &str, event: EventType) -> Result<()> {
            simulate(&event).map_err(|e| {
                debug!(action, ?event, error = ?e, "simulate failed");
                Error::injection_failed(action, format!("{:?}", e))
            })
        }

        fn literal_key(text: &str) -> Result<Key> {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => char_to_key(c)
                    .ok_or_else(|| Error::injection_failed("key", format!("no key for '{}'", c))),
                _ => Err(Error::injection_failed("key", format!("not a single character: '{}'", text))),
            }
        }
    }

    impl InputSink for RdevSink {
        fn move_to(&self, x: i32, y: i32) -> Result<()> {
            self.send("move", EventType::MouseMove { x: x as f64, y: y as f64 })
        }

        fn button(&self, button: MouseButton, pressed: bool) -> Result<()> {
            let b = match button {
                MouseButton::Left => Button::Left,
                MouseButton::Right => Button::Right,
                MouseButton::Middle => Button::Middle,
                MouseButton::Other(n) => Button::Unknown(n),
            };
            if pressed {
                self.send("button press", EventType::ButtonPress(b))
            } else {
                self.send("button release", EventType::ButtonRelease(b))
            }
        }

        fn press_named(&self, key: NamedKey) -> Result<()> {
            self.send("key press", EventType::KeyPress(key_to_rdev(key)))
        }

        fn release_named(&self, key: NamedKey) -> Result<()> {
            self.send("key release", EventType::KeyRelease(key_to_rdev(key)))
        }

        fn press_literal(&self, text: &str) -> Result<()> {
            let key = Self::literal_key(text)?;
            self.send("key press", EventType::KeyPress(key))
        }

        fn release_literal(&self, text: &str) -> Result<()> {
            let key = Self::literal_key(text)?;
            self.send("key release", EventType::KeyRelease(key))
        }
    }

    pub fn key_to_rdev(key: NamedKey) -> Key {
        match key {
            NamedKey::Shift => Key::ShiftLeft,
            NamedKey::ShiftR => Key::ShiftRight,
            NamedKey::Ctrl => Key::ControlLeft,
            NamedKey::CtrlR => Key::ControlRight,
            NamedKey::Alt => Key::Alt,
            NamedKey::AltGr => Key::AltGr,
            NamedKey::Cmd => Key::MetaLeft,
            NamedKey::CmdR => Key::MetaRight,
            NamedKey::CapsLock => Key::CapsLock,
            NamedKey::Tab => Key::Tab,
            NamedKey::Enter => Key::Return,
            NamedKey::Space => Key::Space,
            NamedKey::Backspace => Key::Backspace,
            NamedKey::Delete => Key::Delete,
            NamedKey::Esc => Key::Escape,
            NamedKey::Insert => Key::Insert,
            NamedKey::Home => Key::Home,
            NamedKey::End => Key::End,
            NamedKey::PageUp => Key::PageUp,
            NamedKey::PageDown => Key::PageDown,
            NamedKey::Up => Key::UpArrow,
            NamedKey::Down => Key::DownArrow,
            NamedKey::Left => Key::LeftArrow,
            NamedKey::Right => Key::RightArrow,
            NamedKey::F1 => Key::F1,
            NamedKey::F2 => Key::F2,
            NamedKey::F3 => Key::F3,
            NamedKey::F4 => Key::F4,
            NamedKey::F5 => Key::F5,
            NamedKey::F6 => Key::F6,
            NamedKey::F7 => Key::F7,
            NamedKey::F8 => Key::F8,
            NamedKey::F9 => Key::F9,
            NamedKey::F10 => Key::F10,
            NamedKey::F11 => Key::F11,
            NamedKey::F12 => Key::F12,
            NamedKey::PrintScreen => Key::PrintScreen,
            NamedKey::ScrollLock => Key::ScrollLock,
            NamedKey::Pause => Key::Pause,
            NamedKey::NumLock => Key::NumLock,
        }
    }

    /// Physical key that produces `c` on a US layout (case-insensitive)
    fn char_to_key(c: char) -> Option<Key> {
        Some(match c.to_ascii_lowercase() {
            'a' => Key::KeyA,
            'b' => Key::KeyB,
            'c' => Key::KeyC,
            'd' => Key::KeyD,
            'e' => Key::KeyE,
            'f' => Key::KeyF,
            'g' => Key::KeyG,
            'h' => Key::KeyH,
            'i' => Key::KeyI,
            'j' => Key::KeyJ,
            'k' => Key::KeyK,
            'l' => Key::KeyL,
            'm' => Key::KeyM,
            'n' => Key::KeyN,
            'o' => Key::KeyO,
            'p' => Key::KeyP,
            'q' => Key::KeyQ,
            'r' => Key::KeyR,
            's' => Key::KeyS,
            't' => Key::KeyT,
            'u' => Key::KeyU,
            'v' => Key::KeyV,
            'w' => Key::KeyW,
            'x' => Key::KeyX,
            'y' => Key::KeyY,
            'z' => Key::KeyZ,
            '0' | ')' => Key::Num0,
            '1' | '!' => Key::Num1,
            '2' | '@' => Key::Num2,
            '3' | '#' => Key::Num3,
            '4' | '$' => Key::Num4,
            '5' | '%' => Key::Num5,
            '6' | '^' => Key::Num6,
            '7' | '&' => Key::Num7,
            '8' | '*' => Key::Num8,
            '9' | '(' => Key::Num9,
            '-' | '_' => Key::Minus,
            '=' | '+' => Key::Equal,
            '[' | '{' => Key::LeftBracket,
            ']' | '}' => Key::RightBracket,
            '\\' | '|' => Key::BackSlash,
            ';' | ':' => Key::SemiColon,
            '\'' | '"' => Key::Quote,
            ',' | '<' => Key::Comma,
            '.' | '>' => Key::Dot,
            '/' | '?' => Key::Slash,
            '`' | '~' => Key::BackQuote,
            ' ' => Key::Space,
            _ => return None,
        })
    }
}
