//! Global input listener (rdev)
//!
//! rdev's `listen` never returns while it works, so it gets a dedicated
//! thread that only translates events and forwards them to the engine.

use crate::engine::InputFeed;
use crate::recorder::RawEvent;
use macro_core::{KeyToken, MouseButton, NamedKey, RawInput, Result};
use rdev::{Button, EventType, Key};
use std::thread;
use tracing::{error, info};

/// Start listening. Failure to install the hook is reported through
/// [`InputFeed::fail`] and ends the thread.
pub fn spawn_listener(feed: InputFeed) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("macro-listener".into())
        .spawn(move || {
            info!("global input listener starting");
            let sink = feed.clone();
            // Button events carry no position; reuse the last motion
            let mut cursor = (0, 0);
            let result = rdev::listen(move |event| {
                if let Some(input) = translate(&event.event_type, &mut cursor) {
                    sink.send(RawEvent::now(input));
                }
            });
            if let Err(e) = result {
                error!(error = ?e, "global input listener failed");
                feed.fail(format!("{:?}", e));
            }
        })?;
    Ok(handle)
}

fn translate(event: &EventType, cursor: &mut (i32, i32)) -> Option<RawInput> {
    Some(match *event {
        EventType::MouseMove { x, y } => {
            *cursor = (x.round() as i32, y.round() as i32);
            RawInput::Motion { x: cursor.0, y: cursor.1 }
        }
        EventType::ButtonPress(b) => RawInput::Button {
            x: cursor.0,
            y: cursor.1,
            button: button_from_rdev(b),
            pressed: true,
        },
        EventType::ButtonRelease(b) => RawInput::Button {
            x: cursor.0,
            y: cursor.1,
            button: button_from_rdev(b),
            pressed: false,
        },
        EventType::KeyPress(k) => RawInput::KeyDown(key_from_rdev(k)),
        EventType::KeyRelease(k) => RawInput::KeyUp(key_from_rdev(k)),
        EventType::Wheel { .. } => return None,
    })
}

fn button_from_rdev(button: Button) -> MouseButton {
    match button {
        Button::Left => MouseButton::Left,
        Button::Right => MouseButton::Right,
        Button::Middle => MouseButton::Middle,
        Button::Unknown(n) => MouseButton::Other(n),
    }
}

/// Physical key to token. Character keys become their unshifted US-layout
/// character so the same physical press always yields the same token.
pub fn key_from_rdev(key: Key) -> KeyToken {
    let named = match key {
        Key::ShiftLeft => NamedKey::Shift,
        Key::ShiftRight => NamedKey::ShiftR,
        Key::ControlLeft => NamedKey::Ctrl,
        Key::ControlRight => NamedKey::CtrlR,
        Key::Alt => NamedKey::Alt,
        Key::AltGr => NamedKey::AltGr,
        Key::MetaLeft => NamedKey::Cmd,
        Key::MetaRight => NamedKey::CmdR,
        Key::CapsLock => NamedKey::CapsLock,
        Key::Tab => NamedKey::Tab,
        Key::Return | Key::KpReturn => NamedKey::Enter,
        Key::Space => NamedKey::Space,
        Key::Backspace => NamedKey::Backspace,
        Key::Delete | Key::KpDelete => NamedKey::Delete,
        Key::Escape => NamedKey::Esc,
        Key::Insert => NamedKey::Insert,
        Key::Home => NamedKey::Home,
        Key::End => NamedKey::End,
        Key::PageUp => NamedKey::PageUp,
        Key::PageDown => NamedKey::PageDown,
        Key::UpArrow => NamedKey::Up,
        Key::DownArrow => NamedKey::Down,
        Key::LeftArrow => NamedKey::Left,
        Key::RightArrow => NamedKey::Right,
        Key::F1 => NamedKey::F1,
        Key::F2 => NamedKey::F2,
        Key::F3 => NamedKey::F3,
        Key::F4 => NamedKey::F4,
        Key::F5 => NamedKey::F5,
        Key::F6 => NamedKey::F6,
        Key::F7 => NamedKey::F7,
        Key::F8 => NamedKey::F8,
        Key::F9 => NamedKey::F9,
        Key::F10 => NamedKey::F10,
        Key::F11 => NamedKey::F11,
        Key::F12 => NamedKey::F12,
        Key::PrintScreen => NamedKey::PrintScreen,
        Key::ScrollLock => NamedKey::ScrollLock,
        Key::Pause => NamedKey::Pause,
        Key::NumLock => NamedKey::NumLock,
        other => return literal_from_rdev(other),
    };
    KeyToken::Named(named)
}

fn literal_from_rdev(key: Key) -> KeyToken {
    let c = match key {
        Key::KeyA => 'a',
        Key::KeyB => 'b',
        Key::KeyC => 'c',
        Key::KeyD => 'd',
        Key::KeyE => 'e',
        Key::KeyF => 'f',
        Key::KeyG => 'g',
        Key::KeyH => 'h',
        Key::KeyI => 'i',
        Key::KeyJ => 'j',
        Key::KeyK => 'k',
        Key::KeyL => 'l',
        Key::KeyM => 'm',
        Key::KeyN => 'n',
        Key::KeyO => 'o',
        Key::KeyP => 'p',
        Key::KeyQ => 'q',
        Key::KeyR => 'r',
        Key::KeyS => 's',
        Key::KeyT => 't',
        Key::KeyU => 'u',
        Key::KeyV => 'v',
        Key::KeyW => 'w',
        Key::KeyX => 'x',
        Key::KeyY => 'y',
        Key::KeyZ => 'z',
        Key::Num0 | Key::Kp0 => '0',
        Key::Num1 | Key::Kp1 => '1',
        Key::Num2 | Key::Kp2 => '2',
        Key::Num3 | Key::Kp3 => '3',
        Key::Num4 | Key::Kp4 => '4',
        Key::Num5 | Key::Kp5 => '5',
        Key::Num6 | Key::Kp6 => '6',
        Key::Num7 | Key::Kp7 => '7',
        Key::Num8 | Key::Kp8 => '8',
        Key::Num9 | Key::Kp9 => '9',
        Key::Minus | Key::KpMinus => '-',
        Key::Equal => '=',
        Key::KpPlus => '+',
        Key::KpMultiply => '*',
        Key::KpDivide | Key::Slash => '/',
        Key::LeftBracket => '[',
        Key::RightBracket => ']',
        Key::BackSlash | Key::IntlBackslash => '\\',
        Key::SemiColon => ';',
        Key::Quote => '\'',
        Key::Comma => ',',
        Key::Dot => '.',
        Key::BackQuote => '`',
        Key::Function => return KeyToken::Literal("fn".into()),
        Key::Unknown(code) => return KeyToken::Literal(format!("<{}>", code)),
        other => return KeyToken::Literal(format!("{:?}", other).to_lowercase()),
    };
    KeyToken::literal(c)
}
