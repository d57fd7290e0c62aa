//! Event model: what a macro is made of and how it is written to disk
//!
//! Events serialize to flat JSON objects with an explicit `type`
//! discriminant, e.g. `{"type":"click","x":10,"y":20,"button":"left","pressed":true,"t":0.25}`.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Symbolic (non-character) keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamedKey {
    Shift,
    ShiftR,
    Ctrl,
    CtrlR,
    Alt,
    AltGr,
    Cmd,
    CmdR,
    CapsLock,
    Tab,
    Enter,
    Space,
    Backspace,
    Delete,
    Esc,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    PrintScreen,
    ScrollLock,
    Pause,
    NumLock,
}

const KEY_NAMES: &[(NamedKey, &str)] = &[
    (NamedKey::Shift, "shift"),
    (NamedKey::ShiftR, "shift_r"),
    (NamedKey::Ctrl, "ctrl"),
    (NamedKey::CtrlR, "ctrl_r"),
    (NamedKey::Alt, "alt"),
    (NamedKey::AltGr, "alt_gr"),
    (NamedKey::Cmd, "cmd"),
    (NamedKey::CmdR, "cmd_r"),
    (NamedKey::CapsLock, "caps_lock"),
    (NamedKey::Tab, "tab"),
    (NamedKey::Enter, "enter"),
    (NamedKey::Space, "space"),
    (NamedKey::Backspace, "backspace"),
    (NamedKey::Delete, "delete"),
    (NamedKey::Esc, "esc"),
    (NamedKey::Insert, "insert"),
    (NamedKey::Home, "home"),
    (NamedKey::End, "end"),
    (NamedKey::PageUp, "page_up"),
    (NamedKey::PageDown, "page_down"),
    (NamedKey::Up, "up"),
    (NamedKey::Down, "down"),
    (NamedKey::Left, "left"),
    (NamedKey::Right, "right"),
    (NamedKey::F1, "f1"),
    (NamedKey::F2, "f2"),
    (NamedKey::F3, "f3"),
    (NamedKey::F4, "f4"),
    (NamedKey::F5, "f5"),
    (NamedKey::F6, "f6"),
    (NamedKey::F7, "f7"),
    (NamedKey::F8, "f8"),
    (NamedKey::F9, "f9"),
    (NamedKey::F10, "f10"),
    (NamedKey::F11, "f11"),
    (NamedKey::F12, "f12"),
    (NamedKey::PrintScreen, "print_screen"),
    (NamedKey::ScrollLock, "scroll_lock"),
    (NamedKey::Pause, "pause"),
    (NamedKey::NumLock, "num_lock"),
];

impl NamedKey {
    pub fn name(self) -> &'static str {
        KEY_NAMES
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }

    /// Look up a key by its canonical name or a common alias (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let canonical = match lower.as_str() {
            "shift_l" => "shift",
            "control" | "control_l" | "ctrl_l" => "ctrl",
            "control_r" => "ctrl_r",
            "alt_l" | "option" => "alt",
            "alt_r" => "alt_gr",
            "cmd_l" | "command" | "meta" | "super" | "win" => "cmd",
            "return" => "enter",
            "escape" => "esc",
            "del" => "delete",
            "pgup" => "page_up",
            "pgdn" => "page_down",
            other => other,
        };
        KEY_NAMES
            .iter()
            .find(|(_, n)| *n == canonical)
            .map(|(k, _)| *k)
    }
}

/// A single keyboard key: a named symbol or a literal character
///
/// Wire form is `Key.<name>` for named keys and the literal text otherwise.
/// Parsing never fails: anything unrecognised is kept as a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeyToken {
    Named(NamedKey),
    Literal(String),
}

const WIRE_PREFIX: &str = "Key.";
const WIRE_ESCAPE: &str = "\\";
const CHORD_PLUS: &str = "plus";

impl KeyToken {
    pub fn literal(c: char) -> Self {
        Self::Literal(c.to_string())
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named(_))
    }

    /// A literal that starts with `\` (and is longer than the backslash key
    /// itself) is escaped; the first backslash is dropped.
    pub fn from_wire(s: &str) -> Self {
        if let Some(escaped) = s.strip_prefix(WIRE_ESCAPE).filter(|rest| !rest.is_empty()) {
            return Self::Literal(escaped.to_string());
        }
        if let Some(name) = s.strip_prefix(WIRE_PREFIX) {
            if let Some(key) = NamedKey::from_name(name) {
                return Self::Named(key);
            }
        }
        Self::Literal(s.to_string())
    }

    pub fn to_wire(&self) -> String {
        match self {
            Self::Named(k) => format!("{}{}", WIRE_PREFIX, k.name()),
            Self::Literal(s) if Self::needs_escape(s) => format!("{}{}", WIRE_ESCAPE, s),
            Self::Literal(s) => s.clone(),
        }
    }

    /// Literals that would otherwise read back as a named key or as an escape
    fn needs_escape(s: &str) -> bool {
        (s.starts_with(WIRE_ESCAPE) && s.len() > WIRE_ESCAPE.len())
            || s
                .strip_prefix(WIRE_PREFIX)
                .is_some_and(|name| NamedKey::from_name(name).is_some())
    }

    /// Parse one `+`-separated part of a chord string such as `ctrl+s`
    pub fn from_chord_part(part: &str) -> Self {
        let part = part.trim().to_lowercase();
        if part == CHORD_PLUS {
            return Self::Literal("+".into());
        }
        match NamedKey::from_name(&part) {
            Some(key) => Self::Named(key),
            None => Self::Literal(part),
        }
    }

    /// Inverse of [`KeyToken::from_chord_part`]. The `+` key is written as
    /// `plus` since `+` separates the parts.
    pub fn to_chord_part(&self) -> String {
        match self {
            Self::Literal(s) if s == "+" => CHORD_PLUS.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<String> for KeyToken {
    fn from(s: String) -> Self {
        Self::from_wire(&s)
    }
}

impl From<KeyToken> for String {
    fn from(k: KeyToken) -> Self {
        k.to_wire()
    }
}

impl From<NamedKey> for KeyToken {
    fn from(k: NamedKey) -> Self {
        Self::Named(k)
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(k) => f.write_str(k.name()),
            Self::Literal(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u8),
}

impl TryFrom<String> for MouseButton {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        match s.as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            other => other
                .strip_prefix("button")
                .and_then(|n| n.parse().ok())
                .map(Self::Other)
                .ok_or_else(|| format!("unknown mouse button '{}'", other)),
        }
    }
}

impl From<MouseButton> for String {
    fn from(b: MouseButton) -> Self {
        match b {
            MouseButton::Left => "left".into(),
            MouseButton::Right => "right".into(),
            MouseButton::Middle => "middle".into(),
            MouseButton::Other(n) => format!("button{}", n),
        }
    }
}

/// One recorded action. `t` is the elapsed time since the recording started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "move")]
    Move {
        x: i32,
        y: i32,
        #[serde(with = "seconds")]
        t: Duration,
    },

    #[serde(rename = "click")]
    Click {
        x: i32,
        y: i32,
        button: MouseButton,
        pressed: bool,
        #[serde(with = "seconds")]
        t: Duration,
    },

    #[serde(rename = "key_press")]
    KeyPress {
        key: KeyToken,
        #[serde(with = "seconds")]
        t: Duration,
    },

    #[serde(rename = "key_release")]
    KeyRelease {
        key: KeyToken,
        #[serde(with = "seconds")]
        t: Duration,
    },
}

/// OS-neutral input notification, as delivered by a listener
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    Motion { x: i32, y: i32 },
    Button { x: i32, y: i32, button: MouseButton, pressed: bool },
    KeyDown(KeyToken),
    KeyUp(KeyToken),
}

impl Event {
    /// Build an event from raw input observed `t` after the session started
    pub fn from_raw(input: RawInput, t: Duration) -> Self {
        let t = quantize(t);
        match input {
            RawInput::Motion { x, y } => Self::Move { x, y, t },
            RawInput::Button { x, y, button, pressed } => Self::Click { x, y, button, pressed, t },
            RawInput::KeyDown(key) => Self::KeyPress { key, t },
            RawInput::KeyUp(key) => Self::KeyRelease { key, t },
        }
    }

    pub fn t(&self) -> Duration {
        match self {
            Self::Move { t, .. }
            | Self::Click { t, .. }
            | Self::KeyPress { t, .. }
            | Self::KeyRelease { t, .. } => *t,
        }
    }

    /// The wire discriminant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Click { .. } => "click",
            Self::KeyPress { .. } => "key_press",
            Self::KeyRelease { .. } => "key_release",
        }
    }
}

/// Truncate to the microsecond resolution used on disk
pub fn quantize(d: Duration) -> Duration {
    Duration::from_micros(d.as_micros().min(u64::MAX as u128) as u64)
}

/// Seconds (as written on disk) to a duration.
/// Negative values clamp to zero; non-finite values are rejected.
pub fn duration_from_secs(secs: f64) -> std::result::Result<Duration, String> {
    if !secs.is_finite() {
        return Err(format!("invalid time value {}", secs));
    }
    if secs <= 0.0 {
        return Ok(Duration::ZERO);
    }
    let micros = (secs * 1_000_000.0).round();
    if micros >= u64::MAX as f64 {
        return Err(format!("time value {} out of range", secs));
    }
    Ok(Duration::from_micros(micros as u64))
}

mod seconds {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_f64(quantize(*d).as_micros() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        duration_from_secs(secs).map_err(serde::de::Error::custom)
    }
}

/// An ordered, immutable list of events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroSequence(Vec<Event>);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceSummary {
    pub moves: usize,
    pub clicks: usize,
    pub key_presses: usize,
    pub key_releases: usize,
}

impl MacroSequence {
    pub fn new(events: Vec<Event>) -> Self {
        Self(events)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.0.iter()
    }

    /// Timestamp of the last event
    pub fn duration(&self) -> Duration {
        self.0.last().map(Event::t).unwrap_or_default()
    }

    pub fn summary(&self) -> SequenceSummary {
        let mut s = SequenceSummary::default();
        for e in &self.0 {
            match e {
                Event::Move { .. } => s.moves += 1,
                Event::Click { .. } => s.clicks += 1,
                Event::KeyPress { .. } => s.key_presses += 1,
                Event::KeyRelease { .. } => s.key_releases += 1,
            }
        }
        s
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::malformed_event)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(rejected)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(rejected)
    }
}

fn rejected(e: serde_json::Error) -> Error {
    debug!(error = %e, line = e.line(), column = e.column(), "macro json rejected");
    Error::malformed_event(e)
}

impl From<Vec<Event>> for MacroSequence {
    fn from(events: Vec<Event>) -> Self {
        Self(events)
    }
}

impl FromIterator<Event> for MacroSequence {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MacroSequence {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sample() -> MacroSequence {
        MacroSequence::new(vec![
            Event::Move { x: 10, y: -4, t: ms(0) },
            Event::Click { x: 10, y: -4, button: MouseButton::Left, pressed: true, t: ms(120) },
            Event::Click { x: 10, y: -4, button: MouseButton::Other(4), pressed: false, t: ms(120) },
            Event::KeyPress { key: NamedKey::Shift.into(), t: ms(300) },
            Event::KeyPress { key: KeyToken::literal('A'), t: Duration::from_micros(300_001) },
            Event::KeyRelease { key: KeyToken::literal('A'), t: ms(450) },
            Event::KeyRelease { key: NamedKey::Shift.into(), t: Duration::from_secs(3600) },
        ])
    }

    #[test]
    fn sequence_survives_json() {
        let seq = sample();
        let json = seq.to_json().unwrap();
        assert_eq!(MacroSequence::from_json(&json).unwrap(), seq);
    }

    #[test]
    fn wire_format_is_explicit() {
        let e = Event::KeyPress { key: NamedKey::Ctrl.into(), t: ms(250) };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v, serde_json::json!({"type": "key_press", "key": "Key.ctrl", "t": 0.25}));

        let c = Event::Click { x: 1, y: 2, button: MouseButton::Right, pressed: false, t: ms(0) };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "click");
        assert_eq!(v["button"], "right");
        assert_eq!(v["pressed"], false);
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = MacroSequence::from_json(r#"[{"type":"click","x":1,"y":2,"pressed":true,"t":0.1}]"#)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedEvent);

        let err = MacroSequence::from_json(r#"[{"type":"move","x":1,"y":2}]"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedEvent);
    }

    #[test]
    fn unknown_discriminant_and_button_are_malformed() {
        let err = MacroSequence::from_json(r#"[{"type":"scroll","x":1,"y":2,"t":0.1}]"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedEvent);

        let err = MacroSequence::from_json(
            r#"[{"type":"click","x":1,"y":2,"button":"Button.left","pressed":true,"t":0.1}]"#,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedEvent);
    }

    #[test]
    fn negative_time_clamps_to_zero() {
        let seq = MacroSequence::from_json(r#"[{"type":"move","x":1,"y":2,"t":-0.5}]"#).unwrap();
        assert_eq!(seq.events()[0].t(), Duration::ZERO);
    }

    #[test]
    fn unknown_tokens_become_literals() {
        assert_eq!(KeyToken::from_wire("Key.shift"), KeyToken::Named(NamedKey::Shift));
        assert_eq!(KeyToken::from_wire("Key.hyper"), KeyToken::Literal("Key.hyper".into()));
        assert_eq!(KeyToken::from_wire("shift"), KeyToken::Literal("shift".into()));
        assert_eq!(KeyToken::from_wire("é"), KeyToken::literal('é'));
    }

    #[test]
    fn chord_parts_accept_aliases() {
        assert_eq!(KeyToken::from_chord_part("Control"), KeyToken::Named(NamedKey::Ctrl));
        assert_eq!(KeyToken::from_chord_part(" escape "), KeyToken::Named(NamedKey::Esc));
        assert_eq!(KeyToken::from_chord_part("S"), KeyToken::literal('s'));
    }

    #[test]
    fn plus_key_is_spelled_out_in_chords() {
        let plus = KeyToken::literal('+');
        assert_eq!(plus.to_chord_part(), "plus");
        assert_eq!(KeyToken::from_chord_part("Plus"), plus);
        assert_eq!(KeyToken::Named(NamedKey::Ctrl).to_chord_part(), "ctrl");
    }

    #[test]
    fn literals_that_look_named_keep_their_identity() {
        let tricky = ["Key.esc", "\\Key.esc", "\\x", "\\"];
        for text in tricky {
            let key = KeyToken::Literal(text.into());
            assert_eq!(KeyToken::from_wire(&key.to_wire()), key, "{text}");
        }
        assert_eq!(KeyToken::Literal("Key.esc".into()).to_wire(), "\\Key.esc");
        assert_eq!(KeyToken::literal('\\').to_wire(), "\\");
        assert_eq!(KeyToken::from_wire("\\"), KeyToken::literal('\\'));

        let seq = MacroSequence::new(vec![Event::KeyPress { key: KeyToken::Literal("Key.esc".into()), t: ms(0) }]);
        assert_eq!(MacroSequence::from_json(&seq.to_json().unwrap()).unwrap(), seq);
    }

    #[test]
    fn summary_counts_each_kind() {
        let s = sample().summary();
        assert_eq!(s, SequenceSummary { moves: 1, clicks: 2, key_presses: 2, key_releases: 2 });
        assert_eq!(sample().duration(), Duration::from_secs(3600));
    }

    #[test]
    fn from_raw_quantizes_time() {
        let e = Event::from_raw(RawInput::Motion { x: 3, y: 4 }, Duration::from_nanos(1_500_999));
        assert_eq!(e, Event::Move { x: 3, y: 4, t: Duration::from_micros(1_500) });
    }
}
