//! Global shortcut matching
//!
//! Tracks which keys are held and fires when the held set is exactly a
//! configured chord, regardless of press order.

use macro_core::{Error, KeyToken, NamedKey, Result};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Text shown by a settings surface while it waits for a combination.
/// A shortcut still equal to one of these was never set.
pub const PLACEHOLDERS: &[&str] = &["waiting for key...", "press key combination..."];

/// Unordered set of keys that must all be held at once
#[derive(Debug, Clone)]
pub struct Chord {
    /// First-press order, for display only
    order: Vec<KeyToken>,
    keys: BTreeSet<KeyToken>,
}

impl Chord {
    /// Build from tokens in display order; duplicates are dropped
    pub fn new(tokens: impl IntoIterator<Item = KeyToken>) -> Self {
        let mut order = Vec::new();
        let mut keys = BTreeSet::new();
        for t in tokens {
            if keys.insert(t.clone()) {
                order.push(t);
            }
        }
        Self { order, keys }
    }

    /// Parse `ctrl+s` style text. Fails on empty text or placeholders.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || is_placeholder(trimmed) {
            return Err(Error::shortcut("Please set all shortcut keys!"));
        }
        let chord = Self::new(
            trimmed
                .split('+')
                .filter(|p| !p.trim().is_empty())
                .map(KeyToken::from_chord_part),
        );
        if chord.is_empty() {
            return Err(Error::shortcut(format!("Shortcut '{}' has no keys", s)));
        }
        Ok(chord)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &BTreeSet<KeyToken> {
        &self.keys
    }

    pub fn matches(&self, held: &BTreeSet<KeyToken>) -> bool {
        !self.keys.is_empty() && self.keys == *held
    }
}

impl PartialEq for Chord {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for Chord {}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.order.iter().map(KeyToken::to_chord_part).collect();
        f.write_str(&parts.join("+"))
    }
}

fn is_placeholder(s: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| s.eq_ignore_ascii_case(p))
}

/// The validated pair of global shortcuts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcuts {
    pub record: Chord,
    pub replay: Chord,
}

impl Shortcuts {
    /// Check a record/replay pair before it is saved
    pub fn validate(record: &str, replay: &str) -> Result<Self> {
        let record = Chord::parse(record)?;
        let replay = Chord::parse(replay)?;
        if record == replay {
            return Err(Error::shortcut("Shortcut keys cannot be the same!"));
        }
        Ok(Self { record, replay })
    }
}

/// `ctrl+s` to record, `ctrl+r` to replay
impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            record: Chord::new([NamedKey::Ctrl.into(), KeyToken::literal('s')]),
            replay: Chord::new([NamedKey::Ctrl.into(), KeyToken::literal('r')]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeySignal {
    RecordToggle,
    Replay,
}

pub struct HotkeyMatcher {
    shortcuts: Shortcuts,
    held: BTreeSet<KeyToken>,
    suppressed: bool,
}

impl HotkeyMatcher {
    pub fn new(shortcuts: Shortcuts) -> Self {
        Self {
            shortcuts,
            held: BTreeSet::new(),
            suppressed: false,
        }
    }

    pub fn shortcuts(&self) -> &Shortcuts {
        &self.shortcuts
    }

    pub fn set_shortcuts(&mut self, shortcuts: Shortcuts) {
        self.shortcuts = shortcuts;
    }

    /// While suppressed (a chord is being defined) nothing fires
    pub fn set_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn held(&self) -> &BTreeSet<KeyToken> {
        &self.held
    }

    /// Returns a signal when the held set now equals a chord.
    /// A key that is already held (auto-repeat) never fires again.
    pub fn on_key_down(&mut self, key: &KeyToken) -> Option<HotkeySignal> {
        if !self.held.insert(key.clone()) {
            return None;
        }
        if self.suppressed {
            return None;
        }
        let signal = if self.shortcuts.record.matches(&self.held) {
            Some(HotkeySignal::RecordToggle)
        } else if self.shortcuts.replay.matches(&self.held) {
            Some(HotkeySignal::Replay)
        } else {
            None
        };
        if let Some(s) = signal {
            debug!(?s, held = ?self.held, "hotkey matched");
        }
        signal
    }

    pub fn on_key_up(&mut self, key: &KeyToken) {
        self.held.remove(key);
    }

    /// Forget held keys, e.g. after the listener restarted
    pub fn reset(&mut self) {
        self.held.clear();
    }
}

/// Interactive chord definition: collects pressed keys until the first release
#[derive(Debug, Default)]
pub struct ChordCapture {
    pressed: Vec<KeyToken>,
    done: bool,
}

impl ChordCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_key_down(&mut self, key: &KeyToken) {
        if !self.done && !self.pressed.contains(key) {
            self.pressed.push(key.clone());
        }
    }

    /// The first key-up ends the capture and yields the chord
    pub fn on_key_up(&mut self, _key: &KeyToken) -> Option<Chord> {
        if self.done || self.pressed.is_empty() {
            return None;
        }
        self.done = true;
        Some(Chord::new(self.pressed.iter().cloned()))
    }

    /// Combination so far, in press order
    pub fn progress(&self) -> String {
        let parts: Vec<String> = self.pressed.iter().map(KeyToken::to_chord_part).collect();
        parts.join("+")
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
