//! Capture session: turns raw input into a timestamped macro
//!
//! The session itself is plain state. Listeners deliver [`RawEvent`]s to
//! the engine thread, which hands them to [`CaptureSession::handle`] in
//! arrival order.

use macro_core::{Error, Event, MacroSequence, RawInput, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Which input channels a recording listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingOptions {
    pub mouse: bool,
    pub keyboard: bool,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            mouse: true,
            keyboard: true,
        }
    }
}

impl TrackingOptions {
    pub fn any(&self) -> bool {
        self.mouse || self.keyboard
    }
}

/// Screen rectangle in absolute coordinates; edges are inside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Edges are inclusive. Computed in i64 so zones near the coordinate
    /// limits cannot overflow.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let (left, top) = (i64::from(self.x), i64::from(self.y));
        x >= left && x <= left + i64::from(self.width) && y >= top && y <= top + i64::from(self.height)
    }
}

/// Raw input stamped with its arrival time
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub input: RawInput,
    pub at: Instant,
}

impl RawEvent {
    pub fn now(input: RawInput) -> Self {
        Self {
            input,
            at: Instant::now(),
        }
    }
}

pub struct CaptureSession {
    start: Instant,
    options: TrackingOptions,
    exclusion: Option<Rect>,
    events: Vec<Event>,
    last_t: Duration,
}

impl CaptureSession {
    /// Start a session now. Fails when no input channel is enabled.
    pub fn start(options: TrackingOptions, exclusion: Option<Rect>) -> Result<Self> {
        Self::start_at(Instant::now(), options, exclusion)
    }

    pub fn start_at(start: Instant, options: TrackingOptions, exclusion: Option<Rect>) -> Result<Self> {
        if !options.any() {
            return Err(Error::no_tracking_enabled());
        }
        info!(mouse = options.mouse, keyboard = options.keyboard, "recording started");
        Ok(Self {
            start,
            options,
            exclusion,
            events: Vec::new(),
            last_t: Duration::ZERO,
        })
    }

    pub fn options(&self) -> TrackingOptions {
        self.options
    }

    /// Move the self-filter zone, e.g. when the control surface moved
    pub fn set_exclusion(&mut self, exclusion: Option<Rect>) {
        self.exclusion = exclusion;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append the event if its channel is tracked. Returns whether it was kept.
    pub fn handle(&mut self, raw: RawEvent) -> bool {
        let keep = match &raw.input {
            RawInput::Motion { .. } => self.options.mouse,
            RawInput::Button { x, y, .. } => {
                if !self.options.mouse {
                    false
                } else if self.exclusion.is_some_and(|r| r.contains(*x, *y)) {
                    debug!(x, y, "click on record control ignored");
                    false
                } else {
                    true
                }
            }
            RawInput::KeyDown(_) | RawInput::KeyUp(_) => self.options.keyboard,
        };
        if !keep {
            return false;
        }

        // Arrival order is authoritative; never let t run backwards.
        let t = raw.at.saturating_duration_since(self.start).max(self.last_t);
        let event = Event::from_raw(raw.input, t);
        self.last_t = event.t();
        self.events.push(event);
        true
    }

    /// End the session. An empty result is a valid (empty) macro.
    pub fn finish(self) -> MacroSequence {
        info!(events = self.events.len(), "recording stopped");
        MacroSequence::new(self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macro_core::{ErrorCode, KeyToken, MouseButton};

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    fn click(x: i32, y: i32) -> RawInput {
        RawInput::Button { x, y, button: MouseButton::Left, pressed: true }
    }

    #[test]
    fn requires_a_tracking_option() {
        let none = TrackingOptions { mouse: false, keyboard: false };
        let err = CaptureSession::start(none, None).err().unwrap();
        assert_eq!(err.code, ErrorCode::NoTrackingEnabled);
    }

    #[test]
    fn timestamps_are_relative_to_start() {
        let start = Instant::now();
        let mut s = CaptureSession::start_at(start, TrackingOptions::default(), None).unwrap();
        s.handle(RawEvent { input: RawInput::Motion { x: 1, y: 2 }, at: at(start, 40) });
        s.handle(RawEvent { input: RawInput::KeyDown(KeyToken::literal('a')), at: at(start, 90) });

        let seq = s.finish();
        assert_eq!(seq.events()[0], Event::Move { x: 1, y: 2, t: Duration::from_millis(40) });
        assert_eq!(seq.events()[1].t(), Duration::from_millis(90));
    }

    #[test]
    fn late_arrival_never_goes_backwards() {
        let start = Instant::now();
        let mut s = CaptureSession::start_at(start, TrackingOptions::default(), None).unwrap();
        s.handle(RawEvent { input: RawInput::Motion { x: 1, y: 1 }, at: at(start, 50) });
        s.handle(RawEvent { input: RawInput::Motion { x: 2, y: 2 }, at: at(start, 30) });
        let seq = s.finish();
        assert_eq!(seq.events()[1].t(), Duration::from_millis(50));
    }

    #[test]
    fn clicks_on_record_control_are_dropped() {
        let start = Instant::now();
        let control = Rect::new(100, 100, 50, 20);
        let mut s = CaptureSession::start_at(start, TrackingOptions::default(), Some(control)).unwrap();

        assert!(!s.handle(RawEvent { input: click(120, 110), at: at(start, 10) }));
        assert!(!s.handle(RawEvent { input: click(150, 120), at: at(start, 11) }));
        assert!(s.handle(RawEvent { input: click(151, 110), at: at(start, 12) }));

        let seq = s.finish();
        assert_eq!(seq.len(), 1);
        assert!(matches!(seq.events()[0], Event::Click { x: 151, .. }));
    }

    #[test]
    fn zone_at_coordinate_limit_does_not_overflow() {
        let zone = Rect::new(i32::MAX - 5, i32::MAX - 5, 100, 100);
        assert!(zone.contains(i32::MAX, i32::MAX));
        assert!(!zone.contains(0, 0));

        let negative = Rect::new(i32::MIN, i32::MIN, i32::MAX, 10);
        assert!(negative.contains(-1, i32::MIN + 10));
        assert!(!negative.contains(0, i32::MIN));
    }

    #[test]
    fn untracked_channels_are_ignored() {
        let start = Instant::now();
        let keys_only = TrackingOptions { mouse: false, keyboard: true };
        let mut s = CaptureSession::start_at(start, keys_only, None).unwrap();
        assert!(!s.handle(RawEvent { input: RawInput::Motion { x: 0, y: 0 }, at: start }));
        assert!(!s.handle(RawEvent { input: click(5, 5), at: start }));
        assert!(s.handle(RawEvent { input: RawInput::KeyUp(KeyToken::literal('q')), at: start }));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn empty_session_yields_empty_macro() {
        let s = CaptureSession::start(TrackingOptions::default(), None).unwrap();
        assert!(s.finish().is_empty());
    }
}
