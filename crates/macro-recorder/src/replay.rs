//! Macro replay
//!
//! Reproduces the gaps between events (not absolute wall-clock alignment)
//! and injects each event through an [`InputSink`]. Keys pressed by a replay
//! are always released before it returns, whether it finished, hit
//! injection errors, or was cancelled.

use crossbeam_channel::Sender;
use macro_core::{Error, Event, InputSink, KeyToken, MacroSequence, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Cooperative stop signal that also wakes a sleeping replay
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cv) = &*self.inner;
        *lock.lock() = true;
        cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `duration` unless cancelled first. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let (lock, cv) = &*self.inner;
        let mut cancelled = lock.lock();
        while !*cancelled {
            if cv.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Where the replay waits between events
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration, cancel: &CancelToken);
}

/// Real time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) {
        cancel.sleep(duration);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub moves: usize,
    pub clicks: usize,
    pub key_presses: usize,
    pub key_releases: usize,
    /// Key events that were redundant for the replay's held-key state
    pub skipped: usize,
    /// Events whose injection failed
    pub failed: usize,
    /// Keys still held at the end and released by cleanup
    pub released_on_exit: usize,
    pub cancelled: bool,
}

impl ReplayReport {
    pub fn dispatched(&self) -> usize {
        self.moves + self.clicks + self.key_presses + self.key_releases
    }

    fn count(&mut self, event: &Event) {
        match event {
            Event::Move { .. } => self.moves += 1,
            Event::Click { .. } => self.clicks += 1,
            Event::KeyPress { .. } => self.key_presses += 1,
            Event::KeyRelease { .. } => self.key_releases += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayPhase {
    Started { events: usize },
    Finished(ReplayReport),
}

/// Replays macros, one at a time
#[derive(Clone)]
pub struct Replayer {
    speed: f64,
    clock: Arc<dyn Clock>,
    active: Arc<Mutex<Option<CancelToken>>>,
    notify: Option<Sender<ReplayPhase>>,
}

struct ActiveGuard {
    active: Arc<Mutex<Option<CancelToken>>>,
    token: CancelToken,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *self.active.lock() = None;
    }
}

impl Replayer {
    pub fn new() -> Self {
        Self {
            speed: 1.0,
            clock: Arc::new(SystemClock),
            active: Arc::new(Mutex::new(None)),
            notify: None,
        }
    }

    /// Playback speed (1.0 = as recorded, 2.0 = twice as fast)
    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() { speed.clamp(0.1, 10.0) } else { 1.0 };
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Receive start/finish notifications
    pub fn notify(mut self, tx: Sender<ReplayPhase>) -> Self {
        self.notify = Some(tx);
        self
    }

    pub fn is_playing(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Ask the running replay to stop. Returns false if nothing was running.
    pub fn cancel(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn begin(&self) -> Result<ActiveGuard> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(Error::already_replaying());
        }
        let token = CancelToken::new();
        *active = Some(token.clone());
        Ok(ActiveGuard {
            active: self.active.clone(),
            token,
        })
    }

    /// Replay on the calling thread
    pub fn play(&self, sequence: &MacroSequence, sink: &dyn InputSink) -> Result<ReplayReport> {
        let guard = self.begin()?;
        Ok(self.run(sequence, sink, &guard.token))
    }

    /// Replay on a background thread. `on_finish` runs once the replay is over
    /// and the replayer accepts new work again.
    pub fn spawn<F>(
        &self,
        sequence: MacroSequence,
        sink: Arc<dyn InputSink>,
        on_finish: F,
    ) -> Result<ReplayHandle>
    where
        F: FnOnce(ReplayReport) + Send + 'static,
    {
        let guard = self.begin()?;
        let cancel = guard.token.clone();
        let this = self.clone();

        let thread = thread::Builder::new()
            .name("macro-replay".into())
            .spawn(move || {
                let report = catch_unwind(AssertUnwindSafe(|| {
                    this.run(&sequence, sink.as_ref(), &guard.token)
                }))
                .unwrap_or_else(|_| {
                    error!("replay panicked");
                    ReplayReport {
                        failed: 1,
                        ..Default::default()
                    }
                });
                drop(guard);
                on_finish(report.clone());
                report
            })?;

        Ok(ReplayHandle { cancel, thread })
    }

    fn scaled(&self, delay: Duration) -> Duration {
        if self.speed == 1.0 {
            delay
        } else {
            delay.div_f64(self.speed)
        }
    }

    fn send(&self, phase: ReplayPhase) {
        if let Some(tx) = &self.notify {
            let _ = tx.send(phase);
        }
    }

    fn run(&self, sequence: &MacroSequence, sink: &dyn InputSink, cancel: &CancelToken) -> ReplayReport {
        let mut report = ReplayReport::default();
        let mut held: BTreeSet<KeyToken> = BTreeSet::new();
        let mut last_t = Duration::ZERO;

        info!(events = sequence.len(), speed = self.speed, "replay started");
        self.send(ReplayPhase::Started {
            events: sequence.len(),
        });

        for event in sequence {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            // Out-of-order timestamps mean no wait, never an error.
            let delay = event.t().saturating_sub(last_t);
            if !delay.is_zero() {
                self.clock.sleep(self.scaled(delay), cancel);
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
            }
            last_t = event.t();

            match dispatch(event, sink, &mut held) {
                Ok(true) => report.count(event),
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(kind = event.kind(), error = %e, "skipping event");
                    report.failed += 1;
                }
            }
        }

        for key in std::mem::take(&mut held) {
            match release(sink, &key) {
                Ok(()) => report.released_on_exit += 1,
                Err(e) => warn!(%key, error = %e, "could not release key"),
            }
        }

        info!(
            dispatched = report.dispatched(),
            failed = report.failed,
            released = report.released_on_exit,
            cancelled = report.cancelled,
            "replay finished"
        );
        self.send(ReplayPhase::Finished(report.clone()));
        report
    }
}

impl Default for Replayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Inject one event. `Ok(false)` means it was redundant and skipped.
fn dispatch(event: &Event, sink: &dyn InputSink, held: &mut BTreeSet<KeyToken>) -> Result<bool> {
    match event {
        Event::Move { x, y, .. } => sink.move_to(*x, *y)?,
        Event::Click { x, y, button, pressed, .. } => {
            sink.move_to(*x, *y)?;
            sink.button(*button, *pressed)?;
        }
        Event::KeyPress { key, .. } => {
            if held.contains(key) {
                debug!(%key, "already held");
                return Ok(false);
            }
            press(sink, key)?;
            held.insert(key.clone());
        }
        Event::KeyRelease { key, .. } => {
            if !held.contains(key) {
                debug!(%key, "not held");
                return Ok(false);
            }
            release(sink, key)?;
            held.remove(key);
        }
    }
    Ok(true)
}

fn press(sink: &dyn InputSink, key: &KeyToken) -> Result<()> {
    match key {
        KeyToken::Named(k) => sink.press_named(*k),
        KeyToken::Literal(s) => sink.press_literal(s),
    }
}

fn release(sink: &dyn InputSink, key: &KeyToken) -> Result<()> {
    match key {
        KeyToken::Named(k) => sink.release_named(*k),
        KeyToken::Literal(s) => sink.release_literal(s),
    }
}

/// A replay running in the background
pub struct ReplayHandle {
    cancel: CancelToken,
    thread: thread::JoinHandle<ReplayReport>,
}

impl ReplayHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> ReplayReport {
        self.thread.join().unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use macro_core::{MouseButton, NamedKey};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Action {
        Move(i32, i32),
        Button(MouseButton, bool),
        PressNamed(NamedKey),
        ReleaseNamed(NamedKey),
        PressLiteral(String),
        ReleaseLiteral(String),
    }

    /// Records every injected action; can be told to fail on one literal
    #[derive(Default)]
    pub struct RecordingSink {
        pub actions: Mutex<Vec<Action>>,
        pub fail_literal: Option<String>,
    }

    impl RecordingSink {
        pub fn actions(&self) -> Vec<Action> {
            self.actions.lock().clone()
        }

        fn push(&self, a: Action) -> Result<()> {
            self.actions.lock().push(a);
            Ok(())
        }

        fn check(&self, text: &str) -> Result<()> {
            if self.fail_literal.as_deref() == Some(text) {
                return Err(Error::injection_failed("key", "test failure"));
            }
            Ok(())
        }
    }

    impl InputSink for RecordingSink {
        fn move_to(&self, x: i32, y: i32) -> Result<()> {
            self.push(Action::Move(x, y))
        }
        fn button(&self, button: MouseButton, pressed: bool) -> Result<()> {
            self.push(Action::Button(button, pressed))
        }
        fn press_named(&self, key: NamedKey) -> Result<()> {
            self.push(Action::PressNamed(key))
        }
        fn release_named(&self, key: NamedKey) -> Result<()> {
            self.push(Action::ReleaseNamed(key))
        }
        fn press_literal(&self, text: &str) -> Result<()> {
            self.check(text)?;
            self.push(Action::PressLiteral(text.into()))
        }
        fn release_literal(&self, text: &str) -> Result<()> {
            self.check(text)?;
            self.push(Action::ReleaseLiteral(text.into()))
        }
    }

    /// Records requested sleeps without waiting
    #[derive(Default)]
    pub struct RecordingClock {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    impl Clock for RecordingClock {
        fn sleep(&self, duration: Duration, _cancel: &CancelToken) {
            self.sleeps.lock().push(duration);
        }
    }
}
