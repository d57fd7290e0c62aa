//! The recorder engine
//!
//! One thread owns every piece of session state: the hotkey matcher, the
//! capture session, the last recording and the settings. Listeners, replay
//! threads and callers never touch that state; they post [`Message`]s and
//! the engine applies them strictly in arrival order.

use crate::hotkey::{Chord, ChordCapture, HotkeyMatcher, HotkeySignal, Shortcuts};
use crate::recorder::{CaptureSession, RawEvent, Rect, TrackingOptions};
use crate::replay::{ReplayHandle, ReplayReport, Replayer};
use crate::settings::Settings;
use crate::status::{Status, StatusBus};
use crate::storage::MacroStorage;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use macro_core::{Error, ErrorCode, InputSink, MacroSequence, RawInput, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Idle, Recording and Replaying are mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Replaying,
}

/// Point-in-time view of the engine, taken on the engine thread
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    pub state: SessionState,
    /// Favorite that the replay hotkey plays, until the next recording
    pub active_favorite: Option<String>,
    /// Event count of the recording held in memory, if any
    pub last_recorded: Option<usize>,
    pub settings: Settings,
}

type Reply<T> = Sender<Result<T>>;

enum Command {
    StartRecording(Reply<()>),
    StopRecording(Reply<MacroSequence>),
    ToggleRecording(Reply<SessionState>),
    ReplayCurrent(Reply<()>),
    ReplayFavorite(String, Reply<()>),
    AddFavorite(String, Reply<()>),
    SetTracking(TrackingOptions, Reply<()>),
    SetShortcuts {
        record: String,
        replay: String,
        reply: Reply<Shortcuts>,
    },
    ResetShortcuts(Reply<Shortcuts>),
    SetExclusion(Option<Rect>),
    CaptureChord(u64, Reply<Chord>),
    /// Ends the capture with this id; a newer capture is left alone
    CancelCapture(u64),
    CancelReplay(Reply<bool>),
    Snapshot(Reply<EngineSnapshot>),
}

enum Message {
    Input(RawEvent),
    Command(Command),
    ReplayFinished(ReplayReport),
    ListenerFailed(String),
    Shutdown,
}

// ============================================================================
// Builder
// ============================================================================

pub struct Engine {
    storage: MacroStorage,
    settings_path: PathBuf,
    sink: Arc<dyn InputSink>,
    replayer: Replayer,
    exclusion: Option<Rect>,
}

impl Engine {
    pub fn new(storage: MacroStorage, settings_path: impl Into<PathBuf>, sink: Arc<dyn InputSink>) -> Self {
        Self {
            storage,
            settings_path: settings_path.into(),
            sink,
            replayer: Replayer::new(),
            exclusion: None,
        }
    }

    pub fn replayer(mut self, replayer: Replayer) -> Self {
        self.replayer = replayer;
        self
    }

    /// Screen area of the record control; clicks there are never recorded
    pub fn exclusion(mut self, zone: Option<Rect>) -> Self {
        self.exclusion = zone;
        self
    }

    /// Load settings and start the engine thread
    pub fn spawn(self) -> Result<EngineHandle> {
        let settings = Settings::load(&self.settings_path);
        let matcher = HotkeyMatcher::new(settings.shortcuts());
        let status = StatusBus::new(ready_status(matcher.shortcuts()));
        let state = Arc::new(Mutex::new(SessionState::Idle));
        let (tx, rx) = unbounded();

        let worker = Worker {
            storage: self.storage,
            settings,
            settings_path: self.settings_path,
            matcher,
            session: None,
            exclusion: self.exclusion,
            replayer: self.replayer,
            replay: None,
            sink: self.sink,
            last_recorded: None,
            active_favorite: None,
            capture: None,
            state: state.clone(),
            status: status.clone(),
            tx: tx.clone(),
        };

        let thread = thread::Builder::new()
            .name("macro-engine".into())
            .spawn(move || worker.run(rx))?;

        Ok(EngineHandle {
            tx,
            state,
            status,
            captures: Arc::new(AtomicU64::new(0)),
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }
}

fn ready_status(shortcuts: &Shortcuts) -> Status {
    Status::Ready {
        record: shortcuts.record.to_string(),
        replay: shortcuts.replay.to_string(),
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cheap to clone; every clone talks to the same engine
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<Message>,
    state: Arc<Mutex<SessionState>>,
    status: StatusBus,
    captures: Arc<AtomicU64>,
    thread: Arc<Mutex<Option<thread::JoinHandle<()>>>>,
}

impl EngineHandle {
    fn send(&self, msg: Message) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::engine_stopped())
    }

    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = bounded(1);
        self.send(Message::Command(command(tx)))?;
        rx.recv().map_err(|_| Error::engine_stopped())?
    }

    pub fn start_recording(&self) -> Result<()> {
        self.request(Command::StartRecording)
    }

    /// Stops, stores and returns the recording
    pub fn stop_recording(&self) -> Result<MacroSequence> {
        self.request(Command::StopRecording)
    }

    /// Same as the record hotkey. Returns the state entered.
    pub fn toggle_recording(&self) -> Result<SessionState> {
        self.request(Command::ToggleRecording)
    }

    /// Same as the replay hotkey: the active favorite, else the last recording
    pub fn replay_current(&self) -> Result<()> {
        self.request(Command::ReplayCurrent)
    }

    /// Replay a favorite and make it the active one
    pub fn replay_favorite(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.request(|reply| Command::ReplayFavorite(name, reply))
    }

    /// Save the last recording as a favorite
    pub fn add_favorite(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.request(|reply| Command::AddFavorite(name, reply))
    }

    pub fn set_tracking(&self, options: TrackingOptions) -> Result<()> {
        self.request(|reply| Command::SetTracking(options, reply))
    }

    pub fn set_shortcuts(&self, record: &str, replay: &str) -> Result<Shortcuts> {
        let (record, replay) = (record.to_string(), replay.to_string());
        self.request(|reply| Command::SetShortcuts { record, replay, reply })
    }

    pub fn reset_shortcuts(&self) -> Result<Shortcuts> {
        self.request(Command::ResetShortcuts)
    }

    pub fn set_exclusion(&self, zone: Option<Rect>) -> Result<()> {
        self.send(Message::Command(Command::SetExclusion(zone)))
    }

    /// Wait for the user to press a combination. Global hotkeys are off and
    /// no keys are recorded until the first key is released or `timeout` passes.
    pub fn capture_chord(&self, timeout: Duration) -> Result<Chord> {
        let id = self.next_capture_id();
        let (tx, rx) = bounded(1);
        self.send(Message::Command(Command::CaptureChord(id, tx)))?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.send(Message::Command(Command::CancelCapture(id)))?;
                // Either the chord that raced the timeout or the cancellation
                rx.recv().map_err(|_| Error::engine_stopped())?
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::engine_stopped()),
        }
    }

    fn next_capture_id(&self) -> u64 {
        self.captures.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns false if nothing was playing
    pub fn cancel_replay(&self) -> Result<bool> {
        self.request(Command::CancelReplay)
    }

    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        self.request(Command::Snapshot)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn status(&self) -> Status {
        self.status.current()
    }

    pub fn subscribe(&self) -> Receiver<Status> {
        self.status.subscribe()
    }

    /// Where listeners deliver raw input
    pub fn input(&self) -> InputFeed {
        InputFeed { tx: self.tx.clone() }
    }

    /// Stop the engine. A running replay is cancelled and an active
    /// recording is stored.
    pub fn shutdown(&self) -> Result<()> {
        let _ = self.tx.send(Message::Shutdown);
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            thread
                .join()
                .map_err(|_| Error::new(ErrorCode::EngineStopped, "engine thread panicked"))?;
        }
        Ok(())
    }
}

/// Sender side for global input listeners
#[derive(Clone)]
pub struct InputFeed {
    tx: Sender<Message>,
}

impl InputFeed {
    /// Returns false once the engine has stopped
    pub fn send(&self, event: RawEvent) -> bool {
        self.tx.send(Message::Input(event)).is_ok()
    }

    /// The listener died; any recording in progress is abandoned
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Message::ListenerFailed(reason.into()));
    }
}

// ============================================================================
// Engine thread
// ============================================================================

struct PendingCapture {
    id: u64,
    capture: ChordCapture,
    reply: Reply<Chord>,
}

struct Worker {
    storage: MacroStorage,
    settings: Settings,
    settings_path: PathBuf,
    matcher: HotkeyMatcher,
    session: Option<CaptureSession>,
    exclusion: Option<Rect>,
    replayer: Replayer,
    replay: Option<ReplayHandle>,
    sink: Arc<dyn InputSink>,
    last_recorded: Option<MacroSequence>,
    active_favorite: Option<String>,
    capture: Option<PendingCapture>,
    state: Arc<Mutex<SessionState>>,
    status: StatusBus,
    tx: Sender<Message>,
}

impl Worker {
    fn run(mut self, rx: Receiver<Message>) {
        info!(dir = %self.storage.path().display(), "engine started");
        while let Ok(msg) = rx.recv() {
            match msg {
                Message::Input(event) => self.on_input(event),
                Message::Command(command) => self.on_command(command),
                Message::ReplayFinished(report) => self.on_replay_finished(report),
                Message::ListenerFailed(reason) => self.on_listener_failed(&reason),
                Message::Shutdown => {
                    self.shutdown();
                    break;
                }
            }
        }
        info!("engine stopped");
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    fn refresh_status(&self) {
        let status = match self.state() {
            SessionState::Idle => ready_status(self.matcher.shortcuts()),
            SessionState::Recording => Status::Recording {
                stop: self.matcher.shortcuts().record.to_string(),
            },
            SessionState::Replaying => Status::Playing {
                favorite: self.active_favorite.clone(),
            },
        };
        self.status.publish(status);
    }

    fn report_failure(&self, error: &Error) {
        self.status.publish(Status::Failed {
            message: error.code.user_message().to_string(),
        });
        self.refresh_status();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::StartRecording(reply) => {
                let _ = reply.send(self.start_recording());
            }
            Command::StopRecording(reply) => {
                let _ = reply.send(self.stop_recording());
            }
            Command::ToggleRecording(reply) => {
                let _ = reply.send(self.toggle_recording());
            }
            Command::ReplayCurrent(reply) => {
                let _ = reply.send(self.replay_current());
            }
            Command::ReplayFavorite(name, reply) => {
                let _ = reply.send(self.replay_favorite(&name));
            }
            Command::AddFavorite(name, reply) => {
                let _ = reply.send(self.add_favorite(&name));
            }
            Command::SetTracking(options, reply) => {
                let mut next = self.settings.clone();
                next.set_tracking(options);
                let _ = reply.send(self.commit_settings(next));
            }
            Command::SetShortcuts { record, replay, reply } => {
                let _ = reply.send(self.set_shortcuts(&record, &replay));
            }
            Command::ResetShortcuts(reply) => {
                let _ = reply.send(self.reset_shortcuts());
            }
            Command::SetExclusion(zone) => {
                self.exclusion = zone;
                if let Some(session) = &mut self.session {
                    session.set_exclusion(zone);
                }
            }
            Command::CaptureChord(id, reply) => self.begin_capture(id, reply),
            Command::CancelCapture(id) => {
                if self.capture.as_ref().is_some_and(|c| c.id == id) {
                    self.end_capture(Err(Error::capture_cancelled()));
                }
            }
            Command::CancelReplay(reply) => {
                let _ = reply.send(Ok(self.replayer.cancel()));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Ok(EngineSnapshot {
                    state: self.state(),
                    active_favorite: self.active_favorite.clone(),
                    last_recorded: self.last_recorded.as_ref().map(MacroSequence::len),
                    settings: self.settings.clone(),
                }));
            }
        }
    }

    fn on_input(&mut self, event: RawEvent) {
        match &event.input {
            RawInput::KeyDown(key) => {
                let repeat = self.matcher.held().contains(key);
                let signal = self.matcher.on_key_down(key);

                if let Some(pending) = &mut self.capture {
                    pending.capture.on_key_down(key);
                    self.status.publish(Status::CapturingChord {
                        progress: pending.capture.progress(),
                    });
                    return;
                }
                if let Some(signal) = signal {
                    self.on_hotkey(signal);
                    return;
                }
                // Auto-repeat is one press
                if repeat {
                    return;
                }
            }
            RawInput::KeyUp(key) => {
                let was_held = self.matcher.held().contains(key);
                self.matcher.on_key_up(key);

                if let Some(pending) = &mut self.capture {
                    if let Some(chord) = pending.capture.on_key_up(key) {
                        self.end_capture(Ok(chord));
                    }
                    return;
                }
                if !was_held {
                    return;
                }
            }
            RawInput::Motion { .. } | RawInput::Button { .. } => {}
        }

        if let Some(session) = &mut self.session {
            session.handle(event);
        }
    }

    fn on_hotkey(&mut self, signal: HotkeySignal) {
        let result = match signal {
            HotkeySignal::RecordToggle => self.toggle_recording().map(|_| ()),
            HotkeySignal::Replay => self.replay_current(),
        };
        if let Err(e) = result {
            warn!(?signal, error = %e, "hotkey action rejected");
            self.report_failure(&e);
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state() {
            SessionState::Idle => Ok(()),
            SessionState::Recording => Err(Error::already_recording()),
            SessionState::Replaying => Err(Error::already_replaying()),
        }
    }

    fn start_recording(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.session = Some(CaptureSession::start(self.settings.tracking(), self.exclusion)?);
        self.active_favorite = None;
        self.set_state(SessionState::Recording);
        self.refresh_status();
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<MacroSequence> {
        let session = self.session.take().ok_or_else(Error::not_recording)?;
        let sequence = session.finish();
        self.last_recorded = Some(sequence.clone());
        self.set_state(SessionState::Idle);
        self.refresh_status();
        self.storage.save_current(&sequence)?;
        Ok(sequence)
    }

    fn toggle_recording(&mut self) -> Result<SessionState> {
        if self.state() == SessionState::Recording {
            self.stop_recording()?;
            Ok(SessionState::Idle)
        } else {
            self.start_recording()?;
            Ok(SessionState::Recording)
        }
    }

    fn replay_current(&mut self) -> Result<()> {
        self.ensure_idle()?;
        if let Some(name) = self.active_favorite.clone() {
            match self.storage.load_favorite(&name) {
                Ok(sequence) => return self.start_replay(sequence, Some(name)),
                Err(e) => {
                    warn!(name, error = %e, "active favorite unavailable, using the last recording");
                    self.active_favorite = None;
                }
            }
        }
        let sequence = match &self.last_recorded {
            Some(sequence) => sequence.clone(),
            None => self.storage.load_current()?,
        };
        self.start_replay(sequence, None)
    }

    fn replay_favorite(&mut self, name: &str) -> Result<()> {
        self.ensure_idle()?;
        let sequence = self.storage.load_favorite(name)?;
        self.start_replay(sequence, Some(name.trim().to_string()))
    }

    fn start_replay(&mut self, sequence: MacroSequence, favorite: Option<String>) -> Result<()> {
        if favorite.is_some() {
            self.active_favorite = favorite;
        }
        if sequence.is_empty() {
            info!("nothing to replay");
            return Ok(());
        }
        let tx = self.tx.clone();
        let handle = self.replayer.spawn(sequence, self.sink.clone(), move |report| {
            let _ = tx.send(Message::ReplayFinished(report));
        })?;
        self.replay = Some(handle);
        self.set_state(SessionState::Replaying);
        self.refresh_status();
        Ok(())
    }

    fn on_replay_finished(&mut self, report: ReplayReport) {
        if let Some(handle) = self.replay.take() {
            handle.join();
        }
        debug!(?report, "replay thread done");
        if self.state() == SessionState::Replaying {
            self.set_state(SessionState::Idle);
        }
        self.refresh_status();
    }

    fn add_favorite(&mut self, name: &str) -> Result<()> {
        let sequence = match &self.last_recorded {
            Some(sequence) => sequence.clone(),
            None if self.storage.has_current() => self.storage.load_current()?,
            None => return Err(Error::no_macro_recorded()),
        };
        self.storage.save_favorite(name, &sequence)
    }

    /// Persist first so memory and disk never disagree
    fn commit_settings(&mut self, next: Settings) -> Result<()> {
        next.save(&self.settings_path)?;
        self.settings = next;
        Ok(())
    }

    fn set_shortcuts(&mut self, record: &str, replay: &str) -> Result<Shortcuts> {
        let mut next = self.settings.clone();
        let shortcuts = next.set_shortcuts(record, replay)?;
        self.commit_settings(next)?;
        self.apply_shortcuts(shortcuts.clone());
        Ok(shortcuts)
    }

    fn reset_shortcuts(&mut self) -> Result<Shortcuts> {
        let mut next = self.settings.clone();
        next.reset_shortcuts();
        let shortcuts = next.shortcuts();
        self.commit_settings(next)?;
        self.apply_shortcuts(shortcuts.clone());
        Ok(shortcuts)
    }

    fn apply_shortcuts(&mut self, shortcuts: Shortcuts) {
        info!(record = %shortcuts.record, replay = %shortcuts.replay, "shortcuts changed");
        self.matcher.set_shortcuts(shortcuts);
        if self.capture.is_none() {
            self.refresh_status();
        }
    }

    fn begin_capture(&mut self, id: u64, reply: Reply<Chord>) {
        if let Some(previous) = self.capture.take() {
            let _ = previous.reply.send(Err(Error::capture_cancelled()));
        }
        debug!(id, "chord capture started");
        self.matcher.set_suppressed(true);
        self.capture = Some(PendingCapture {
            id,
            capture: ChordCapture::new(),
            reply,
        });
        self.status.publish(Status::CapturingChord {
            progress: String::new(),
        });
    }

    fn end_capture(&mut self, result: Result<Chord>) {
        let Some(PendingCapture { reply, .. }) = self.capture.take() else {
            return;
        };
        match &result {
            Ok(chord) => debug!(%chord, "chord captured"),
            Err(e) => debug!(error = %e, "chord capture ended"),
        }
        self.matcher.set_suppressed(false);
        self.refresh_status();
        let _ = reply.send(result);
    }

    fn on_listener_failed(&mut self, reason: &str) {
        let error = Error::listener_unavailable(reason);
        warn!(reason, "input listener failed");
        self.matcher.reset();
        self.end_capture(Err(error.clone()));
        if let Some(session) = self.session.take() {
            warn!(events = session.len(), "recording abandoned, stored macros untouched");
            self.set_state(SessionState::Idle);
        }
        self.report_failure(&error);
    }

    fn shutdown(&mut self) {
        self.end_capture(Err(Error::engine_stopped()));
        if let Some(handle) = self.replay.take() {
            handle.cancel();
            handle.join();
        }
        if self.session.is_some() {
            if let Err(e) = self.stop_recording() {
                warn!(error = %e, "could not store recording on shutdown");
            }
        }
        self.set_state(SessionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::testing::{Action, RecordingClock, RecordingSink};
    use crate::settings::SETTINGS_FILE;
    use macro_core::{Event, KeyToken, MouseButton, NamedKey};
    use std::time::Instant;

    struct Fixture {
        dir: tempfile::TempDir,
        engine: EngineHandle,
        feed: InputFeed,
        sink: Arc<RecordingSink>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_replayer(Replayer::new().clock(Arc::new(RecordingClock::default())))
        }

        fn with_replayer(replayer: Replayer) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = MacroStorage::with_dir(dir.path()).unwrap();
            let sink = Arc::new(RecordingSink::default());
            let engine = Engine::new(storage, dir.path().join(SETTINGS_FILE), sink.clone())
                .replayer(replayer)
                .spawn()
                .unwrap();
            let feed = engine.input();
            Self { dir, engine, feed, sink }
        }

        fn storage(&self) -> MacroStorage {
            MacroStorage::with_dir(self.dir.path()).unwrap()
        }

        fn feed(&self, input: RawInput) {
            assert!(self.feed.send(RawEvent::now(input)));
        }

        fn down(&self, key: impl Into<KeyToken>) {
            self.feed(RawInput::KeyDown(key.into()));
        }

        fn up(&self, key: impl Into<KeyToken>) {
            self.feed(RawInput::KeyUp(key.into()));
        }

        /// Wait until every queued message has been handled
        fn settle(&self) -> EngineSnapshot {
            self.engine.snapshot().unwrap()
        }

        fn wait_idle(&self) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.engine.state() != SessionState::Idle {
                assert!(Instant::now() < deadline, "engine never went idle");
                thread::sleep(Duration::from_millis(5));
            }
            self.settle();
        }
    }

    fn ctrl() -> KeyToken {
        NamedKey::Ctrl.into()
    }

    fn key(c: char) -> KeyToken {
        KeyToken::literal(c)
    }

    #[test]
    fn record_hotkey_toggles_and_is_not_recorded() {
        let f = Fixture::new();
        f.down(ctrl());
        f.down(key('s'));
        assert_eq!(f.settle().state, SessionState::Recording);

        f.up(key('s'));
        f.up(ctrl());
        f.feed(RawInput::Motion { x: 10, y: 10 });
        f.down(key('a'));
        f.down(key('a'));
        f.up(key('a'));
        f.down(ctrl());
        f.down(key('s'));

        let snap = f.settle();
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.last_recorded, Some(6));

        let kinds: Vec<&str> = f.storage().load_current().unwrap().iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec!["key_release", "key_release", "move", "key_press", "key_release", "key_press"]
        );
    }

    #[test]
    fn recording_needs_a_tracking_option() {
        let f = Fixture::new();
        f.engine
            .set_tracking(TrackingOptions { mouse: false, keyboard: false })
            .unwrap();
        let err = f.engine.start_recording().unwrap_err();
        assert_eq!(err.code, ErrorCode::NoTrackingEnabled);
        assert_eq!(f.engine.state(), SessionState::Idle);

        let saved = Settings::load(&f.dir.path().join(SETTINGS_FILE));
        assert!(!saved.track_mouse && !saved.track_keyboard);
    }

    #[test]
    fn replay_is_rejected_while_recording() {
        let f = Fixture::new();
        f.engine.start_recording().unwrap();
        let err = f.engine.replay_current().unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyRecording);
        assert_eq!(f.engine.state(), SessionState::Recording);
        assert_eq!(
            f.engine.start_recording().unwrap_err().code,
            ErrorCode::AlreadyRecording
        );
    }

    #[test]
    fn recording_and_second_replay_are_rejected_while_replaying() {
        let f = Fixture::with_replayer(Replayer::new());
        let slow = MacroSequence::new(vec![
            Event::Move { x: 1, y: 1, t: Duration::ZERO },
            Event::Move { x: 2, y: 2, t: Duration::from_secs(30) },
        ]);
        f.storage().save_favorite("slow", &slow).unwrap();

        f.engine.replay_favorite("slow").unwrap();
        assert_eq!(f.engine.state(), SessionState::Replaying);
        assert_eq!(f.engine.start_recording().unwrap_err().code, ErrorCode::AlreadyReplaying);
        assert_eq!(f.engine.replay_current().unwrap_err().code, ErrorCode::AlreadyReplaying);

        assert!(f.engine.cancel_replay().unwrap());
        f.wait_idle();
        assert_eq!(f.sink.actions(), vec![Action::Move(1, 1)]);
        assert_eq!(f.settle().active_favorite.as_deref(), Some("slow"));
    }

    #[test]
    fn replays_last_recording_with_status_updates() {
        let f = Fixture::new();
        f.engine.start_recording().unwrap();
        f.feed(RawInput::Motion { x: 1, y: 2 });
        f.down(key('x'));
        let seq = f.engine.stop_recording().unwrap();
        assert_eq!(seq.len(), 2);

        let status = f.engine.subscribe();
        f.engine.replay_current().unwrap();
        f.wait_idle();

        assert_eq!(
            f.sink.actions(),
            vec![
                Action::Move(1, 2),
                Action::PressLiteral("x".into()),
                Action::ReleaseLiteral("x".into()),
            ]
        );
        let seen: Vec<&str> = status.try_iter().map(|s| s.headline()).collect();
        assert_eq!(seen, vec!["Ready", "Playing…", "Ready"]);
    }

    #[test]
    fn active_favorite_replays_until_next_recording() {
        let f = Fixture::new();
        let fav = MacroSequence::new(vec![Event::Move { x: 7, y: 7, t: Duration::ZERO }]);
        f.storage().save_favorite("fav", &fav).unwrap();

        f.engine.replay_favorite("fav").unwrap();
        f.wait_idle();
        f.down(ctrl());
        f.down(key('r'));
        f.settle();
        f.wait_idle();
        assert_eq!(f.sink.actions(), vec![Action::Move(7, 7), Action::Move(7, 7)]);

        f.engine.start_recording().unwrap();
        f.feed(RawInput::Motion { x: 3, y: 3 });
        f.engine.stop_recording().unwrap();
        assert_eq!(f.settle().active_favorite, None);

        f.engine.replay_current().unwrap();
        f.wait_idle();
        assert_eq!(f.sink.actions().last(), Some(&Action::Move(3, 3)));
    }

    #[test]
    fn missing_favorite_is_reported() {
        let f = Fixture::new();
        let err = f.engine.replay_favorite("nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::FavoriteNotFound);
        assert_eq!(f.engine.state(), SessionState::Idle);
    }

    #[test]
    fn add_favorite_needs_a_recording() {
        let f = Fixture::new();
        assert_eq!(f.engine.add_favorite("x").unwrap_err().code, ErrorCode::NoMacroRecorded);

        f.engine.start_recording().unwrap();
        f.engine.stop_recording().unwrap();
        f.engine.add_favorite("x").unwrap();
        assert!(f.storage().load_favorites().unwrap()["x"].is_empty());
        assert_eq!(f.engine.add_favorite(" ").unwrap_err().code, ErrorCode::InvalidMacroName);
    }

    #[test]
    fn clicks_in_exclusion_zone_are_dropped() {
        let f = Fixture::new();
        f.engine.set_exclusion(Some(Rect::new(0, 0, 100, 30))).unwrap();
        f.engine.start_recording().unwrap();
        for x in [50, 150] {
            f.feed(RawInput::Button { x, y: 10, button: MouseButton::Left, pressed: true });
        }
        let seq = f.engine.stop_recording().unwrap();
        assert_eq!(seq.len(), 1);
        assert!(matches!(seq.events()[0], Event::Click { x: 150, .. }));
    }

    #[test]
    fn chord_capture_suppresses_hotkeys_and_recording() {
        let f = Fixture::new();
        f.engine.start_recording().unwrap();

        let engine = f.engine.clone();
        let capture = thread::spawn(move || engine.capture_chord(Duration::from_secs(5)));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !matches!(f.engine.status(), Status::CapturingChord { .. }) {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(5));
        }

        f.down(ctrl());
        f.down(key('s'));
        f.up(key('s'));
        let chord = capture.join().unwrap().unwrap();
        assert_eq!(chord.to_string(), "ctrl+s");
        assert_eq!(f.settle().state, SessionState::Recording);
        assert!(f.engine.stop_recording().unwrap().is_empty());
    }

    #[test]
    fn chord_capture_times_out() {
        let f = Fixture::new();
        let err = f.engine.capture_chord(Duration::from_millis(30)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ChordCaptureCancelled);
        assert_eq!(f.engine.status().headline(), "Ready");
    }

    #[test]
    fn stale_cancel_leaves_newer_capture_running() {
        let f = Fixture::new();
        let (first_id, second_id) = (f.engine.next_capture_id(), f.engine.next_capture_id());
        let (first_tx, first_rx) = bounded(1);
        let (second_tx, second_rx) = bounded(1);
        f.engine.send(Message::Command(Command::CaptureChord(first_id, first_tx))).unwrap();
        f.engine.send(Message::Command(Command::CaptureChord(second_id, second_tx))).unwrap();
        f.engine.send(Message::Command(Command::CancelCapture(first_id))).unwrap();

        let first = first_rx.recv().unwrap().unwrap_err();
        assert_eq!(first.code, ErrorCode::ChordCaptureCancelled);

        f.down(ctrl());
        f.down(key('k'));
        f.up(key('k'));
        let chord = second_rx.recv().unwrap().unwrap();
        assert_eq!(chord.to_string(), "ctrl+k");
        assert_eq!(f.engine.status().headline(), "Ready");
    }

    #[test]
    fn listener_failure_abandons_recording() {
        let f = Fixture::new();
        f.engine.start_recording().unwrap();
        f.feed(RawInput::Motion { x: 1, y: 1 });
        f.feed.fail("permission denied");

        let snap = f.settle();
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.last_recorded, None);
        assert!(!f.storage().has_current());
        assert_eq!(f.engine.stop_recording().unwrap_err().code, ErrorCode::NotRecording);
    }

    #[test]
    fn new_shortcuts_take_effect_and_persist() {
        let f = Fixture::new();
        let err = f.engine.set_shortcuts("f9", "F9").unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateOrIncompleteShortcut);

        f.engine.set_shortcuts("f9", "f10").unwrap();
        assert_eq!(
            f.engine.status(),
            Status::Ready { record: "f9".into(), replay: "f10".into() }
        );
        f.down(NamedKey::F9);
        assert_eq!(f.settle().state, SessionState::Recording);

        let saved = Settings::load(&f.dir.path().join(SETTINGS_FILE));
        assert_eq!(saved.record_key, "f9");

        f.engine.stop_recording().unwrap();
        f.engine.reset_shortcuts().unwrap();
        assert_eq!(f.settle().settings.record_key, "ctrl+s");
    }

    #[test]
    fn shutdown_stores_recording_and_stops_accepting_commands() {
        let f = Fixture::new();
        f.engine.start_recording().unwrap();
        f.feed(RawInput::Motion { x: 4, y: 4 });
        f.engine.shutdown().unwrap();

        assert_eq!(f.storage().load_current().unwrap().len(), 1);
        assert_eq!(f.engine.start_recording().unwrap_err().code, ErrorCode::EngineStopped);
        assert!(!f.feed.send(RawEvent::now(RawInput::Motion { x: 0, y: 0 })));
    }
}
