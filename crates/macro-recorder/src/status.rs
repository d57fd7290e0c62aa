//! Human-readable status for whatever surface is showing the recorder

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready { record: String, replay: String },
    Recording { stop: String },
    Playing { favorite: Option<String> },
    CapturingChord { progress: String },
    /// A command triggered by a hotkey failed; there was no caller to return it to
    Failed { message: String },
}

impl Status {
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "Ready",
            Self::Recording { .. } => "Recording…",
            Self::Playing { .. } => "Playing…",
            Self::CapturingChord { .. } => "Press key combination…",
            Self::Failed { .. } => "Error",
        }
    }

    pub fn hint(&self) -> String {
        match self {
            Self::Ready { record, replay } => format!(
                "Press '{}' to record\nPress '{}' to play",
                record.to_uppercase(),
                replay.to_uppercase()
            ),
            Self::Recording { stop } => format!("Press '{}' again to stop", stop.to_uppercase()),
            Self::Playing { favorite: Some(name) } => format!("Active Macro: {}", name),
            Self::Playing { favorite: None } => "Please wait".into(),
            Self::CapturingChord { progress } => progress.clone(),
            Self::Failed { message } => message.clone(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hint = self.hint();
        if hint.is_empty() {
            f.write_str(self.headline())
        } else {
            write!(f, "{}\n{}", self.headline(), hint)
        }
    }
}

struct Inner {
    current: Status,
    subscribers: Vec<Sender<Status>>,
}

/// Latest status plus fan-out to subscribers
#[derive(Clone)]
pub struct StatusBus {
    inner: Arc<Mutex<Inner>>,
}

impl StatusBus {
    pub fn new(initial: Status) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn current(&self) -> Status {
        self.inner.lock().current.clone()
    }

    pub fn publish(&self, status: Status) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|tx| tx.send(status.clone()).is_ok());
        inner.current = status;
    }

    /// New receiver; the current status is delivered first
    pub fn subscribe(&self) -> Receiver<Status> {
        let (tx, rx) = unbounded();
        let mut inner = self.inner.lock();
        let _ = tx.send(inner.current.clone());
        inner.subscribers.push(tx);
        rx
    }
}
