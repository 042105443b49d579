//! Events emitted to the host while an attempt runs.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use quiz_core::model::ViolationKind;

use crate::api::SubmitReceipt;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient message; the host dismisses it after `dismiss_after`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub dismiss_after: Duration,
}

/// Persistent blocking layer, shown until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    FullscreenRequired,
}

/// Grace-period detectors that count down before escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceKind {
    FocusLoss,
    ViewportSuspicion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Results(SubmitReceipt),
    Login,
    QuizList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The host hides its own navigation chrome while `true`.
    ActiveChanged(bool),
    Notice(Notice),
    OverlayChanged(Option<Overlay>),
    TimeWarning { remaining_secs: u32 },
    GraceCountdown { kind: GraceKind, remaining_secs: u32 },
    ViolationRecorded { kind: ViolationKind, remaining: Option<u32> },
    Navigate(Destination),
}

/// Fan-out channel the host subscribes to.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
    notice_ttl: Duration,
}

impl EventBus {
    #[must_use]
    pub fn new(notice_ttl: Duration) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender, notice_ttl }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("session event dropped: no subscribers");
        }
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(SessionEvent::Notice(Notice {
            level,
            message: message.into(),
            dismiss_after: self.notice_ttl,
        }));
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}
