use chrono::{DateTime, Duration, Utc};

/// Result of feeding the current fullscreen state to the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenChange {
    Unchanged,
    /// Left fullscreen; `counted` is false when an intercepted Escape caused it.
    Exited { counted: bool },
    Restored,
}

/// Tracks fullscreen exits and the blocking overlay.
///
/// Repeated "not fullscreen" observations while the overlay is up are ignored,
/// so one exit is one violation however many times it is reported.
#[derive(Debug, Clone, Default)]
pub struct FullscreenWatch {
    overlay_shown: bool,
    suppress_until: Option<DateTime<Utc>>,
}

impl FullscreenWatch {
    #[must_use]
    pub fn overlay_shown(&self) -> bool {
        self.overlay_shown
    }

    /// Do not count the next exit if it happens within `window` of `now`.
    pub fn suppress(&mut self, now: DateTime<Utc>, window: Duration) {
        self.suppress_until = Some(now + window);
    }

    pub fn observe(&mut self, fullscreen: bool, now: DateTime<Utc>) -> FullscreenChange {
        match (fullscreen, self.overlay_shown) {
            (false, false) => {
                self.overlay_shown = true;
                let suppressed = self.suppress_until.take().is_some_and(|until| now <= until);
                FullscreenChange::Exited {
                    counted: !suppressed,
                }
            }
            (true, true) => {
                self.overlay_shown = false;
                FullscreenChange::Restored
            }
            _ => FullscreenChange::Unchanged,
        }
    }

    pub fn reset(&mut self) {
        self.overlay_shown = false;
        self.suppress_until = None;
    }
}
