//! Independent integrity detectors.
//!
//! Each detector is a small synchronous state machine; the monitor combines
//! them, applies the per-kind throttle and refuses to do anything once
//! disarmed. Violations are classified by the controller.

mod fullscreen;
mod grace;
mod keys;
mod throttle;

use chrono::{DateTime, Utc};
use tracing::warn;

use quiz_core::model::ViolationKind;
use storage::{ActiveSessionLock, LockState};

use crate::config::ProctorConfig;
use crate::events::{GraceKind, Overlay};
use crate::platform::{EnvironmentSnapshot, ProctorPlatform, ViewportMetrics};

pub use fullscreen::{FullscreenChange, FullscreenWatch};
pub use grace::{GraceTimer, GraceUpdate};
pub use keys::{Key, KeyChord, KeyClass, KeyVerdict, ParseChordError, classify};
pub use throttle::SignalThrottle;

/// Something a detector noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Violation(ViolationKind),
    Overlay(Option<Overlay>),
    Grace { kind: GraceKind, remaining_secs: u32 },
    GraceCleared(GraceKind),
}

pub struct IntegrityMonitor {
    armed: bool,
    hidden: bool,
    throttle: SignalThrottle,
    fullscreen: FullscreenWatch,
    focus: GraceTimer,
    viewport: GraceTimer,
    resize_tolerance_px: u32,
    escape_suppression: chrono::Duration,
    instance_lock: ActiveSessionLock,
}

impl IntegrityMonitor {
    #[must_use]
    pub fn new(config: &ProctorConfig, instance_lock: ActiveSessionLock) -> Self {
        Self {
            armed: false,
            hidden: false,
            throttle: SignalThrottle::new(config.signal_throttle()),
            fullscreen: FullscreenWatch::default(),
            focus: GraceTimer::new(config.focus_grace()),
            viewport: GraceTimer::new(config.resize_grace()),
            resize_tolerance_px: config.resize_tolerance_px(),
            escape_suppression: config.escape_suppression(),
            instance_lock,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn overlay_shown(&self) -> bool {
        self.fullscreen.overlay_shown()
    }

    /// Start watching: claim the cross-session slot and push the history guard.
    pub fn arm(&mut self, platform: &dyn ProctorPlatform) {
        if let Err(err) = self.instance_lock.claim() {
            warn!(error = %err, "could not claim active session slot");
        }
        platform.push_history_guard();
        self.armed = true;
    }

    /// Stop every detector and drop pending grace periods. Idempotent.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.hidden = false;
        self.focus.clear();
        self.viewport.clear();
        self.fullscreen.reset();
    }

    /// Clear the cross-session slot if it is still ours.
    pub fn release_instance_lock(&self) {
        if let Err(err) = self.instance_lock.release() {
            warn!(error = %err, "could not clear active session slot");
        }
    }

    /// Throttle gate for raising `kind` at `now`.
    pub fn admit(&mut self, kind: ViolationKind, now: DateTime<Utc>) -> bool {
        self.armed && self.throttle.admit(kind, now)
    }

    /// Run every polled detector against one environment snapshot.
    ///
    /// Majors come first so an ending violation is raised before budgeted ones.
    pub fn poll(&mut self, snapshot: &EnvironmentSnapshot, now: DateTime<Utc>) -> Vec<Detection> {
        if !self.armed {
            return Vec::new();
        }
        let mut found = Vec::new();
        found.extend(self.visibility(snapshot.hidden));
        found.extend(self.instance());
        found.extend(self.focus_change(snapshot.focused, now));
        found.extend(self.fullscreen_change(snapshot.fullscreen, now));
        found.extend(self.viewport_change(snapshot.viewport, now));
        found
    }

    /// Reports only the visible-to-hidden edge.
    pub fn visibility(&mut self, hidden: bool) -> Option<Detection> {
        if !self.armed {
            return None;
        }
        let became_hidden = hidden && !self.hidden;
        self.hidden = hidden;
        became_hidden.then_some(Detection::Violation(ViolationKind::TabSwitch))
    }

    pub fn fullscreen_change(&mut self, fullscreen: bool, now: DateTime<Utc>) -> Vec<Detection> {
        if !self.armed {
            return Vec::new();
        }
        match self.fullscreen.observe(fullscreen, now) {
            FullscreenChange::Unchanged => Vec::new(),
            FullscreenChange::Exited { counted } => {
                let mut found = vec![Detection::Overlay(Some(Overlay::FullscreenRequired))];
                if counted {
                    found.push(Detection::Violation(ViolationKind::FullscreenExited));
                }
                found
            }
            FullscreenChange::Restored => vec![Detection::Overlay(None)],
        }
    }

    pub fn focus_change(&mut self, focused: bool, now: DateTime<Utc>) -> Option<Detection> {
        if !self.armed {
            return None;
        }
        let may_start = !self.viewport.is_pending();
        grace_detection(
            GraceKind::FocusLoss,
            self.focus.observe(!focused, may_start, now),
            ViolationKind::FocusNotRegained,
        )
    }

    pub fn viewport_change(&mut self, viewport: ViewportMetrics, now: DateTime<Utc>) -> Option<Detection> {
        if !self.armed {
            return None;
        }
        let suspicious = viewport.exceeds_tolerance(self.resize_tolerance_px);
        let may_start = !self.focus.is_pending();
        grace_detection(
            GraceKind::ViewportSuspicion,
            self.viewport.observe(suspicious, may_start, now),
            ViolationKind::DevtoolsSuspected,
        )
    }

    /// Classify a key press. An intercepted Escape also masks the fullscreen
    /// exit it causes so the same press is not counted twice.
    pub fn key(&mut self, chord: &KeyChord, now: DateTime<Utc>) -> KeyClass {
        if !self.armed {
            return KeyClass::Allowed;
        }
        let class = classify(chord);
        if class == KeyClass::Violation(ViolationKind::EscapeKey) {
            self.fullscreen.suppress(now, self.escape_suppression);
        }
        class
    }

    pub fn context_menu(&self) -> Option<Detection> {
        self.armed
            .then_some(Detection::Violation(ViolationKind::ContextMenu))
    }

    /// Re-push the guard entry before reporting, so the navigation is
    /// absorbed ahead of the submission request.
    pub fn popstate(&self, platform: &dyn ProctorPlatform) -> Option<Detection> {
        if !self.armed {
            return None;
        }
        platform.push_history_guard();
        Some(Detection::Violation(ViolationKind::BackNavigation))
    }

    /// Compare the shared slot against our session id.
    pub fn instance(&self) -> Option<Detection> {
        if !self.armed {
            return None;
        }
        match self.instance_lock.check() {
            Ok(LockState::Held) => None,
            Ok(LockState::Taken(other)) => {
                warn!(other_session = %other, "quiz opened in another session");
                Some(Detection::Violation(ViolationKind::MultipleInstances))
            }
            Ok(LockState::Vacant) => {
                if let Err(err) = self.instance_lock.claim() {
                    warn!(error = %err, "could not reclaim active session slot");
                }
                None
            }
            Err(err) => {
                warn!(error = %err, "could not read active session slot");
                None
            }
        }
    }
}

fn grace_detection(
    kind: GraceKind,
    update: GraceUpdate,
    violation: ViolationKind,
) -> Option<Detection> {
    match update {
        GraceUpdate::Quiet => None,
        GraceUpdate::Started { remaining_secs } | GraceUpdate::Countdown { remaining_secs } => {
            Some(Detection::Grace {
                kind,
                remaining_secs,
            })
        }
        GraceUpdate::Cleared => Some(Detection::GraceCleared(kind)),
        GraceUpdate::Expired => Some(Detection::Violation(violation)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePlatform;
    use chrono::Duration;
    use quiz_core::model::{QuizId, SessionId};
    use quiz_core::time::fixed_now;
    use std::sync::Arc;
    use storage::{InMemoryStore, KeyValueStore};

    fn armed_monitor(store: &InMemoryStore, session: &str) -> (IntegrityMonitor, FakePlatform) {
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        let lock = ActiveSessionLock::new(shared, &QuizId::new("q"), SessionId::from_raw(session));
        let mut monitor = IntegrityMonitor::new(&ProctorConfig::default(), lock);
        let platform = FakePlatform::new();
        monitor.arm(&platform);
        (monitor, platform)
    }

    #[test]
    fn disarmed_monitor_reports_nothing() {
        let store = InMemoryStore::new();
        let (mut monitor, platform) = armed_monitor(&store, "a");
        monitor.disarm();
        let snapshot = EnvironmentSnapshot {
            hidden: true,
            fullscreen: false,
            focused: false,
            ..EnvironmentSnapshot::default()
        };
        assert!(monitor.poll(&snapshot, fixed_now()).is_empty());
        assert_eq!(monitor.popstate(&platform), None);
        assert_eq!(monitor.context_menu(), None);
        assert!(!monitor.admit(ViolationKind::ContextMenu, fixed_now()));
    }

    #[test]
    fn staying_hidden_is_reported_once() {
        let store = InMemoryStore::new();
        let (mut monitor, _platform) = armed_monitor(&store, "a");
        assert_eq!(
            monitor.visibility(true),
            Some(Detection::Violation(ViolationKind::TabSwitch))
        );
        assert_eq!(monitor.visibility(true), None);
        assert_eq!(monitor.visibility(false), None);
    }

    #[test]
    fn arming_pushes_history_guard_and_popstate_repushes() {
        let store = InMemoryStore::new();
        let (monitor, platform) = armed_monitor(&store, "a");
        assert_eq!(platform.history_pushes(), 1);
        assert_eq!(
            monitor.popstate(&platform),
            Some(Detection::Violation(ViolationKind::BackNavigation))
        );
        assert_eq!(platform.history_pushes(), 2);
    }

    #[test]
    fn only_one_grace_period_is_outstanding() {
        let store = InMemoryStore::new();
        let (mut monitor, _platform) = armed_monitor(&store, "a");
        let t0 = fixed_now();
        let docked = ViewportMetrics {
            inner_width: 900,
            ..ViewportMetrics::uniform(1280, 800)
        };

        assert!(matches!(
            monitor.focus_change(false, t0),
            Some(Detection::Grace { kind: GraceKind::FocusLoss, .. })
        ));
        // Viewport suspicion is coalesced while the focus grace is pending.
        assert_eq!(monitor.viewport_change(docked, t0), None);

        assert_eq!(
            monitor.focus_change(true, t0 + Duration::seconds(1)),
            Some(Detection::GraceCleared(GraceKind::FocusLoss))
        );
        assert!(matches!(
            monitor.viewport_change(docked, t0 + Duration::seconds(2)),
            Some(Detection::Grace { kind: GraceKind::ViewportSuspicion, .. })
        ));
    }

    #[test]
    fn viewport_suspicion_escalates_after_grace() {
        let store = InMemoryStore::new();
        let (mut monitor, _platform) = armed_monitor(&store, "a");
        let t0 = fixed_now();
        let docked = ViewportMetrics {
            inner_height: 500,
            ..ViewportMetrics::uniform(1280, 800)
        };
        monitor.viewport_change(docked, t0);
        assert_eq!(
            monitor.viewport_change(docked, t0 + Duration::seconds(5)),
            Some(Detection::Violation(ViolationKind::DevtoolsSuspected))
        );
    }

    #[test]
    fn escape_masks_resulting_fullscreen_exit() {
        let store = InMemoryStore::new();
        let (mut monitor, _platform) = armed_monitor(&store, "a");
        let t0 = fixed_now();
        assert_eq!(
            monitor.key(&KeyChord::plain(Key::Escape), t0),
            KeyClass::Violation(ViolationKind::EscapeKey)
        );
        assert_eq!(
            monitor.fullscreen_change(false, t0 + Duration::milliseconds(50)),
            vec![Detection::Overlay(Some(Overlay::FullscreenRequired))]
        );
    }

    #[test]
    fn losing_tab_detects_other_session() {
        let store = InMemoryStore::new();
        let (tab_a, _) = armed_monitor(&store, "a");
        let (tab_b, _) = armed_monitor(&store, "b");
        assert_eq!(
            tab_a.instance(),
            Some(Detection::Violation(ViolationKind::MultipleInstances))
        );
        assert_eq!(tab_b.instance(), None);
    }

    #[test]
    fn vacant_slot_is_reclaimed() {
        let store = InMemoryStore::new();
        let (monitor, _) = armed_monitor(&store, "a");
        store.remove("active_quiz_session:q").unwrap();
        assert_eq!(monitor.instance(), None);
        assert_eq!(
            store.get("active_quiz_session:q").unwrap().as_deref(),
            Some("a")
        );
    }
}
