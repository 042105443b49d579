//! The attempt state machine.
//!
//! `ProctorController` owns one attempt and is the only writer of its
//! status. Every handler is synchronous; handlers that end the attempt
//! return a sealed [`SubmissionTicket`] for the driver to deliver. The
//! latch, the `Submitting` transition and teardown all happen inside
//! [`ProctorController::begin_submit`], before any delivery is awaited.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use quiz_core::model::{
    AttemptStatus, LockReason, Severity, TransitionError, Violation, ViolationKind,
};
use storage::ActiveSessionLock;

use crate::api::SubmitReceipt;
use crate::bootstrap::AttemptSession;
use crate::classifier::{Consequence, ViolationBudget, notice_text};
use crate::config::ProctorConfig;
use crate::error::{AnswerRejected, EnvironmentError, SubmitError};
use crate::events::{Destination, EventBus, GraceKind, NoticeLevel, SessionEvent};
use crate::integrity::{Detection, IntegrityMonitor, KeyChord, KeyClass, KeyVerdict};
use crate::platform::ProctorPlatform;
use crate::submission::{SubmissionTicket, SubmitTrigger};
use crate::timer::{CountdownTimer, TimerTick};

/// Outcome of an input event the host may need to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub verdict: KeyVerdict,
    pub submission: Option<SubmissionTicket>,
}

impl Reaction {
    fn allow() -> Self {
        Self {
            verdict: KeyVerdict::Allow,
            submission: None,
        }
    }

    fn block(submission: Option<SubmissionTicket>) -> Self {
        Self {
            verdict: KeyVerdict::Block,
            submission,
        }
    }
}

pub struct ProctorController {
    session: AttemptSession,
    status: AttemptStatus,
    lock_reason: Option<LockReason>,
    platform: Arc<dyn ProctorPlatform>,
    events: EventBus,
    monitor: IntegrityMonitor,
    budget: ViolationBudget,
    timer: CountdownTimer,
    min_viewport: (u32, u32),
    in_flight: bool,
    sealed: Option<SubmissionTicket>,
    receipt: Option<SubmitReceipt>,
    announced_active: bool,
    tasks: Vec<AbortHandle>,
    status_tx: watch::Sender<AttemptStatus>,
}

impl ProctorController {
    #[must_use]
    pub fn new(
        session: AttemptSession,
        config: &ProctorConfig,
        platform: Arc<dyn ProctorPlatform>,
        events: EventBus,
        instance_lock: ActiveSessionLock,
    ) -> Self {
        let timer = CountdownTimer::new(session.time_limit_secs(), config.time_warnings_secs());
        let (status_tx, _) = watch::channel(AttemptStatus::NotStarted);
        Self {
            session,
            status: AttemptStatus::NotStarted,
            lock_reason: None,
            platform,
            events,
            monitor: IntegrityMonitor::new(config, instance_lock),
            budget: ViolationBudget::new(config.max_violations()),
            timer,
            min_viewport: config.min_viewport(),
            in_flight: false,
            sealed: None,
            receipt: None,
            announced_active: false,
            tasks: Vec::new(),
            status_tx,
        }
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn lock_reason(&self) -> Option<LockReason> {
        self.lock_reason
    }

    #[must_use]
    pub fn session(&self) -> &AttemptSession {
        &self.session
    }

    /// Minor violations counted so far.
    #[must_use]
    pub fn violations(&self) -> u32 {
        self.budget.count()
    }

    #[must_use]
    pub fn violation_history(&self) -> &[Violation] {
        self.budget.history()
    }

    #[must_use]
    pub fn attempts_remaining(&self) -> u32 {
        self.budget.remaining()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.timer.remaining_secs()
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmitReceipt> {
        self.receipt.as_ref()
    }

    /// Whether a sealed submission is waiting for a manual retry.
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        !self.in_flight && self.sealed.is_some() && self.status == AttemptStatus::Submitting
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<AttemptStatus> {
        self.status_tx.subscribe()
    }

    /// Attach a background task to the attempt; it is aborted on teardown.
    pub fn register_task(&mut self, handle: AbortHandle) {
        if self.torn_down() {
            handle.abort();
        } else {
            self.tasks.push(handle);
        }
    }

    //
    // ─── ENTRY ─────────────────────────────────────────────────────────────────
    //

    /// Capability and viewport checks, then wait for fullscreen.
    ///
    /// # Errors
    ///
    /// An unsupported environment locks the attempt. A small viewport is
    /// reported without changing state so the user can resize and retry.
    pub fn begin_entry(&mut self) -> Result<(), EnvironmentError> {
        let caps = self.platform.capabilities();
        let refusal = if !caps.supported_environment {
            Some(EnvironmentError::Unsupported)
        } else if !caps.fullscreen_api {
            Some(EnvironmentError::FullscreenUnsupported)
        } else {
            None
        };
        if let Some(err) = refusal {
            warn!(session_id = %self.session.id(), error = %err, "environment refused");
            self.lock(LockReason::UnsupportedEnvironment);
            return Err(err);
        }

        let viewport = self.platform.snapshot().viewport;
        let (min_width, min_height) = self.min_viewport;
        if viewport.inner_width < min_width || viewport.inner_height < min_height {
            return Err(EnvironmentError::ViewportTooSmall {
                width: viewport.inner_width,
                height: viewport.inner_height,
                min_width,
                min_height,
            });
        }

        self.set_status(AttemptStatus::AwaitingFullscreen)?;
        Ok(())
    }

    /// Enter fullscreen and start the attempt.
    ///
    /// # Errors
    ///
    /// Fails without changing state if fullscreen could not be entered.
    pub fn confirm_fullscreen(&mut self) -> Result<(), EnvironmentError> {
        if !self
            .status
            .can_transition_to(AttemptStatus::InProgress)
        {
            return Err(TransitionError {
                from: self.status,
                to: AttemptStatus::InProgress,
            }
            .into());
        }
        self.platform.request_fullscreen()?;
        if !self.platform.snapshot().fullscreen {
            return Err(EnvironmentError::FullscreenRequired);
        }

        self.set_status(AttemptStatus::InProgress)?;
        self.monitor.arm(self.platform.as_ref());
        self.announced_active = true;
        self.events.emit(SessionEvent::ActiveChanged(true));
        info!(
            session_id = %self.session.id(),
            quiz_id = %self.session.quiz().id(),
            time_limit_secs = self.session.time_limit_secs(),
            "attempt started"
        );
        Ok(())
    }

    //
    // ─── ANSWERS & TIMER ───────────────────────────────────────────────────────
    //

    /// Record `option` for the question shown at `presented`.
    ///
    /// # Errors
    ///
    /// Rejected once the attempt is no longer in progress.
    pub fn select_answer(&mut self, presented: usize, option: u8) -> Result<(), AnswerRejected> {
        if !self.status.is_active() {
            return Err(AnswerRejected::NotActive(self.status));
        }
        self.session.answers_mut().select(presented, option)?;
        debug!(session_id = %self.session.id(), presented, option, "answer selected");
        Ok(())
    }

    /// One second of the countdown.
    pub fn tick(&mut self) -> Option<SubmissionTicket> {
        if !self.status.is_active() {
            return None;
        }
        match self.timer.tick() {
            TimerTick::Idle | TimerTick::Running { .. } => None,
            TimerTick::Warning { remaining_secs } => {
                self.events.emit(SessionEvent::TimeWarning { remaining_secs });
                self.events.notice(
                    NoticeLevel::Warning,
                    format!("{} remaining", format_remaining(remaining_secs)),
                );
                None
            }
            TimerTick::Expired => {
                info!(session_id = %self.session.id(), "time expired");
                self.auto_submit(SubmitTrigger::TimeExpired)
            }
        }
    }

    //
    // ─── INTEGRITY SIGNALS ─────────────────────────────────────────────────────
    //

    /// Run the polled detectors against the platform's current state.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<SubmissionTicket> {
        if !self.status.is_active() {
            return None;
        }
        let snapshot = self.platform.snapshot();
        let detections = self.monitor.poll(&snapshot, now);
        self.apply(detections, now)
    }

    pub fn on_fullscreen_change(
        &mut self,
        fullscreen: bool,
        now: DateTime<Utc>,
    ) -> Option<SubmissionTicket> {
        let detections = self.monitor.fullscreen_change(fullscreen, now);
        self.apply(detections, now)
    }

    pub fn on_visibility_change(&mut self, hidden: bool, now: DateTime<Utc>) -> Option<SubmissionTicket> {
        let detection = self.monitor.visibility(hidden);
        self.apply(detection, now)
    }

    pub fn on_focus_change(&mut self, focused: bool, now: DateTime<Utc>) -> Option<SubmissionTicket> {
        let detection = self.monitor.focus_change(focused, now);
        self.apply(detection, now)
    }

    pub fn on_key(&mut self, chord: &KeyChord, now: DateTime<Utc>) -> Reaction {
        if !self.status.is_active() {
            return Reaction::allow();
        }
        match self.monitor.key(chord, now) {
            KeyClass::Allowed => Reaction::allow(),
            KeyClass::Suppressed => Reaction::block(None),
            KeyClass::Violation(kind) => Reaction::block(self.record(kind, now)),
        }
    }

    pub fn on_context_menu(&mut self, now: DateTime<Utc>) -> Reaction {
        if !self.status.is_active() {
            return Reaction::allow();
        }
        let detection = self.monitor.context_menu();
        Reaction::block(self.apply(detection, now))
    }

    /// Copy, cut and paste are blocked but not counted.
    #[must_use]
    pub fn on_clipboard(&self) -> KeyVerdict {
        if self.status.is_active() {
            KeyVerdict::Block
        } else {
            KeyVerdict::Allow
        }
    }

    pub fn on_popstate(&mut self, now: DateTime<Utc>) -> Option<SubmissionTicket> {
        let detection = self.monitor.popstate(self.platform.as_ref());
        self.apply(detection, now)
    }

    pub fn check_instance_lock(&mut self, now: DateTime<Utc>) -> Option<SubmissionTicket> {
        let detection = self.monitor.instance();
        self.apply(detection, now)
    }

    fn apply(
        &mut self,
        detections: impl IntoIterator<Item = Detection>,
        now: DateTime<Utc>,
    ) -> Option<SubmissionTicket> {
        for detection in detections {
            if !self.status.is_active() {
                return None;
            }
            match detection {
                Detection::Violation(kind) => {
                    if let Some(ticket) = self.record(kind, now) {
                        return Some(ticket);
                    }
                }
                Detection::Overlay(overlay) => {
                    self.events.emit(SessionEvent::OverlayChanged(overlay));
                }
                Detection::Grace {
                    kind,
                    remaining_secs,
                } => {
                    self.events.emit(SessionEvent::GraceCountdown {
                        kind,
                        remaining_secs,
                    });
                    self.events
                        .notice(NoticeLevel::Warning, grace_text(kind, remaining_secs));
                }
                Detection::GraceCleared(kind) => {
                    debug!(session_id = %self.session.id(), ?kind, "grace period cleared");
                }
            }
        }
        None
    }

    fn record(&mut self, kind: ViolationKind, now: DateTime<Utc>) -> Option<SubmissionTicket> {
        if !self.status.is_active() || !self.monitor.admit(kind, now) {
            return None;
        }
        let consequence = self.budget.classify(Violation::new(kind, now));
        warn!(
            session_id = %self.session.id(),
            ?kind,
            count = self.budget.count(),
            ?consequence,
            "integrity violation"
        );
        let remaining = match kind.severity() {
            Severity::Minor => Some(self.budget.remaining()),
            Severity::Major => None,
        };
        self.events
            .emit(SessionEvent::ViolationRecorded { kind, remaining });
        self.events
            .notice(NoticeLevel::Warning, notice_text(kind, &consequence));
        match consequence {
            Consequence::Warn { .. } => None,
            Consequence::Submit(trigger) => self.auto_submit(trigger),
        }
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    fn auto_submit(&mut self, trigger: SubmitTrigger) -> Option<SubmissionTicket> {
        match self.begin_submit(trigger) {
            Ok(ticket) => Some(ticket),
            Err(err) => {
                debug!(session_id = %self.session.id(), %trigger, error = %err, "auto submission skipped");
                None
            }
        }
    }

    /// Seal the answers and enter `Submitting`.
    ///
    /// The first caller wins; later callers get `AlreadySubmitting`. A manual
    /// call after a failed manual delivery re-issues the same sealed ticket.
    ///
    /// # Errors
    ///
    /// `Validation` for an incomplete manual submission (state unchanged),
    /// `AlreadySubmitting` while a delivery is outstanding, `NotActive`
    /// outside an attempt.
    pub fn begin_submit(&mut self, trigger: SubmitTrigger) -> Result<SubmissionTicket, SubmitError> {
        if self.in_flight {
            return Err(SubmitError::AlreadySubmitting);
        }
        match self.status {
            AttemptStatus::InProgress => {}
            AttemptStatus::Submitting => {
                return match (&self.sealed, trigger) {
                    (Some(sealed), SubmitTrigger::Manual) => {
                        self.in_flight = true;
                        info!(session_id = %self.session.id(), "retrying submission");
                        Ok(sealed.clone())
                    }
                    _ => Err(SubmitError::AlreadySubmitting),
                };
            }
            other => return Err(SubmitError::NotActive(other)),
        }

        if trigger == SubmitTrigger::Manual
            && let Some(first_unanswered) = self.session.answers().first_unanswered()
        {
            self.events.notice(
                NoticeLevel::Warning,
                format!("Please answer question {} before submitting", first_unanswered + 1),
            );
            return Err(SubmitError::Validation { first_unanswered });
        }

        let answers = self.session.answers().to_canonical(self.session.order())?;
        self.set_status(AttemptStatus::Submitting)?;
        self.in_flight = true;
        let ticket = SubmissionTicket::new(
            self.session.quiz().id().clone(),
            self.session.id().clone(),
            answers,
            trigger,
        );
        self.sealed = Some(ticket.clone());
        self.teardown();
        info!(
            session_id = %self.session.id(),
            reason = %trigger,
            auto = trigger.is_auto(),
            "submission started"
        );
        Ok(ticket)
    }

    /// Apply the delivery outcome of the ticket from `begin_submit`.
    ///
    /// # Errors
    ///
    /// Passes the delivery error through after updating state.
    pub fn finish_submit(
        &mut self,
        result: Result<SubmitReceipt, SubmitError>,
    ) -> Result<SubmitReceipt, SubmitError> {
        self.in_flight = false;
        if self.status != AttemptStatus::Submitting {
            debug!(session_id = %self.session.id(), status = %self.status, "late delivery outcome ignored");
            return result;
        }
        let auto = self.sealed.as_ref().is_some_and(SubmissionTicket::is_auto);

        match result {
            Ok(receipt) => {
                self.complete(receipt.clone());
                Ok(receipt)
            }
            Err(SubmitError::Conflict) => {
                self.complete(SubmitReceipt::recorded_elsewhere());
                if auto {
                    Ok(SubmitReceipt::recorded_elsewhere())
                } else {
                    self.events
                        .notice(NoticeLevel::Info, "This attempt was already submitted");
                    Err(SubmitError::Conflict)
                }
            }
            Err(SubmitError::Auth) => {
                self.lock(LockReason::AuthExpired);
                Err(SubmitError::Auth)
            }
            Err(err) if auto => {
                error!(session_id = %self.session.id(), error = %err, "automatic submission failed");
                self.events
                    .notice(NoticeLevel::Error, "Automatic submission failed");
                self.lock(LockReason::DeliveryFailed);
                Err(err)
            }
            Err(err) => {
                warn!(session_id = %self.session.id(), error = %err, "manual submission failed, retry allowed");
                self.events
                    .notice(NoticeLevel::Error, "Submission failed. Please try again");
                Err(err)
            }
        }
    }

    /// End the attempt without a submission. No-op once terminal.
    /// Lock only if no submission has begun. Background loops use this so a
    /// late result cannot overtake a delivery already in flight.
    pub fn lock_if_active(&mut self, reason: LockReason) -> bool {
        if self.status.submission_begun() || self.status.is_terminal() {
            debug!(session_id = %self.session.id(), %reason, status = %self.status, "lock skipped");
            return false;
        }
        self.lock(reason);
        true
    }

    pub fn lock(&mut self, reason: LockReason) {
        if self.status.is_terminal() {
            return;
        }
        if let Err(err) = self.set_status(AttemptStatus::Locked) {
            error!(error = %err, "lock transition refused");
            return;
        }
        self.lock_reason = Some(reason);
        self.in_flight = false;
        self.sealed = None;
        self.teardown();
        self.finalize();
        warn!(session_id = %self.session.id(), %reason, "attempt locked");

        let (message, destination) = match reason {
            LockReason::AuthExpired => ("Session expired. Please sign in again", Destination::Login),
            LockReason::AlreadyAttempted => ("You have already attempted this quiz", Destination::QuizList),
            LockReason::UnsupportedEnvironment => (
                "This browser or device cannot run a proctored quiz",
                Destination::QuizList,
            ),
            LockReason::DeliveryFailed => (
                "Your attempt could not be submitted",
                Destination::QuizList,
            ),
        };
        self.events.notice(NoticeLevel::Error, message);
        self.events.emit(SessionEvent::Navigate(destination));
    }

    fn complete(&mut self, receipt: SubmitReceipt) {
        if let Err(err) = self.set_status(AttemptStatus::Submitted) {
            error!(error = %err, "completion transition refused");
            return;
        }
        self.sealed = None;
        self.receipt = Some(receipt.clone());
        self.finalize();
        self.events
            .emit(SessionEvent::Navigate(Destination::Results(receipt)));
    }

    //
    // ─── TEARDOWN ──────────────────────────────────────────────────────────────
    //

    fn torn_down(&self) -> bool {
        self.status.submission_begun() || self.status.is_terminal()
    }

    fn teardown(&mut self) {
        self.timer.cancel();
        let overlay_shown = self.monitor.overlay_shown();
        self.monitor.disarm();
        if overlay_shown {
            self.events.emit(SessionEvent::OverlayChanged(None));
        }
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
    }

    fn finalize(&mut self) {
        self.platform.exit_fullscreen();
        self.monitor.release_instance_lock();
        if self.announced_active {
            self.announced_active = false;
            self.events.emit(SessionEvent::ActiveChanged(false));
        }
    }

    fn set_status(&mut self, next: AttemptStatus) -> Result<(), TransitionError> {
        self.status.transition(next)?;
        self.status_tx.send_replace(next);
        debug!(session_id = %self.session.id(), status = %next, "status changed");
        Ok(())
    }
}

fn format_remaining(secs: u32) -> String {
    match secs {
        60 => "1 minute".to_string(),
        s if s >= 120 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{s} seconds"),
    }
}

fn grace_text(kind: GraceKind, remaining_secs: u32) -> String {
    match kind {
        GraceKind::FocusLoss => {
            format!("Return to the quiz window within {remaining_secs}s")
        }
        GraceKind::ViewportSuspicion => {
            format!("Close developer tools or restore the window within {remaining_secs}s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::AttemptSession;
    use crate::integrity::Key;
    use crate::platform::ViewportMetrics;
    use crate::test_support::{FakePlatform, quiz_snapshot};
    use chrono::Duration;
    use quiz_core::model::{QuestionOrder, SessionId};
    use quiz_core::time::fixed_now;
    use storage::{InMemoryStore, KeyValueStore};
    use tokio::sync::broadcast;

    struct Harness {
        controller: ProctorController,
        platform: Arc<FakePlatform>,
        events: broadcast::Receiver<SessionEvent>,
        store: InMemoryStore,
    }

    fn harness_with(order: QuestionOrder, config: &ProctorConfig) -> Harness {
        let quiz = quiz_snapshot("q1", order.len(), 1);
        let session = AttemptSession::new(quiz, order, fixed_now());
        let store = InMemoryStore::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        let lock = ActiveSessionLock::new(shared, session.quiz().id(), session.id().clone());
        let platform = Arc::new(FakePlatform::new());
        let bus = EventBus::new(config.notice_ttl());
        let events = bus.subscribe();
        let controller = ProctorController::new(session, config, platform.clone(), bus, lock);
        Harness {
            controller,
            platform,
            events,
            store,
        }
    }

    fn started(questions: usize) -> Harness {
        let mut h = harness_with(QuestionOrder::identity(questions), &ProctorConfig::default());
        h.controller.begin_entry().unwrap();
        h.controller.confirm_fullscreen().unwrap();
        h
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn entry_reaches_in_progress_and_announces_activity() {
        let mut h = started(2);
        assert_eq!(h.controller.status(), AttemptStatus::InProgress);
        assert!(drain(&mut h.events).contains(&SessionEvent::ActiveChanged(true)));
        assert_eq!(h.platform.history_pushes(), 1);
        let key = format!("active_quiz_session:{}", h.controller.session().quiz().id());
        assert_eq!(
            h.store.get(&key).unwrap().as_deref(),
            Some(h.controller.session().id().as_str())
        );
    }

    #[test]
    fn unsupported_environment_locks_before_start() {
        let mut h = harness_with(QuestionOrder::identity(1), &ProctorConfig::default());
        h.platform.set_fullscreen_api(false);
        let err = h.controller.begin_entry().unwrap_err();
        assert_eq!(err, EnvironmentError::FullscreenUnsupported);
        assert_eq!(h.controller.status(), AttemptStatus::Locked);
        assert_eq!(
            h.controller.lock_reason(),
            Some(LockReason::UnsupportedEnvironment)
        );
    }

    #[test]
    fn small_viewport_blocks_entry_without_locking() {
        let mut h = harness_with(QuestionOrder::identity(1), &ProctorConfig::default());
        h.platform.set_viewport(ViewportMetrics::uniform(300, 400));
        assert!(matches!(
            h.controller.begin_entry(),
            Err(EnvironmentError::ViewportTooSmall { .. })
        ));
        assert_eq!(h.controller.status(), AttemptStatus::NotStarted);
    }

    #[test]
    fn denied_fullscreen_keeps_waiting() {
        let mut h = harness_with(QuestionOrder::identity(1), &ProctorConfig::default());
        h.controller.begin_entry().unwrap();
        h.platform.deny_fullscreen("user gesture required");
        assert!(matches!(
            h.controller.confirm_fullscreen(),
            Err(EnvironmentError::FullscreenDenied(_))
        ));
        assert_eq!(h.controller.status(), AttemptStatus::AwaitingFullscreen);
    }

    #[test]
    fn incomplete_manual_submit_is_rejected_locally() {
        let mut h = started(3);
        h.controller.select_answer(0, 1).unwrap();
        let err = h.controller.begin_submit(SubmitTrigger::Manual).unwrap_err();
        assert!(matches!(err, SubmitError::Validation { first_unanswered: 1 }));
        assert_eq!(h.controller.status(), AttemptStatus::InProgress);
        // The latch is released: completing the answers allows submission.
        h.controller.select_answer(1, 0).unwrap();
        h.controller.select_answer(2, 3).unwrap();
        assert!(h.controller.begin_submit(SubmitTrigger::Manual).is_ok());
    }

    #[test]
    fn ticket_carries_canonical_answers() {
        let order = QuestionOrder::from_presented(vec![2, 0, 1]).unwrap();
        let mut h = harness_with(order, &ProctorConfig::default());
        h.controller.begin_entry().unwrap();
        h.controller.confirm_fullscreen().unwrap();
        h.controller.select_answer(0, 3).unwrap(); // canonical 2
        h.controller.select_answer(1, 1).unwrap(); // canonical 0
        h.controller.select_answer(2, 2).unwrap(); // canonical 1
        let ticket = h.controller.begin_submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(ticket.request().answers, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(ticket.request().reason, "Submitted by student");
    }

    #[test]
    fn second_trigger_loses_to_the_first() {
        let mut h = started(2);
        let first = h.controller.begin_submit(SubmitTrigger::TimeExpired).unwrap();
        assert_eq!(first.trigger(), SubmitTrigger::TimeExpired);
        assert!(matches!(
            h.controller.begin_submit(SubmitTrigger::MajorViolation(ViolationKind::TabSwitch)),
            Err(SubmitError::AlreadySubmitting)
        ));
        assert!(matches!(
            h.controller.begin_submit(SubmitTrigger::Manual),
            Err(SubmitError::AlreadySubmitting)
        ));
    }

    #[test]
    fn detectors_are_inert_after_submission_begins() {
        let mut h = started(1);
        let now = fixed_now();
        h.controller.begin_submit(SubmitTrigger::TimeExpired).unwrap();
        drain(&mut h.events);

        assert_eq!(h.controller.on_visibility_change(true, now), None);
        assert_eq!(h.controller.on_popstate(now), None);
        assert_eq!(h.controller.tick(), None);
        assert_eq!(
            h.controller.on_key(&KeyChord::ctrl('t'), now).verdict,
            KeyVerdict::Allow
        );
        assert_eq!(h.controller.violations(), 0);
        assert!(drain(&mut h.events).is_empty());
        assert!(h.controller.select_answer(0, 1).is_err());
    }

    #[test]
    fn timer_expiry_submits_partial_answers() {
        let mut h = started(3);
        h.controller.select_answer(0, 2).unwrap();
        h.controller.select_answer(2, 0).unwrap();
        let mut ticket = None;
        for _ in 0..60 {
            if let Some(t) = h.controller.tick() {
                ticket = Some(t);
                break;
            }
        }
        let ticket = ticket.expect("timer should expire after 60 ticks");
        assert_eq!(ticket.request().answers, vec![Some(2), None, Some(0)]);
        assert_eq!(ticket.request().reason, "Time expired");
    }

    #[test]
    fn minor_budget_counts_down_then_submits() {
        let mut h = started(1);
        let t0 = fixed_now();
        let first = h.controller.on_context_menu(t0);
        assert_eq!(first.verdict, KeyVerdict::Block);
        assert_eq!(first.submission, None);
        assert_eq!(h.controller.attempts_remaining(), 2);

        // Throttled: same kind inside 500ms is not counted.
        h.controller.on_context_menu(t0 + Duration::milliseconds(100));
        assert_eq!(h.controller.violations(), 1);

        h.controller.on_context_menu(t0 + Duration::seconds(1));
        let third = h.controller.on_context_menu(t0 + Duration::seconds(2));
        let ticket = third.submission.unwrap();
        assert_eq!(ticket.request().reason, "Reached maximum violations (3)");
        assert_eq!(h.controller.violations(), 3);
        assert_eq!(h.controller.attempts_remaining(), 0);
    }

    #[test]
    fn violation_notice_names_attempts_remaining() {
        let mut h = started(1);
        drain(&mut h.events);
        h.controller.on_key(&KeyChord::ctrl('s'), fixed_now());
        let events = drain(&mut h.events);
        assert!(events.contains(&SessionEvent::ViolationRecorded {
            kind: ViolationKind::SaveShortcut,
            remaining: Some(2),
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice(n) if n.message.ends_with("2 attempts remaining")
        )));
    }

    #[test]
    fn major_key_submits_immediately() {
        let mut h = started(2);
        let reaction = h.controller.on_key(&KeyChord::ctrl('n'), fixed_now());
        assert_eq!(reaction.verdict, KeyVerdict::Block);
        let ticket = reaction.submission.unwrap();
        assert_eq!(ticket.request().answers, vec![None, None]);
        assert_eq!(ticket.request().reason, "New tab or window shortcut");
    }

    #[test]
    fn copy_is_blocked_without_counting() {
        let mut h = started(1);
        let reaction = h.controller.on_key(&KeyChord::ctrl('c'), fixed_now());
        assert_eq!(reaction, Reaction::block(None));
        assert_eq!(h.controller.on_clipboard(), KeyVerdict::Block);
        assert_eq!(h.controller.violations(), 0);
    }

    #[test]
    fn fullscreen_exit_and_return_counts_once() {
        let mut h = started(1);
        drain(&mut h.events);
        let t0 = fixed_now();
        h.platform.set_fullscreen(false);
        h.controller.poll(t0);
        h.controller.on_fullscreen_change(false, t0 + Duration::milliseconds(10));
        h.platform.set_fullscreen(true);
        h.controller.poll(t0 + Duration::seconds(1));

        assert_eq!(h.controller.violations(), 1);
        let overlays: Vec<_> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::OverlayChanged(o) => Some(o),
                _ => None,
            })
            .collect();
        assert_eq!(
            overlays,
            vec![Some(crate::events::Overlay::FullscreenRequired), None]
        );
    }

    #[test]
    fn escape_then_exit_counts_only_the_key() {
        let mut h = started(1);
        let t0 = fixed_now();
        h.controller.on_key(&KeyChord::plain(Key::Escape), t0);
        h.controller
            .on_fullscreen_change(false, t0 + Duration::milliseconds(20));
        assert_eq!(h.controller.violations(), 1);
        assert_eq!(
            h.controller.violation_history()[0].kind,
            ViolationKind::EscapeKey
        );
    }

    #[test]
    fn focus_grace_escalates_to_major() {
        let mut h = started(1);
        let t0 = fixed_now();
        h.platform.set_focused(false);
        assert_eq!(h.controller.poll(t0), None);
        assert_eq!(h.controller.poll(t0 + Duration::seconds(2)), None);
        let ticket = h.controller.poll(t0 + Duration::seconds(5)).unwrap();
        assert_eq!(ticket.request().reason, "Window focus not regained");
    }

    #[test]
    fn focus_regained_in_time_is_silent() {
        let mut h = started(1);
        let t0 = fixed_now();
        h.platform.set_focused(false);
        h.controller.poll(t0);
        h.platform.set_focused(true);
        h.controller.poll(t0 + Duration::seconds(3));
        h.controller.poll(t0 + Duration::seconds(10));
        assert_eq!(h.controller.violations(), 0);
        assert_eq!(h.controller.status(), AttemptStatus::InProgress);
    }

    #[test]
    fn back_navigation_repushes_guard_and_submits() {
        let mut h = started(1);
        let ticket = h.controller.on_popstate(fixed_now()).unwrap();
        assert_eq!(h.platform.history_pushes(), 2);
        assert_eq!(ticket.request().reason, "Back button navigation attempted");
    }

    #[test]
    fn successful_delivery_finalizes_and_navigates() {
        let mut h = started(1);
        h.controller.select_answer(0, 1).unwrap();
        h.controller.begin_submit(SubmitTrigger::Manual).unwrap();
        drain(&mut h.events);
        let receipt = SubmitReceipt {
            score: Some(1),
            total: Some(1),
            message: "ok".into(),
        };
        h.controller.finish_submit(Ok(receipt.clone())).unwrap();

        assert_eq!(h.controller.status(), AttemptStatus::Submitted);
        assert_eq!(h.platform.fullscreen_exits(), 1);
        let key = format!("active_quiz_session:{}", h.controller.session().quiz().id());
        assert_eq!(h.store.get(&key).unwrap(), None);
        assert_eq!(
            drain(&mut h.events),
            vec![
                SessionEvent::ActiveChanged(false),
                SessionEvent::Navigate(Destination::Results(receipt)),
            ]
        );
    }

    #[test]
    fn manual_network_failure_allows_retry_of_same_ticket() {
        let mut h = started(1);
        h.controller.select_answer(0, 1).unwrap();
        let first = h.controller.begin_submit(SubmitTrigger::Manual).unwrap();
        let err = h
            .controller
            .finish_submit(Err(SubmitError::Network(crate::error::ApiError::HttpStatus(
                reqwest::StatusCode::BAD_GATEWAY,
            ))))
            .unwrap_err();
        assert!(matches!(err, SubmitError::Network(_)));
        assert_eq!(h.controller.status(), AttemptStatus::Submitting);
        assert!(h.controller.retry_pending());

        let retry = h.controller.begin_submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(retry, first);
    }

    #[test]
    fn auto_network_failure_locks() {
        let mut h = started(1);
        h.controller.begin_submit(SubmitTrigger::TimeExpired).unwrap();
        h.controller
            .finish_submit(Err(SubmitError::Network(crate::error::ApiError::Decode(
                "eof".into(),
            ))))
            .unwrap_err();
        assert_eq!(h.controller.status(), AttemptStatus::Locked);
        assert_eq!(h.controller.lock_reason(), Some(LockReason::DeliveryFailed));
    }

    #[test]
    fn conflict_after_auto_submit_counts_as_submitted() {
        let mut h = started(1);
        h.controller.begin_submit(SubmitTrigger::TimeExpired).unwrap();
        let receipt = h.controller.finish_submit(Err(SubmitError::Conflict)).unwrap();
        assert_eq!(receipt, SubmitReceipt::recorded_elsewhere());
        assert_eq!(h.controller.status(), AttemptStatus::Submitted);
    }

    #[test]
    fn expired_credential_locks_and_sends_to_login() {
        let mut h = started(1);
        h.controller.select_answer(0, 0).unwrap();
        h.controller.begin_submit(SubmitTrigger::Manual).unwrap();
        drain(&mut h.events);
        h.controller.finish_submit(Err(SubmitError::Auth)).unwrap_err();
        assert_eq!(h.controller.status(), AttemptStatus::Locked);
        assert!(drain(&mut h.events).contains(&SessionEvent::Navigate(Destination::Login)));
    }

    #[test]
    fn late_credential_failure_does_not_preempt_delivery() {
        let mut h = started(1);
        h.controller.begin_submit(SubmitTrigger::TimeExpired).unwrap();

        assert!(!h.controller.lock_if_active(LockReason::AuthExpired));
        assert_eq!(h.controller.status(), AttemptStatus::Submitting);
        assert_eq!(h.controller.lock_reason(), None);

        let receipt = SubmitReceipt {
            score: Some(0),
            total: Some(1),
            message: "ok".into(),
        };
        h.controller.finish_submit(Ok(receipt.clone())).unwrap();
        assert_eq!(h.controller.status(), AttemptStatus::Submitted);
        assert_eq!(h.controller.receipt(), Some(&receipt));
    }

    #[test]
    fn credential_failure_locks_active_attempt() {
        let mut h = started(1);
        assert!(h.controller.lock_if_active(LockReason::AuthExpired));
        assert_eq!(h.controller.status(), AttemptStatus::Locked);
        assert_eq!(h.controller.lock_reason(), Some(LockReason::AuthExpired));
    }

    #[test]
    fn losing_tab_keeps_winner_claim_on_teardown() {
        let mut h = started(1);
        let key = format!("active_quiz_session:{}", h.controller.session().quiz().id());
        h.store.set(&key, "other-session").unwrap();
        let ticket = h.controller.check_instance_lock(fixed_now()).unwrap();
        assert_eq!(ticket.request().reason, "Multiple quiz instances detected");
        h.controller
            .finish_submit(Ok(SubmitReceipt::recorded_elsewhere()))
            .unwrap();
        assert_eq!(h.store.get(&key).unwrap().as_deref(), Some("other-session"));
        assert_ne!(h.controller.session().id(), &SessionId::from_raw("other-session"));
    }

    #[tokio::test]
    async fn teardown_aborts_registered_tasks() {
        let mut h = started(1);
        let task = tokio::spawn(std::future::pending::<()>());
        h.controller.register_task(task.abort_handle());
        h.controller.begin_submit(SubmitTrigger::TimeExpired).unwrap();
        assert!(task.await.unwrap_err().is_cancelled());

        let late = tokio::spawn(std::future::pending::<()>());
        h.controller.register_task(late.abort_handle());
        assert!(late.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn remaining_time_is_worded_naturally() {
        assert_eq!(format_remaining(300), "5 minutes");
        assert_eq!(format_remaining(60), "1 minute");
        assert_eq!(format_remaining(30), "30 seconds");
    }
}
