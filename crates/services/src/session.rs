//! Async driver around [`ProctorController`].
//!
//! Owns the background loops (countdown, polled detectors, credential
//! refresh) and runs deliveries on detached tasks so a torn-down loop can
//! never cancel a submission in flight.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use quiz_core::Clock;
use quiz_core::model::{AttemptStatus, LockReason, SessionId};
use storage::{ActiveSessionLock, CredentialSlot, Storage};

use crate::api::{QuizApi, SubmitReceipt};
use crate::bootstrap::AttemptSession;
use crate::config::ProctorConfig;
use crate::controller::ProctorController;
use crate::error::{AnswerRejected, EnvironmentError, SubmitError};
use crate::events::{EventBus, SessionEvent};
use crate::integrity::{KeyChord, KeyVerdict};
use crate::platform::ProctorPlatform;
use crate::submission::{SubmissionCoordinator, SubmissionTicket, SubmitTrigger};
use crate::token::TokenRefresher;

/// Push-based input from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    Fullscreen(bool),
    Visibility { hidden: bool },
    Focus(bool),
    Key(KeyChord),
    ContextMenu,
    Clipboard,
    PopState,
}

/// Snapshot of the attempt for host rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub status: AttemptStatus,
    pub lock_reason: Option<LockReason>,
    pub remaining_secs: u32,
    pub violations: u32,
    pub attempts_remaining: u32,
    pub answers: Vec<Option<u8>>,
    pub retry_pending: bool,
}

/// Collaborators a session needs besides the attempt itself.
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn QuizApi>,
    pub platform: Arc<dyn ProctorPlatform>,
    pub storage: Storage,
    pub config: ProctorConfig,
    pub clock: Clock,
}

struct Inner {
    controller: Mutex<ProctorController>,
    coordinator: SubmissionCoordinator,
    refresher: TokenRefresher,
    config: ProctorConfig,
    clock: Clock,
}

impl Inner {
    fn with<T>(&self, f: impl FnOnce(&mut ProctorController) -> T) -> T {
        let mut controller = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut controller)
    }

    /// Deliver `ticket` on a task nothing else owns.
    fn dispatch(
        self: &Arc<Self>,
        ticket: SubmissionTicket,
    ) -> JoinHandle<Result<SubmitReceipt, SubmitError>> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.coordinator.transmit(&ticket).await;
            inner.with(|c| c.finish_submit(result))
        })
    }

    fn dispatch_detached(self: &Arc<Self>, ticket: Option<SubmissionTicket>) {
        if let Some(ticket) = ticket {
            drop(self.dispatch(ticket));
        }
    }
}

/// A running attempt. Clones share the same attempt.
#[derive(Clone)]
pub struct ProctorSession {
    inner: Arc<Inner>,
    events: EventBus,
    status_rx: watch::Receiver<AttemptStatus>,
}

impl ProctorSession {
    #[must_use]
    pub fn new(session: AttemptSession, deps: SessionDeps) -> Self {
        let events = EventBus::new(deps.config.notice_ttl());
        let shared = Arc::clone(&deps.storage.shared);
        let instance_lock =
            ActiveSessionLock::new(Arc::clone(&shared), session.quiz().id(), session.id().clone());
        let credentials = CredentialSlot::new(shared);
        let controller = ProctorController::new(
            session,
            &deps.config,
            deps.platform,
            events.clone(),
            instance_lock,
        );
        let status_rx = controller.subscribe_status();
        let inner = Arc::new(Inner {
            controller: Mutex::new(controller),
            coordinator: SubmissionCoordinator::new(Arc::clone(&deps.api), credentials.clone()),
            refresher: TokenRefresher::new(
                deps.api,
                credentials,
                deps.config.token_refresh_threshold(),
            ),
            config: deps.config,
            clock: deps.clock,
        });
        Self {
            inner,
            events,
            status_rx,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Run the entry checks, enter fullscreen and start the background loops.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the `EnvironmentError` that kept the attempt from starting.
    pub fn start(&self) -> Result<(), EnvironmentError> {
        self.inner.with(|c| {
            if c.status() == AttemptStatus::NotStarted {
                c.begin_entry()?;
            }
            c.confirm_fullscreen()
        })?;

        let handles = [self.spawn_countdown(), self.spawn_poller(), self.spawn_refresher()];
        self.inner.with(|c| {
            for handle in handles {
                c.register_task(handle.abort_handle());
            }
        });
        Ok(())
    }

    fn spawn_countdown(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = time::interval(std::time::Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Some(ticket) = inner.with(ProctorController::tick) {
                    drop(inner.dispatch(ticket));
                    break;
                }
            }
        })
    }

    fn spawn_poller(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = time::interval(inner.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let now = inner.clock.now();
                if let Some(ticket) = inner.with(|c| c.poll(now)) {
                    drop(inner.dispatch(ticket));
                    break;
                }
            }
        })
    }

    fn spawn_refresher(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut interval = time::interval(inner.config.token_check_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match inner.refresher.check(inner.clock.now()).await {
                    Ok(check) => debug!(?check, "credential checked"),
                    Err(err) if err.is_unrecoverable() => {
                        warn!(error = %err, "credential can no longer be refreshed");
                        inner.with(|c| c.lock_if_active(LockReason::AuthExpired));
                        break;
                    }
                    Err(err) => warn!(error = %err, "credential refresh failed, will retry"),
                }
            }
        })
    }

    /// Forward a host event. The verdict tells the host whether to cancel
    /// the event's default action.
    pub fn signal(&self, signal: HostSignal) -> KeyVerdict {
        let now = self.inner.clock.now();
        let (verdict, ticket) = self.inner.with(|c| match signal {
            HostSignal::Fullscreen(fullscreen) => {
                (KeyVerdict::Allow, c.on_fullscreen_change(fullscreen, now))
            }
            HostSignal::Visibility { hidden } => {
                (KeyVerdict::Allow, c.on_visibility_change(hidden, now))
            }
            HostSignal::Focus(focused) => (KeyVerdict::Allow, c.on_focus_change(focused, now)),
            HostSignal::Key(chord) => {
                let reaction = c.on_key(&chord, now);
                (reaction.verdict, reaction.submission)
            }
            HostSignal::ContextMenu => {
                let reaction = c.on_context_menu(now);
                (reaction.verdict, reaction.submission)
            }
            HostSignal::Clipboard => (c.on_clipboard(), None),
            HostSignal::PopState => (KeyVerdict::Allow, c.on_popstate(now)),
        });
        self.inner.dispatch_detached(ticket);
        verdict
    }

    /// Run every polled detector once, outside the regular poll loop.
    pub fn poll_now(&self) {
        let now = self.inner.clock.now();
        let ticket = self.inner.with(|c| c.poll(now));
        self.inner.dispatch_detached(ticket);
    }

    /// # Errors
    ///
    /// Rejected once the attempt is no longer in progress.
    pub fn select_answer(&self, presented: usize, option: u8) -> Result<(), AnswerRejected> {
        self.inner.with(|c| c.select_answer(presented, option))
    }

    /// Manual submission. Resolves once the primary request has settled.
    ///
    /// # Errors
    ///
    /// `Validation` without any request for incomplete answers,
    /// `AlreadySubmitting` if another submission holds the latch, or the
    /// delivery error.
    pub async fn submit(&self) -> Result<SubmitReceipt, SubmitError> {
        let ticket = self.inner.with(|c| c.begin_submit(SubmitTrigger::Manual))?;
        self.inner
            .dispatch(ticket)
            .await
            .map_err(|_| SubmitError::Interrupted)?
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.with(|c| SessionStatus {
            session_id: c.session().id().clone(),
            status: c.status(),
            lock_reason: c.lock_reason(),
            remaining_secs: c.remaining_secs(),
            violations: c.violations(),
            attempts_remaining: c.attempts_remaining(),
            answers: c.session().answers().as_slice().to_vec(),
            retry_pending: c.retry_pending(),
        })
    }

    /// Borrow the controller for read-only inspection.
    pub fn inspect<T>(&self, f: impl FnOnce(&ProctorController) -> T) -> T {
        self.inner.with(|c| f(c))
    }

    /// Wait until the attempt reaches `Submitted` or `Locked`.
    pub async fn finished(&self) -> AttemptStatus {
        let mut rx = self.status_rx.clone();
        match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.inner.with(|c| c.status()),
        }
    }
}
