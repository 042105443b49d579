//! In-process fakes for the backend and the host platform.
//!
//! Compiled for unit tests and behind the `test-support` feature, which the
//! integration tests under `tests/` enable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

use quiz_core::model::{Question, QuestionOption, QuizId, QuizSnapshot};

use crate::api::{OptionPayload, QuestionPayload, QuizApi, QuizPayload, SubmitAttemptRequest, SubmitReceipt};
use crate::error::{ApiError, EnvironmentError};
use crate::platform::{EnvironmentSnapshot, PlatformCapabilities, ProctorPlatform, ViewportMetrics};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unsigned JWT whose payload carries only `exp`.
#[must_use]
pub fn jwt_expiring_at(at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, at.timestamp()));
    format!("{header}.{payload}.sig")
}

/// Quiz with `questions` four-option questions; option 0 is always correct.
#[must_use]
pub fn quiz_payload(questions: usize, timer_minutes: u32) -> QuizPayload {
    QuizPayload {
        title: "Practice quiz".into(),
        subject: "General".into(),
        timer_minutes,
        has_attempted_by_current_user: false,
        questions: (0..questions)
            .map(|i| QuestionPayload {
                prompt: format!("Question {}", i + 1),
                image: None,
                options: ["A", "B", "C", "D"]
                    .into_iter()
                    .map(|t| OptionPayload::Text(format!("{t}{}", i + 1)))
                    .collect(),
                correct_answer: Some(0),
            })
            .collect(),
    }
}

/// Student-facing snapshot with `questions` questions.
///
/// # Panics
///
/// Panics if `questions` or `timer_minutes` is zero.
#[must_use]
pub fn quiz_snapshot(quiz_id: &str, questions: usize, timer_minutes: u32) -> QuizSnapshot {
    let questions = (0..questions)
        .map(|i| {
            let options = (0..4)
                .map(|o| QuestionOption::new(format!("option {o}"), None))
                .collect();
            Question::new(format!("Question {}", i + 1), None, options, None)
                .expect("fixture question is valid")
        })
        .collect();
    QuizSnapshot::new(QuizId::new(quiz_id), "Practice quiz", "General", timer_minutes, questions)
        .expect("fixture quiz is valid")
}

//
// ─── QUIZ API ──────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct FakeApiState {
    quiz: Mutex<Option<QuizPayload>>,
    quiz_failures: Mutex<VecDeque<ApiError>>,
    submit_script: Mutex<VecDeque<Result<SubmitReceipt, ApiError>>>,
    refresh_script: Mutex<VecDeque<Result<String, ApiError>>>,
    primary: Mutex<Vec<SubmitAttemptRequest>>,
    redundant: Mutex<Vec<SubmitAttemptRequest>>,
    refresh_calls: Mutex<usize>,
    submit_delay: Mutex<Option<Duration>>,
}

/// Recording `QuizApi`. Clones share state.
///
/// Unscripted submissions succeed with the answered count as the score;
/// unscripted refreshes are rejected.
#[derive(Clone, Default)]
pub struct FakeQuizApi {
    state: Arc<FakeApiState>,
}

impl FakeQuizApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quiz(payload: QuizPayload) -> Self {
        let api = Self::new();
        *guard(&api.state.quiz) = Some(payload);
        api
    }

    pub fn fail_get_quiz(&self, err: ApiError) {
        guard(&self.state.quiz_failures).push_back(err);
    }

    pub fn script_submit(&self, result: Result<SubmitReceipt, ApiError>) {
        guard(&self.state.submit_script).push_back(result);
    }

    pub fn script_refresh(&self, result: Result<String, ApiError>) {
        guard(&self.state.refresh_script).push_back(result);
    }

    /// Hold every primary submission for `delay` before answering.
    pub fn delay_submissions(&self, delay: Duration) {
        *guard(&self.state.submit_delay) = Some(delay);
    }

    #[must_use]
    pub fn primary_requests(&self) -> Vec<SubmitAttemptRequest> {
        guard(&self.state.primary).clone()
    }

    #[must_use]
    pub fn redundant_requests(&self) -> Vec<SubmitAttemptRequest> {
        guard(&self.state.redundant).clone()
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        *guard(&self.state.refresh_calls)
    }
}

#[async_trait]
impl QuizApi for FakeQuizApi {
    async fn get_quiz(&self, _quiz_id: &QuizId, _token: &str) -> Result<QuizPayload, ApiError> {
        if let Some(err) = guard(&self.state.quiz_failures).pop_front() {
            return Err(err);
        }
        guard(&self.state.quiz).clone().ok_or(ApiError::NotFound)
    }

    async fn submit_attempt(
        &self,
        request: &SubmitAttemptRequest,
        _token: &str,
    ) -> Result<SubmitReceipt, ApiError> {
        guard(&self.state.primary).push(request.clone());
        let delay = *guard(&self.state.submit_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = guard(&self.state.submit_script).pop_front();
        scripted.unwrap_or_else(|| {
            let answered = request.answers.iter().filter(|a| a.is_some()).count();
            Ok(SubmitReceipt {
                score: u32::try_from(answered).ok(),
                total: u32::try_from(request.answers.len()).ok(),
                message: "Quiz submitted".into(),
            })
        })
    }

    async fn send_redundant(
        &self,
        request: &SubmitAttemptRequest,
        _token: &str,
    ) -> Result<(), ApiError> {
        guard(&self.state.redundant).push(request.clone());
        Ok(())
    }

    async fn refresh_token(&self, _token: &str) -> Result<String, ApiError> {
        *guard(&self.state.refresh_calls) += 1;
        guard(&self.state.refresh_script)
            .pop_front()
            .unwrap_or(Err(ApiError::Unauthorized))
    }
}

//
// ─── PLATFORM ──────────────────────────────────────────────────────────────────
//

struct FakePlatformState {
    capabilities: PlatformCapabilities,
    snapshot: EnvironmentSnapshot,
    fullscreen_denial: Option<String>,
    history_pushes: usize,
    fullscreen_exits: usize,
}

/// Scriptable host platform. Starts capable, visible, focused and not yet
/// fullscreen; `request_fullscreen` succeeds unless denied.
pub struct FakePlatform {
    state: Mutex<FakePlatformState>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakePlatformState {
                capabilities: PlatformCapabilities {
                    fullscreen_api: true,
                    supported_environment: true,
                },
                snapshot: EnvironmentSnapshot {
                    fullscreen: false,
                    ..EnvironmentSnapshot::default()
                },
                fullscreen_denial: None,
                history_pushes: 0,
                fullscreen_exits: 0,
            }),
        }
    }

    pub fn set_fullscreen_api(&self, available: bool) {
        guard(&self.state).capabilities.fullscreen_api = available;
    }

    pub fn set_supported(&self, supported: bool) {
        guard(&self.state).capabilities.supported_environment = supported;
    }

    pub fn deny_fullscreen(&self, reason: impl Into<String>) {
        guard(&self.state).fullscreen_denial = Some(reason.into());
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        guard(&self.state).snapshot.fullscreen = fullscreen;
    }

    pub fn set_hidden(&self, hidden: bool) {
        guard(&self.state).snapshot.hidden = hidden;
    }

    pub fn set_focused(&self, focused: bool) {
        guard(&self.state).snapshot.focused = focused;
    }

    pub fn set_viewport(&self, viewport: ViewportMetrics) {
        guard(&self.state).snapshot.viewport = viewport;
    }

    #[must_use]
    pub fn history_pushes(&self) -> usize {
        guard(&self.state).history_pushes
    }

    #[must_use]
    pub fn fullscreen_exits(&self) -> usize {
        guard(&self.state).fullscreen_exits
    }
}

impl ProctorPlatform for FakePlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        guard(&self.state).capabilities
    }

    fn snapshot(&self) -> EnvironmentSnapshot {
        guard(&self.state).snapshot
    }

    fn request_fullscreen(&self) -> Result<(), EnvironmentError> {
        let mut state = guard(&self.state);
        if let Some(reason) = &state.fullscreen_denial {
            return Err(EnvironmentError::FullscreenDenied(reason.clone()));
        }
        state.snapshot.fullscreen = true;
        Ok(())
    }

    fn exit_fullscreen(&self) {
        let mut state = guard(&self.state);
        state.snapshot.fullscreen = false;
        state.fullscreen_exits += 1;
    }

    fn push_history_guard(&self) {
        guard(&self.state).history_pushes += 1;
    }
}
