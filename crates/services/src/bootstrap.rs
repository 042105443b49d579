use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use quiz_core::model::{AnswerSheet, Question, QuestionOrder, QuizId, QuizSnapshot, SessionId};

use crate::Clock;
use crate::api::{QuizApi, QuizPayload};
use crate::error::BootstrapError;

/// Who is opening the quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Reviewer,
}

/// Freshly created attempt, before the controller takes ownership of it.
pub struct AttemptSession {
    id: SessionId,
    quiz: QuizSnapshot,
    order: QuestionOrder,
    answers: AnswerSheet,
    started_at: DateTime<Utc>,
    time_limit_secs: u32,
}

impl AttemptSession {
    /// Assemble a session from already-validated parts.
    ///
    /// `order` must cover exactly the quiz's questions.
    #[must_use]
    pub fn new(quiz: QuizSnapshot, order: QuestionOrder, started_at: DateTime<Utc>) -> Self {
        let id = SessionId::generate(quiz.id(), started_at);
        let answers = AnswerSheet::new(quiz.question_count());
        let time_limit_secs = quiz.time_limit_secs();
        Self {
            id,
            quiz,
            order,
            answers,
            started_at,
            time_limit_secs,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizSnapshot {
        &self.quiz
    }

    #[must_use]
    pub fn order(&self) -> &QuestionOrder {
        &self.order
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    pub(crate) fn answers_mut(&mut self) -> &mut AnswerSheet {
        &mut self.answers
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    /// Question shown at `presented` position.
    #[must_use]
    pub fn presented_question(&self, presented: usize) -> Option<&Question> {
        let canonical = self.order.canonical_index(presented)?;
        self.quiz.questions().get(canonical)
    }
}

impl fmt::Debug for AttemptSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptSession")
            .field("id", &self.id)
            .field("quiz_id", self.quiz.id())
            .field("questions", &self.quiz.question_count())
            .field("answered", &self.answers.answered_count())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Read-only quiz for reviewers: canonical order, answers visible, no timer.
#[derive(Debug, Clone)]
pub struct ReviewView {
    pub quiz: QuizSnapshot,
}

#[derive(Debug)]
pub enum Bootstrapped {
    Attempt(AttemptSession),
    Review(ReviewView),
}

/// Fetches a quiz and turns it into an attempt (or a review view).
#[derive(Clone)]
pub struct SessionBootstrapper {
    clock: Clock,
    api: Arc<dyn QuizApi>,
}

impl SessionBootstrapper {
    #[must_use]
    pub fn new(clock: Clock, api: Arc<dyn QuizApi>) -> Self {
        Self { clock, api }
    }

    /// Fetch the quiz and prepare a session for `role`.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::AlreadyAttempted` for a student who already
    /// took the quiz, and maps backend failures onto the other variants.
    pub async fn fetch_session(
        &self,
        quiz_id: &QuizId,
        token: &str,
        role: Role,
    ) -> Result<Bootstrapped, BootstrapError> {
        debug!(%quiz_id, ?role, "fetching quiz");
        let payload = self.api.get_quiz(quiz_id, token).await?;
        self.prepare(quiz_id.clone(), payload, role, &mut rand::rng())
    }

    /// Turn a fetched payload into a session using `rng` for the shuffle.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::AlreadyAttempted` or `BootstrapError::InvalidQuiz`.
    pub fn prepare<R: Rng + ?Sized>(
        &self,
        quiz_id: QuizId,
        payload: QuizPayload,
        role: Role,
        rng: &mut R,
    ) -> Result<Bootstrapped, BootstrapError> {
        match role {
            Role::Reviewer => {
                let quiz = payload.into_snapshot(quiz_id)?;
                Ok(Bootstrapped::Review(ReviewView { quiz }))
            }
            Role::Student => {
                if payload.has_attempted_by_current_user {
                    info!(%quiz_id, "refusing second attempt");
                    return Err(BootstrapError::AlreadyAttempted);
                }
                let quiz = payload.into_snapshot(quiz_id)?.for_student();
                let order = QuestionOrder::shuffled(quiz.question_count(), rng);
                let session = AttemptSession::new(quiz, order, self.clock.now());
                info!(
                    session_id = %session.id(),
                    questions = session.quiz().question_count(),
                    time_limit_secs = session.time_limit_secs(),
                    "attempt session created"
                );
                Ok(Bootstrapped::Attempt(session))
            }
        }
    }
}
