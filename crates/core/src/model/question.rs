use thiserror::Error;

use crate::model::ids::QuizId;

/// Every question carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question must have exactly 4 options, got {0}")]
    OptionCount(usize),

    #[error("option {index} is empty")]
    EmptyOption { index: usize },

    #[error("correct option index {0} is out of range")]
    CorrectOutOfRange(u8),

    #[error("quiz has no questions")]
    NoQuestions,

    #[error("quiz timer must be at least one minute")]
    InvalidTimer,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// One answer option: text with an optional image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOption {
    text: String,
    image: Option<String>,
}

impl QuestionOption {
    #[must_use]
    pub fn new(text: impl Into<String>, image: Option<String>) -> Self {
        Self {
            text: text.into(),
            image: image.filter(|url| !url.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}

/// A multiple-choice question in canonical (authored) form.
///
/// `correct` is only populated for roles allowed to see it; student snapshots
/// are stripped with [`QuizSnapshot::for_student`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    prompt: String,
    image: Option<String>,
    options: [QuestionOption; OPTION_COUNT],
    correct: Option<u8>,
}

impl Question {
    /// Validate and build a question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is empty, the option count is not 4,
    /// an option has neither text nor image, or `correct` is out of range.
    pub fn new(
        prompt: impl Into<String>,
        image: Option<String>,
        options: Vec<QuestionOption>,
        correct: Option<u8>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        let image = image.filter(|url| !url.trim().is_empty());
        if prompt.trim().is_empty() && image.is_none() {
            return Err(QuestionError::EmptyPrompt);
        }
        if let Some(index) = options.iter().position(QuestionOption::is_blank) {
            return Err(QuestionError::EmptyOption { index });
        }
        let len = options.len();
        let options: [QuestionOption; OPTION_COUNT] = options
            .try_into()
            .map_err(|_| QuestionError::OptionCount(len))?;
        if let Some(idx) = correct {
            if usize::from(idx) >= OPTION_COUNT {
                return Err(QuestionError::CorrectOutOfRange(idx));
            }
        }

        Ok(Self {
            prompt,
            image,
            options,
            correct,
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &[QuestionOption; OPTION_COUNT] {
        &self.options
    }

    #[must_use]
    pub fn correct(&self) -> Option<u8> {
        self.correct
    }

    fn without_correct(mut self) -> Self {
        self.correct = None;
        self
    }
}

//
// ─── QUIZ SNAPSHOT ─────────────────────────────────────────────────────────────
//

/// Immutable copy of a quiz as fetched at the start of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSnapshot {
    id: QuizId,
    title: String,
    subject: String,
    timer_minutes: u32,
    questions: Vec<Question>,
}

impl QuizSnapshot {
    /// # Errors
    ///
    /// Returns `QuestionError::NoQuestions` for an empty quiz and
    /// `QuestionError::InvalidTimer` for a zero-minute timer.
    pub fn new(
        id: QuizId,
        title: impl Into<String>,
        subject: impl Into<String>,
        timer_minutes: u32,
        questions: Vec<Question>,
    ) -> Result<Self, QuestionError> {
        if questions.is_empty() {
            return Err(QuestionError::NoQuestions);
        }
        if timer_minutes == 0 {
            return Err(QuestionError::InvalidTimer);
        }
        Ok(Self {
            id,
            title: title.into(),
            subject: subject.into(),
            timer_minutes,
            questions,
        })
    }

    /// Drop every correct-option index so nothing answer-revealing stays in
    /// memory for a student attempt.
    #[must_use]
    pub fn for_student(self) -> Self {
        Self {
            questions: self
                .questions
                .into_iter()
                .map(Question::without_correct)
                .collect(),
            ..self
        }
    }

    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn timer_minutes(&self) -> u32 {
        self.timer_minutes
    }

    /// Total attempt duration in seconds.
    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.timer_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}
