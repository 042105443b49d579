//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AnswerError, OrderError, QuestionError, TransitionError};
use storage::StorageError;

/// Errors returned by the quiz backend collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("credential rejected")]
    Unauthorized,
    #[error("access to the quiz is forbidden")]
    Forbidden,
    #[error("quiz not found")]
    NotFound,
    #[error("request rejected: {0}")]
    BadRequest(String),
    #[error("attempt already submitted")]
    Conflict,
    #[error("quiz backend responded with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Errors emitted by `SessionBootstrapper`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BootstrapError {
    #[error("this quiz has already been attempted")]
    AlreadyAttempted,
    #[error("quiz not found or not accessible")]
    NotFound,
    #[error("not signed in or session expired")]
    Unauthorized,
    #[error(transparent)]
    Network(ApiError),
    #[error(transparent)]
    InvalidQuiz(#[from] QuestionError),
}

impl From<ApiError> for BootstrapError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::Forbidden | ApiError::NotFound => Self::NotFound,
            other => Self::Network(other),
        }
    }
}

/// Submission outcomes that did not produce a receipt.
///
/// Mirrors the attempt error taxonomy: validation is local and recoverable,
/// auth and conflict end the attempt, network is retryable for manual
/// submissions only.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmitError {
    #[error("question {} is unanswered", .first_unanswered + 1)]
    Validation { first_unanswered: usize },
    #[error("credential expired during submission")]
    Auth,
    #[error("attempt was already submitted")]
    Conflict,
    #[error("submission request failed: {0}")]
    Network(ApiError),
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("attempt is not accepting submissions ({0})")]
    NotActive(quiz_core::model::AttemptStatus),
    #[error("submission task was interrupted")]
    Interrupted,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Environment problems that block entry before the attempt starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnvironmentError {
    #[error("fullscreen is not supported in this environment")]
    FullscreenUnsupported,
    #[error("this browser or device is not supported")]
    Unsupported,
    #[error("viewport {width}x{height} is below the required {min_width}x{min_height}")]
    ViewportTooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("fullscreen request was denied: {0}")]
    FullscreenDenied(String),
    #[error("fullscreen is required to start the attempt")]
    FullscreenRequired,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Errors emitted by `TokenRefresher`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    #[error("no credential is stored")]
    Missing,
    #[error("credential is not a readable JWT: {0}")]
    Malformed(String),
    #[error("credential refresh was rejected")]
    Unauthorized,
    #[error(transparent)]
    Network(ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TokenError {
    /// Whether the attempt can no longer be authenticated at all.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Missing | Self::Malformed(_) | Self::Unauthorized)
    }
}

/// Errors returned when an answer cannot be recorded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnswerRejected {
    #[error("answers are locked ({0})")]
    NotActive(quiz_core::model::AttemptStatus),
    #[error(transparent)]
    Answer(#[from] AnswerError),
}

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("max violations must be between 1 and 10")]
    InvalidMaxViolations,
    #[error("grace periods must be between 1 and 60 seconds")]
    InvalidGracePeriod,
    #[error("poll interval must be between 100 ms and 10 s")]
    InvalidPollInterval,
    #[error("invalid value for {key}: {raw}")]
    InvalidEnv { key: &'static str, raw: String },
    #[error("invalid API base URL")]
    InvalidBaseUrl,
}
