//! Quiz backend collaborator: the three endpoints an attempt needs.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use quiz_core::model::{Question, QuestionError, QuestionOption, QuizId, QuizSnapshot, SessionId};

use crate::config::ApiConfig;
use crate::error::ApiError;

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

/// Quiz as returned by `GET /quizzes/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizPayload {
    pub title: String,
    #[serde(default)]
    pub subject: String,
    pub timer_minutes: u32,
    #[serde(default)]
    pub has_attempted_by_current_user: bool,
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    #[serde(alias = "question")]
    pub prompt: String,
    #[serde(default)]
    pub image: Option<String>,
    pub options: Vec<OptionPayload>,
    #[serde(default)]
    pub correct_answer: Option<u8>,
}

/// Options arrive either as bare strings or as `{ text, image }` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionPayload {
    Text(String),
    Rich {
        #[serde(default)]
        text: String,
        #[serde(default)]
        image: Option<String>,
    },
}

impl QuizPayload {
    /// Validate the payload into a domain snapshot.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if any question is malformed.
    pub fn into_snapshot(self, quiz_id: QuizId) -> Result<QuizSnapshot, QuestionError> {
        let questions = self
            .questions
            .into_iter()
            .map(|q| {
                let options = q
                    .options
                    .into_iter()
                    .map(|opt| match opt {
                        OptionPayload::Text(text) => QuestionOption::new(text, None),
                        OptionPayload::Rich { text, image } => QuestionOption::new(text, image),
                    })
                    .collect();
                Question::new(q.prompt, q.image, options, q.correct_answer)
            })
            .collect::<Result<Vec<_>, _>>()?;
        QuizSnapshot::new(quiz_id, self.title, self.subject, self.timer_minutes, questions)
    }
}

/// Body of `POST /quizzes/{id}/submit`. Answers are in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    pub quiz_id: QuizId,
    pub answers: Vec<Option<u8>>,
    pub session_id: SessionId,
    pub reason: String,
}

/// Result of a recorded attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitReceipt {
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub message: String,
}

impl SubmitReceipt {
    /// Receipt for an attempt the backend already holds from an earlier
    /// (redundant) delivery; the score is not known here.
    #[must_use]
    pub fn recorded_elsewhere() -> Self {
        Self {
            score: None,
            total: None,
            message: "Attempt already recorded".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

//
// ─── CONTRACT ──────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait QuizApi: Send + Sync {
    /// # Errors
    ///
    /// `Unauthorized` for a bad token, `Forbidden`/`NotFound` for no access.
    async fn get_quiz(&self, quiz_id: &QuizId, token: &str) -> Result<QuizPayload, ApiError>;

    /// Primary submission.
    ///
    /// # Errors
    ///
    /// `BadRequest` for incomplete answers, `Unauthorized` for an expired
    /// token, `Conflict` if already submitted.
    async fn submit_attempt(
        &self,
        request: &SubmitAttemptRequest,
        token: &str,
    ) -> Result<SubmitReceipt, ApiError>;

    /// Best-effort duplicate of an auto-submission. Callers ignore the result.
    ///
    /// # Errors
    ///
    /// Same as `submit_attempt`.
    async fn send_redundant(
        &self,
        request: &SubmitAttemptRequest,
        token: &str,
    ) -> Result<(), ApiError> {
        self.submit_attempt(request, token).await.map(|_| ())
    }

    /// # Errors
    ///
    /// `Unauthorized` when the credential can no longer be refreshed.
    async fn refresh_token(&self, token: &str) -> Result<String, ApiError>;
}

//
// ─── HTTP CLIENT ───────────────────────────────────────────────────────────────
//

#[derive(Clone)]
pub struct HttpQuizApi {
    client: Client,
    config: ApiConfig,
}

impl HttpQuizApi {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::CONFLICT => ApiError::Conflict,
        StatusCode::BAD_REQUEST => {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_default();
            ApiError::BadRequest(message)
        }
        other => ApiError::HttpStatus(other),
    })
}

#[async_trait]
impl QuizApi for HttpQuizApi {
    async fn get_quiz(&self, quiz_id: &QuizId, token: &str) -> Result<QuizPayload, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("quizzes/{quiz_id}")))
            .bearer_auth(token)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn submit_attempt(
        &self,
        request: &SubmitAttemptRequest,
        token: &str,
    ) -> Result<SubmitReceipt, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("quizzes/{}/submit", request.quiz_id)))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_redundant(
        &self,
        request: &SubmitAttemptRequest,
        token: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("quizzes/{}/submit", request.quiz_id)))
            .bearer_auth(token)
            .header("X-Submit-Delivery", "redundant")
            .json(request)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn refresh_token(&self, token: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url("auth/refresh-token"))
            .bearer_auth(token)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(body.token)
    }
}
