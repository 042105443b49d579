//! Exactly-once delivery of a sealed attempt.
//!
//! The controller seals the answers into a [`SubmissionTicket`] while still
//! holding its lock; the coordinator only moves that ticket over the wire.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use quiz_core::model::{QuizId, SessionId, ViolationKind};
use storage::CredentialSlot;

use crate::api::{QuizApi, SubmitAttemptRequest, SubmitReceipt};
use crate::error::{ApiError, SubmitError};

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    TimeExpired,
    MajorViolation(ViolationKind),
    ViolationLimit(u32),
}

impl SubmitTrigger {
    /// Reason string sent to the backend.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Manual => "Submitted by student".to_string(),
            Self::TimeExpired => "Time expired".to_string(),
            Self::MajorViolation(kind) => kind.label().to_string(),
            Self::ViolationLimit(max) => format!("Reached maximum violations ({max})"),
        }
    }

    #[must_use]
    pub fn is_auto(&self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

/// Answers sealed for delivery, already in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTicket {
    request: SubmitAttemptRequest,
    trigger: SubmitTrigger,
}

impl SubmissionTicket {
    #[must_use]
    pub fn new(
        quiz_id: QuizId,
        session_id: SessionId,
        canonical_answers: Vec<Option<u8>>,
        trigger: SubmitTrigger,
    ) -> Self {
        Self {
            request: SubmitAttemptRequest {
                quiz_id,
                answers: canonical_answers,
                session_id,
                reason: trigger.reason(),
            },
            trigger,
        }
    }

    #[must_use]
    pub fn request(&self) -> &SubmitAttemptRequest {
        &self.request
    }

    #[must_use]
    pub fn trigger(&self) -> SubmitTrigger {
        self.trigger
    }

    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.trigger.is_auto()
    }
}

/// Sends tickets to the quiz backend.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    api: Arc<dyn QuizApi>,
    credentials: CredentialSlot,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(api: Arc<dyn QuizApi>, credentials: CredentialSlot) -> Self {
        Self { api, credentials }
    }

    /// Deliver `ticket`.
    ///
    /// Automatic submissions also fire a detached redundant request before
    /// the primary one; its outcome is never observed.
    ///
    /// # Errors
    ///
    /// `Auth` when no credential is stored or the backend rejects it,
    /// `Conflict` when the attempt is already recorded, `Network` otherwise.
    pub async fn transmit(&self, ticket: &SubmissionTicket) -> Result<SubmitReceipt, SubmitError> {
        let token = self.credentials.load()?.ok_or(SubmitError::Auth)?;
        let request = ticket.request();

        if ticket.is_auto() {
            let api = Arc::clone(&self.api);
            let redundant = request.clone();
            let redundant_token = token.clone();
            tokio::spawn(async move {
                match api.send_redundant(&redundant, &redundant_token).await {
                    Ok(()) => debug!(session_id = %redundant.session_id, "redundant submission delivered"),
                    Err(err) => debug!(error = %err, "redundant submission not delivered"),
                }
            });
        }

        match self.api.submit_attempt(request, &token).await {
            Ok(receipt) => {
                info!(
                    session_id = %request.session_id,
                    reason = %request.reason,
                    score = ?receipt.score,
                    "attempt submitted"
                );
                Ok(receipt)
            }
            Err(ApiError::Unauthorized) => Err(SubmitError::Auth),
            Err(ApiError::Conflict) => Err(SubmitError::Conflict),
            Err(err) => {
                warn!(session_id = %request.session_id, error = %err, "primary submission failed");
                Err(SubmitError::Network(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeQuizApi;
    use storage::{InMemoryStore, KeyValueStore};

    fn coordinator(api: &FakeQuizApi, token: Option<&str>) -> SubmissionCoordinator {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let credentials = CredentialSlot::new(store);
        if let Some(token) = token {
            credentials.save(token).unwrap();
        }
        SubmissionCoordinator::new(Arc::new(api.clone()), credentials)
    }

    fn ticket(trigger: SubmitTrigger) -> SubmissionTicket {
        SubmissionTicket::new(
            QuizId::new("q1"),
            SessionId::from_raw("s1"),
            vec![Some(1), None],
            trigger,
        )
    }

    #[test]
    fn reasons_match_backend_vocabulary() {
        assert_eq!(SubmitTrigger::Manual.reason(), "Submitted by student");
        assert_eq!(SubmitTrigger::TimeExpired.reason(), "Time expired");
        assert_eq!(
            SubmitTrigger::ViolationLimit(3).reason(),
            "Reached maximum violations (3)"
        );
        assert_eq!(
            SubmitTrigger::MajorViolation(ViolationKind::MultipleInstances).reason(),
            "Multiple quiz instances detected"
        );
        assert!(!SubmitTrigger::Manual.is_auto());
    }

    #[tokio::test]
    async fn manual_submission_sends_only_primary() {
        let api = FakeQuizApi::new();
        let receipt = coordinator(&api, Some("tok"))
            .transmit(&ticket(SubmitTrigger::Manual))
            .await
            .unwrap();
        assert_eq!(receipt.score, Some(1));
        tokio::task::yield_now().await;
        assert_eq!(api.primary_requests().len(), 1);
        assert!(api.redundant_requests().is_empty());
    }

    #[tokio::test]
    async fn auto_submission_also_sends_redundant_copy() {
        let api = FakeQuizApi::new();
        coordinator(&api, Some("tok"))
            .transmit(&ticket(SubmitTrigger::TimeExpired))
            .await
            .unwrap();
        for _ in 0..10 {
            if !api.redundant_requests().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(api.redundant_requests().len(), 1);
        assert_eq!(api.redundant_requests()[0].reason, "Time expired");
        assert_eq!(api.primary_requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_credential_is_an_auth_error() {
        let api = FakeQuizApi::new();
        let err = coordinator(&api, None)
            .transmit(&ticket(SubmitTrigger::Manual))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Auth));
        assert!(api.primary_requests().is_empty());
    }

    #[tokio::test]
    async fn backend_errors_map_to_taxonomy() {
        let api = FakeQuizApi::new();
        api.script_submit(Err(ApiError::Conflict));
        api.script_submit(Err(ApiError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY)));
        let coordinator = coordinator(&api, Some("tok"));
        let first = coordinator.transmit(&ticket(SubmitTrigger::Manual)).await;
        assert!(matches!(first, Err(SubmitError::Conflict)));
        let second = coordinator.transmit(&ticket(SubmitTrigger::Manual)).await;
        assert!(matches!(second, Err(SubmitError::Network(_))));
    }
}
