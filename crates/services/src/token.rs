//! Keeps the stored credential valid for the length of an attempt.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use storage::CredentialSlot;

use crate::api::QuizApi;
use crate::error::{ApiError, TokenError};

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the `exp` claim of a JWT without verifying its signature.
///
/// # Errors
///
/// Returns `TokenError::Malformed` if the token is not a three-part JWT
/// with a numeric `exp` claim.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three segments".into()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::Malformed(e.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))?;
    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| TokenError::Malformed(format!("exp {} out of range", claims.exp)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// Enough validity left; nothing was sent.
    Fresh { expires_at: DateTime<Utc> },
    Refreshed { expires_at: DateTime<Utc> },
}

#[derive(Clone)]
pub struct TokenRefresher {
    api: Arc<dyn QuizApi>,
    credentials: CredentialSlot,
    threshold: Duration,
}

impl TokenRefresher {
    #[must_use]
    pub fn new(api: Arc<dyn QuizApi>, credentials: CredentialSlot, threshold: Duration) -> Self {
        Self {
            api,
            credentials,
            threshold,
        }
    }

    /// Refresh the stored credential if it expires within the threshold.
    ///
    /// # Errors
    ///
    /// See [`TokenError::is_unrecoverable`] for which failures end the attempt.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<TokenCheck, TokenError> {
        let token = self.credentials.load()?.ok_or(TokenError::Missing)?;
        let expires_at = decode_expiry(&token)?;
        if expires_at - now > self.threshold {
            debug!(%expires_at, "credential still fresh");
            return Ok(TokenCheck::Fresh { expires_at });
        }

        let fresh = self
            .api
            .refresh_token(&token)
            .await
            .map_err(|err| match err {
                ApiError::Unauthorized => TokenError::Unauthorized,
                other => TokenError::Network(other),
            })?;
        let expires_at = decode_expiry(&fresh)?;
        self.credentials.save(&fresh)?;
        info!(%expires_at, "credential refreshed");
        Ok(TokenCheck::Refreshed { expires_at })
    }
}
