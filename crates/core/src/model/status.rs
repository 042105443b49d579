use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("illegal attempt transition {from} -> {to}")]
pub struct TransitionError {
    pub from: AttemptStatus,
    pub to: AttemptStatus,
}

/// Lifecycle of one proctored attempt.
///
/// `NotStarted → AwaitingFullscreen → InProgress → Submitting → {Submitted | Locked}`.
/// Any pre-terminal state may also drop straight to `Locked`. Nothing moves
/// back to `InProgress` once `Submitting` has been entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptStatus {
    NotStarted,
    AwaitingFullscreen,
    InProgress,
    Submitting,
    Submitted,
    Locked,
}

impl AttemptStatus {
    #[must_use]
    pub fn can_transition_to(self, next: AttemptStatus) -> bool {
        use AttemptStatus::{
            AwaitingFullscreen, InProgress, Locked, NotStarted, Submitted, Submitting,
        };
        matches!(
            (self, next),
            (NotStarted, AwaitingFullscreen)
                | (AwaitingFullscreen, InProgress)
                | (InProgress, Submitting)
                | (Submitting, Submitted)
                | (NotStarted | AwaitingFullscreen | InProgress | Submitting, Locked)
        )
    }

    /// Move to `next`, refusing any edge the lifecycle does not allow.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` for an illegal edge; `self` is left unchanged.
    pub fn transition(&mut self, next: AttemptStatus) -> Result<(), TransitionError> {
        if !self.can_transition_to(next) {
            return Err(TransitionError {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::Locked)
    }

    /// Only an in-progress attempt accepts answers, ticks and violations.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, AttemptStatus::InProgress)
    }

    #[must_use]
    pub fn submission_begun(self) -> bool {
        matches!(self, AttemptStatus::Submitting | AttemptStatus::Submitted)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttemptStatus::NotStarted => "not-started",
            AttemptStatus::AwaitingFullscreen => "awaiting-fullscreen",
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Submitting => "submitting",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Locked => "locked",
        };
        f.write_str(label)
    }
}

/// Why an attempt ended in `Locked` instead of `Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    UnsupportedEnvironment,
    AlreadyAttempted,
    AuthExpired,
    /// An automatic submission could not be delivered.
    DeliveryFailed,
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnsupportedEnvironment => "unsupported environment",
            Self::AlreadyAttempted => "already attempted",
            Self::AuthExpired => "session expired",
            Self::DeliveryFailed => "submission not delivered",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AttemptStatus; 6] = [
        AttemptStatus::NotStarted,
        AttemptStatus::AwaitingFullscreen,
        AttemptStatus::InProgress,
        AttemptStatus::Submitting,
        AttemptStatus::Submitted,
        AttemptStatus::Locked,
    ];

    #[test]
    fn happy_path_is_allowed() {
        let mut status = AttemptStatus::NotStarted;
        status.transition(AttemptStatus::AwaitingFullscreen).unwrap();
        status.transition(AttemptStatus::InProgress).unwrap();
        status.transition(AttemptStatus::Submitting).unwrap();
        status.transition(AttemptStatus::Submitted).unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn nothing_reenters_in_progress_after_submitting() {
        for from in [
            AttemptStatus::Submitting,
            AttemptStatus::Submitted,
            AttemptStatus::Locked,
        ] {
            assert!(!from.can_transition_to(AttemptStatus::InProgress));
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [AttemptStatus::Submitted, AttemptStatus::Locked] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn illegal_transition_leaves_status_untouched() {
        let mut status = AttemptStatus::InProgress;
        let err = status.transition(AttemptStatus::Submitted).unwrap_err();
        assert_eq!(err.from, AttemptStatus::InProgress);
        assert_eq!(status, AttemptStatus::InProgress);
    }
}
