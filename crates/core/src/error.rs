use thiserror::Error;

use crate::model::{AnswerError, OrderError, QuestionError, TransitionError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptStatus;

    #[test]
    fn model_errors_convert_into_crate_error() {
        let err: Error = TransitionError {
            from: AttemptStatus::Submitted,
            to: AttemptStatus::InProgress,
        }
        .into();
        assert!(matches!(err, Error::Transition(_)));
        assert_eq!(
            err.to_string(),
            "illegal attempt transition submitted -> in-progress"
        );
    }
}
