mod answers;
mod ids;
mod order;
mod question;
mod status;
mod violation;

pub use answers::{AnswerError, AnswerSheet};
pub use ids::{ParseIdError, QuizId, SessionId};
pub use order::{OrderError, QuestionOrder};
pub use question::{OPTION_COUNT, Question, QuestionError, QuestionOption, QuizSnapshot};
pub use status::{AttemptStatus, LockReason, TransitionError};
pub use violation::{Severity, Violation, ViolationKind};
