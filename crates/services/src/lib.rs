#![forbid(unsafe_code)]

pub mod api;
pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod integrity;
pub mod platform;
pub mod session;
pub mod submission;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod timer;
pub mod token;

pub use quiz_core::Clock;

pub use api::{HttpQuizApi, QuizApi, QuizPayload, SubmitAttemptRequest, SubmitReceipt};
pub use bootstrap::{AttemptSession, Bootstrapped, ReviewView, Role, SessionBootstrapper};
pub use classifier::{Consequence, ViolationBudget};
pub use config::{ApiConfig, ProctorConfig, ProctorConfigDraft};
pub use controller::{ProctorController, Reaction};
pub use error::{
    AnswerRejected, ApiError, BootstrapError, ConfigError, EnvironmentError, SubmitError,
    TokenError,
};
pub use events::{Destination, EventBus, GraceKind, Notice, NoticeLevel, Overlay, SessionEvent};
pub use integrity::{Key, KeyChord, KeyVerdict};
pub use platform::{EnvironmentSnapshot, PlatformCapabilities, ProctorPlatform, ViewportMetrics};
pub use session::{HostSignal, ProctorSession, SessionDeps, SessionStatus};
pub use submission::{SubmissionCoordinator, SubmissionTicket, SubmitTrigger};
pub use timer::{CountdownTimer, TimerTick};
pub use token::{TokenCheck, TokenRefresher, decode_expiry};
