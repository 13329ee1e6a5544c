//! Timed assessment core: the per-attempt session state machine, the pure
//! scoring engine and the countdown driver. Nothing in here performs I/O.

pub mod error;
pub mod scoring;
pub mod session;
pub mod timer;

pub use error::AssessmentError;
pub use scoring::{PercentageRounding, QuestionReview, ScoringPolicy, Selection, TestResult};
pub use session::{Session, SessionStatus, Submission, SubmissionTrigger, TickOutcome};
pub use timer::{TickControl, TimerDriver, TimerHandle};
