use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assessment::error::AssessmentError;
use crate::assessment::scoring::{self, ScoringPolicy, TestResult};
use crate::models::test::{Question, Test};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTrigger {
    Manual,
    TimeExpired,
}

impl SubmissionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionTrigger::Manual => "manual",
            SubmissionTrigger::TimeExpired => "time_expired",
        }
    }
}

/// What a call to [`Session::submit`] produced. Only the first submission is
/// `Fresh`; everything after replays the stored result.
#[derive(Debug, Clone)]
pub enum Submission {
    Fresh(Arc<TestResult>),
    Repeated(Arc<TestResult>),
}

impl Submission {
    pub fn result(&self) -> &Arc<TestResult> {
        match self {
            Submission::Fresh(result) | Submission::Repeated(result) => result,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Submission::Fresh(_))
    }
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Running { remaining_seconds: u32 },
    Expired(Arc<TestResult>),
    Inactive,
}

#[derive(Debug, Clone)]
struct Finalized {
    result: Arc<TestResult>,
    trigger: SubmissionTrigger,
}

/// One candidate's attempt at one test.
#[derive(Debug)]
pub struct Session {
    test: Arc<Test>,
    policy: ScoringPolicy,
    current_question_index: usize,
    answers: BTreeMap<usize, usize>,
    remaining_seconds: u32,
    status: SessionStatus,
    finalized: Option<Finalized>,
}

impl Session {
    pub fn start(test: Arc<Test>, policy: ScoringPolicy) -> Result<Self, AssessmentError> {
        test.validate_structure()?;
        let remaining_seconds = test.duration_seconds();
        Ok(Self {
            test,
            policy,
            current_question_index: 0,
            answers: BTreeMap::new(),
            remaining_seconds,
            status: SessionStatus::Active,
            finalized: None,
        })
    }

    pub fn test(&self) -> &Arc<Test> {
        &self.test
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn current_question(&self) -> &Question {
        &self.test.questions[self.current_question_index]
    }

    pub fn total_questions(&self) -> usize {
        self.test.questions.len()
    }

    pub fn answers(&self) -> &BTreeMap<usize, usize> {
        &self.answers
    }

    pub fn answer_for(&self, question_index: usize) -> Option<usize> {
        self.answers.get(&question_index).copied()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn result(&self) -> Option<&Arc<TestResult>> {
        self.finalized.as_ref().map(|f| &f.result)
    }

    pub fn trigger(&self) -> Option<SubmissionTrigger> {
        self.finalized.as_ref().map(|f| f.trigger)
    }

    pub fn go_to_next(&mut self) {
        if !self.is_active() {
            return;
        }
        if self.current_question_index + 1 < self.total_questions() {
            self.current_question_index += 1;
        }
    }

    pub fn go_to_previous(&mut self) {
        if !self.is_active() {
            return;
        }
        if self.current_question_index > 0 {
            self.current_question_index -= 1;
        }
    }

    /// Selects `option_index` for the current question, replacing any earlier
    /// choice. Ignored once the session is submitted.
    pub fn record_answer(&mut self, option_index: usize) -> Result<(), AssessmentError> {
        if !self.is_active() {
            return Ok(());
        }
        let option_count = self.current_question().options.len();
        if option_index >= option_count {
            return Err(AssessmentError::InvalidOption {
                index: option_index,
                option_count,
            });
        }
        self.answers.insert(self.current_question_index, option_index);
        Ok(())
    }

    /// Advances the countdown by one unit; reaching zero submits the session.
    pub fn tick(&mut self) -> Result<TickOutcome, AssessmentError> {
        if !self.is_active() {
            return Ok(TickOutcome::Inactive);
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return Ok(TickOutcome::Running {
                remaining_seconds: self.remaining_seconds,
            });
        }
        let submission = self.finalize(SubmissionTrigger::TimeExpired)?;
        Ok(TickOutcome::Expired(submission.result().clone()))
    }

    pub fn submit(&mut self) -> Result<Submission, AssessmentError> {
        self.finalize(SubmissionTrigger::Manual)
    }

    fn finalize(&mut self, trigger: SubmissionTrigger) -> Result<Submission, AssessmentError> {
        if let Some(done) = &self.finalized {
            return Ok(Submission::Repeated(done.result.clone()));
        }
        let result = Arc::new(scoring::score(&self.test, &self.answers, &self.policy)?);
        self.status = SessionStatus::Submitted;
        self.finalized = Some(Finalized {
            result: result.clone(),
            trigger,
        });
        Ok(Submission::Fresh(result))
    }
}
