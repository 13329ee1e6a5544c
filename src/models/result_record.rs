use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assessment::{QuestionReview, SubmissionTrigger, TestResult};
use crate::models::invitation::Invitation;

/// The stored outcome of one finished attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: Uuid,
    pub invitation_id: Uuid,
    pub test_id: Uuid,
    pub test_title: String,
    pub candidate_email: String,
    pub candidate_name: Option<String>,
    pub score: usize,
    pub total_questions: usize,
    pub percentage: u32,
    pub passed: bool,
    pub trigger: SubmissionTrigger,
    pub time_spent_seconds: u32,
    pub per_question: Vec<QuestionReview>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(
        invitation: &Invitation,
        result: &TestResult,
        trigger: SubmissionTrigger,
        started_at: DateTime<Utc>,
        time_spent_seconds: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invitation_id: invitation.id,
            test_id: result.test_id,
            test_title: invitation.test_title.clone(),
            candidate_email: invitation.candidate_email.clone(),
            candidate_name: invitation.candidate_name.clone(),
            score: result.score,
            total_questions: result.total_questions,
            percentage: result.percentage,
            passed: result.passed,
            trigger,
            time_spent_seconds,
            per_question: result.per_question.clone(),
            started_at,
            submitted_at: Utc::now(),
        }
    }
}
