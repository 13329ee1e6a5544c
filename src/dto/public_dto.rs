use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::{Session, SessionStatus};
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::result_record::ResultRecord;
use crate::models::test::Test;
use crate::utils::time::format_countdown;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTestSummary {
    pub title: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub total_questions: usize,
}

impl From<&Test> for PublicTestSummary {
    fn from(test: &Test) -> Self {
        Self {
            title: test.title.clone(),
            subject: test.subject.clone(),
            description: test.description.clone(),
            duration_minutes: test.duration_minutes,
            total_questions: test.questions.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicInvitationSummary {
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub candidate_email: String,
    pub candidate_name: Option<String>,
}

impl From<&Invitation> for PublicInvitationSummary {
    fn from(invitation: &Invitation) -> Self {
        Self {
            status: invitation.status,
            expires_at: invitation.expires_at,
            candidate_email: invitation.candidate_email.clone(),
            candidate_name: invitation.candidate_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTestByTokenResponse {
    pub test: PublicTestSummary,
    pub invitation: PublicInvitationSummary,
}

/// A question as the candidate sees it: no answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub index: usize,
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub question: PublicQuestion,
    pub selected_option: Option<usize>,
    pub current_question_index: usize,
    pub total_questions: usize,
    pub answered_count: usize,
    pub remaining_seconds: u32,
    pub remaining_display: String,
    pub is_first: bool,
    pub is_last: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let index = session.current_question_index();
        let question = session.current_question();
        let total_questions = session.total_questions();
        Self {
            status: session.status(),
            question: PublicQuestion {
                index,
                text: question.text.clone(),
                options: question.options.iter().map(|o| o.text.clone()).collect(),
            },
            selected_option: session.answer_for(index),
            current_question_index: index,
            total_questions,
            answered_count: session.answered_count(),
            remaining_seconds: session.remaining_seconds(),
            remaining_display: format_countdown(session.remaining_seconds()),
            is_first: index == 0,
            is_last: index + 1 == total_questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAnswerRequest {
    pub option_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub invitation_status: InvitationStatus,
    pub session_status: Option<SessionStatus>,
    pub remaining_seconds: Option<u32>,
    pub remaining_display: Option<String>,
    pub answered_count: usize,
    pub total_questions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTestResponse {
    pub already_submitted: bool,
    pub result: ResultRecord,
}
