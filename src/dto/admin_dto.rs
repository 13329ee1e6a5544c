use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::invitation::InvitationStatus;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestionPayload {
    #[validate(length(min = 1, message = "Question text is required"))]
    pub text: String,
    #[validate(length(min = 2, message = "A question needs at least two options"))]
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    pub title: String,
    #[validate(length(min = 3, message = "Subject must be at least 3 characters"))]
    pub subject: String,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: u32,
    #[validate(length(min = 1, message = "A test needs at least one question"))]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTestPayload {
    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    #[validate(length(min = 3, message = "Subject must be at least 3 characters"))]
    pub subject: Option<String>,

    #[serde(default, deserialize_with = "trim_optional_string")]
    pub description: Option<String>,

    #[validate(range(min = 1, message = "Duration must be at least 1 minute"))]
    pub duration_minutes: Option<u32>,

    #[validate(length(min = 1, message = "A test needs at least one question"))]
    pub questions: Option<Vec<QuestionPayload>>,
}

// Trims strings and turns empty ones into None
fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListTestsQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub search: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InviteCandidate {
    #[validate(email(message = "Invalid e-mail address"))]
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InviteCandidatesPayload {
    #[validate(length(min = 1, message = "At least one candidate is required"))]
    pub candidates: Vec<InviteCandidate>,
    #[validate(range(min = 1, max = 720, message = "Expiry must be between 1 and 720 hours"))]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedInvite {
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListInvitationsQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub test_id: Option<Uuid>,
    pub status: Option<InvitationStatus>,
    pub candidate_email: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ListResultsQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub test_id: Option<Uuid>,
    pub candidate_email: Option<String>,
    pub passed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl<T> Paginated<T> {
    /// Slices `all` into the requested 1-based page.
    pub fn from_vec(all: Vec<T>, page: Option<usize>, per_page: Option<usize>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(10).clamp(1, 100);
        let total = all.len();
        let total_pages = total.div_ceil(per_page);
        let items = all
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_tests: usize,
    pub invitations_by_status: BTreeMap<String, usize>,
    pub active_sessions: usize,
    pub total_results: usize,
    pub passed_results: usize,
    pub pass_rate: f64,
    pub average_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub email: String,
    pub name: Option<String>,
    pub invitations: usize,
    pub completed: usize,
    pub best_percentage: Option<u32>,
    pub last_invited_at: DateTime<Utc>,
}
