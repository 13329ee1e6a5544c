use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dto::admin_dto::{ListResultsQuery, Paginated};
use crate::error::{Error, Result};
use crate::models::result_record::ResultRecord;
use crate::services::invitation_service::normalize_email;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResultSummary {
    pub total: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub average_percentage: f64,
}

/// Stored results, at most one per invitation.
#[derive(Clone, Default)]
pub struct ResultService {
    records: Arc<RwLock<HashMap<Uuid, ResultRecord>>>,
}

impl ResultService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` unless its invitation already has one, in which case
    /// the stored record wins and is returned.
    pub async fn record(&self, record: ResultRecord) -> ResultRecord {
        let mut records = self.records.write().await;
        if let Some(existing) = records
            .values()
            .find(|r| r.invitation_id == record.invitation_id)
        {
            tracing::warn!(
                invitation_id = %record.invitation_id,
                "result already stored for invitation, keeping the first"
            );
            return existing.clone();
        }
        records.insert(record.id, record.clone());
        record
    }

    pub async fn get(&self, id: Uuid) -> Result<ResultRecord> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Result {} not found", id)))
    }

    pub async fn find_by_invitation(&self, invitation_id: Uuid) -> Result<ResultRecord> {
        self.records
            .read()
            .await
            .values()
            .find(|r| r.invitation_id == invitation_id)
            .cloned()
            .ok_or_else(|| Error::NotFound("No result for this invitation".to_string()))
    }

    /// Every record matching the filters, newest first. Paging fields are
    /// ignored.
    pub async fn filtered(&self, query: &ListResultsQuery) -> Vec<ResultRecord> {
        let email = query.candidate_email.as_deref().map(normalize_email);
        let mut matching: Vec<ResultRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| query.test_id.map_or(true, |id| r.test_id == id))
            .filter(|r| query.passed.map_or(true, |p| r.passed == p))
            .filter(|r| email.as_deref().map_or(true, |e| r.candidate_email == e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        matching
    }

    pub async fn list(&self, query: ListResultsQuery) -> Paginated<ResultRecord> {
        let matching = self.filtered(&query).await;
        Paginated::from_vec(matching, query.page, query.per_page)
    }

    pub async fn list_for_email(&self, email: &str) -> Vec<ResultRecord> {
        self.filtered(&ListResultsQuery {
            candidate_email: Some(email.to_string()),
            ..Default::default()
        })
        .await
    }

    pub async fn summary(&self) -> ResultSummary {
        let records = self.records.read().await;
        let total = records.len();
        if total == 0 {
            return ResultSummary::default();
        }
        let passed = records.values().filter(|r| r.passed).count();
        let percentage_sum: u64 = records.values().map(|r| r.percentage as u64).sum();
        ResultSummary {
            total,
            passed,
            pass_rate: round2(passed as f64 * 100.0 / total as f64),
            average_percentage: round2(percentage_sum as f64 / total as f64),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
