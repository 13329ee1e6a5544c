use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use crate::config::INVITATION_TTL_RANGE;
use crate::dto::admin_dto::{InviteCandidate, ListInvitationsQuery, Paginated, RejectedInvite};
use crate::error::{Error, Result};
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::test::Test;
use crate::services::mail_service::{InvitationEmail, InvitationMailer};
use crate::utils::token::{generate_access_token, ACCESS_TOKEN_LENGTH};

#[derive(Debug, Default, Serialize)]
pub struct InviteOutcome {
    pub created: Vec<Invitation>,
    pub rejected: Vec<RejectedInvite>,
}

#[derive(Default)]
struct Store {
    by_id: HashMap<Uuid, Invitation>,
    by_token: HashMap<String, Uuid>,
}

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<RwLock<Store>>,
    mailer: Arc<dyn InvitationMailer>,
    webapp_url: String,
    default_ttl_hours: i64,
}

impl InvitationService {
    pub fn new(mailer: Arc<dyn InvitationMailer>, webapp_url: String, default_ttl_hours: i64) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            mailer,
            webapp_url,
            default_ttl_hours,
        }
    }

    /// Invites each candidate to `test`. Candidates that already hold an open
    /// invitation for this test are reported back instead of invited again.
    pub async fn invite(
        &self,
        test: &Test,
        candidates: Vec<InviteCandidate>,
        expires_in_hours: Option<i64>,
    ) -> Result<InviteOutcome> {
        for candidate in &candidates {
            candidate.validate()?;
        }

        let hours = expires_in_hours.unwrap_or(self.default_ttl_hours);
        if !INVITATION_TTL_RANGE.contains(&hours) {
            return Err(Error::BadRequest(format!(
                "Invitation lifetime must be between {} and {} hours, got {}",
                INVITATION_TTL_RANGE.start(),
                INVITATION_TTL_RANGE.end(),
                hours
            )));
        }
        let ttl = Duration::hours(hours);
        let mut outcome = InviteOutcome::default();
        let mut to_mail = Vec::new();

        {
            let mut store = self.store.write().await;
            for candidate in candidates {
                let email = normalize_email(&candidate.email);
                let open = store.by_id.values().any(|inv| {
                    inv.test_id == test.id
                        && inv.candidate_email == email
                        && matches!(
                            inv.status,
                            InvitationStatus::Pending | InvitationStatus::InProgress
                        )
                });
                if open {
                    outcome.rejected.push(RejectedInvite {
                        email,
                        reason: "candidate already has an open invitation for this test".into(),
                    });
                    continue;
                }

                let now = Utc::now();
                let invitation = Invitation {
                    id: Uuid::new_v4(),
                    test_id: test.id,
                    test_title: test.title.clone(),
                    candidate_email: email,
                    candidate_name: candidate
                        .name
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty()),
                    access_token: generate_access_token(ACCESS_TOKEN_LENGTH),
                    status: InvitationStatus::Pending,
                    expires_at: now + ttl,
                    created_at: now,
                    started_at: None,
                    completed_at: None,
                };
                store
                    .by_token
                    .insert(invitation.access_token.clone(), invitation.id);
                store.by_id.insert(invitation.id, invitation.clone());
                to_mail.push(invitation.clone());
                outcome.created.push(invitation);
            }
        }

        for invitation in &to_mail {
            let email = InvitationEmail {
                to: invitation.candidate_email.clone(),
                subject: format!("Invitation to {}", invitation.test_title),
                test_name: invitation.test_title.clone(),
                test_date: invitation.expires_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                link: invitation.link(&self.webapp_url),
            };
            if let Err(e) = self.mailer.send(email) {
                tracing::warn!(
                    error = %e,
                    invitation_id = %invitation.id,
                    "invitation created but e-mail could not be queued"
                );
            }
        }

        tracing::info!(
            test_id = %test.id,
            created = outcome.created.len(),
            rejected = outcome.rejected.len(),
            "candidates invited"
        );
        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> Result<Invitation> {
        self.store
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Invitation {} not found", id)))
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Invitation> {
        let store = self.store.read().await;
        store
            .by_token
            .get(token)
            .and_then(|id| store.by_id.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound("Invitation not found".to_string()))
    }

    pub async fn list(&self, query: ListInvitationsQuery) -> Paginated<Invitation> {
        let email = query.candidate_email.as_deref().map(normalize_email);
        let mut matching: Vec<Invitation> = self
            .store
            .read()
            .await
            .by_id
            .values()
            .filter(|inv| query.test_id.map_or(true, |id| inv.test_id == id))
            .filter(|inv| query.status.map_or(true, |s| inv.status == s))
            .filter(|inv| email.as_deref().map_or(true, |e| inv.candidate_email == e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Paginated::from_vec(matching, query.page, query.per_page)
    }

    pub async fn list_for_email(&self, email: &str) -> Vec<Invitation> {
        let email = normalize_email(email);
        let mut own: Vec<Invitation> = self
            .store
            .read()
            .await
            .by_id
            .values()
            .filter(|inv| inv.candidate_email == email)
            .cloned()
            .collect();
        own.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        own
    }

    pub async fn all(&self) -> Vec<Invitation> {
        self.store.read().await.by_id.values().cloned().collect()
    }

    pub async fn revoke(&self, id: Uuid) -> Result<Invitation> {
        let mut store = self.store.write().await;
        let invitation = store
            .by_id
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Invitation {} not found", id)))?;
        if invitation.status != InvitationStatus::Pending {
            return Err(Error::Conflict(format!(
                "Only pending invitations can be revoked, this one is {}",
                invitation.status.as_str()
            )));
        }
        invitation.status = InvitationStatus::Revoked;
        tracing::info!(invitation_id = %id, "invitation revoked");
        Ok(invitation.clone())
    }

    pub async fn mark_started(&self, id: Uuid, at: DateTime<Utc>) -> Result<Invitation> {
        self.transition(id, InvitationStatus::Pending, InvitationStatus::InProgress, |inv| {
            inv.started_at = Some(at);
        })
        .await
    }

    pub async fn mark_completed(&self, id: Uuid, at: DateTime<Utc>) -> Result<Invitation> {
        self.transition(id, InvitationStatus::InProgress, InvitationStatus::Completed, |inv| {
            inv.completed_at = Some(at);
        })
        .await
    }

    pub async fn mark_expired(&self, id: Uuid) -> Result<Invitation> {
        self.transition(id, InvitationStatus::Pending, InvitationStatus::Expired, |_| {})
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
        apply: impl FnOnce(&mut Invitation),
    ) -> Result<Invitation> {
        let mut store = self.store.write().await;
        let invitation = store
            .by_id
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Invitation {} not found", id)))?;
        if invitation.status == to {
            return Ok(invitation.clone());
        }
        if invitation.status != from {
            return Err(Error::Conflict(format!(
                "Invitation is {}, expected {}",
                invitation.status.as_str(),
                from.as_str()
            )));
        }
        invitation.status = to;
        apply(invitation);
        Ok(invitation.clone())
    }

    /// Marks every overdue pending invitation expired; returns how many.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> usize {
        let mut store = self.store.write().await;
        let mut expired = 0;
        for invitation in store.by_id.values_mut() {
            if invitation.is_overdue(now) {
                invitation.status = InvitationStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(expired, "overdue invitations expired");
        }
        expired
    }

    #[cfg(test)]
    pub(crate) async fn force_status(&self, id: Uuid, status: InvitationStatus) {
        if let Some(invitation) = self.store.write().await.by_id.get_mut(&id) {
            invitation.status = status;
        }
    }

    pub async fn counts_by_status(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = InvitationStatus::all()
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for invitation in self.store.read().await.by_id.values() {
            *counts.entry(invitation.status.as_str().to_string()).or_default() += 1;
        }
        counts
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
