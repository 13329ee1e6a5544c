use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::InProgress => "in_progress",
            InvitationStatus::Completed => "completed",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Revoked => "revoked",
        }
    }

    pub fn all() -> [InvitationStatus; 5] {
        [
            InvitationStatus::Pending,
            InvitationStatus::InProgress,
            InvitationStatus::Completed,
            InvitationStatus::Expired,
            InvitationStatus::Revoked,
        ]
    }
}

impl std::str::FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvitationStatus::all()
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown invitation status '{}'", s))
    }
}

/// A candidate's right to take one test, addressed by its access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub test_id: Uuid,
    pub test_title: String,
    pub candidate_email: String,
    pub candidate_name: Option<String>,
    pub access_token: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Pending invitations lapse at `expires_at`; once started the session
    /// clock governs instead.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && self.expires_at <= now
    }

    pub fn link(&self, webapp_url: &str) -> String {
        format!(
            "{}/test/{}",
            webapp_url.trim_end_matches('/'),
            self.access_token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invitation(status: InvitationStatus, expires_in: Duration) -> Invitation {
        let now = Utc::now();
        Invitation {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            test_title: "Physics 101".into(),
            candidate_email: "ada@example.com".into(),
            candidate_name: None,
            access_token: "tok123".into(),
            status,
            expires_at: now + expires_in,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn only_pending_invitations_go_overdue() {
        let now = Utc::now();
        assert!(invitation(InvitationStatus::Pending, Duration::hours(-1)).is_overdue(now));
        assert!(!invitation(InvitationStatus::Pending, Duration::hours(1)).is_overdue(now));
        assert!(!invitation(InvitationStatus::InProgress, Duration::hours(-1)).is_overdue(now));
    }

    #[test]
    fn link_joins_webapp_url_and_token() {
        let inv = invitation(InvitationStatus::Pending, Duration::hours(1));
        assert_eq!(inv.link("http://localhost:3000/"), "http://localhost:3000/test/tok123");
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in InvitationStatus::all() {
            assert_eq!(status.as_str().parse::<InvitationStatus>(), Ok(status));
        }
        assert!("archived".parse::<InvitationStatus>().is_err());
    }
}
