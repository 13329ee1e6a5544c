use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde::Serialize;

use crate::dto::public_dto::PublicInvitationSummary;
use crate::error::Result;
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::user::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CandidateInvitation {
    pub test_id: uuid::Uuid,
    pub test_title: String,
    pub access_token: String,
    pub link: String,
    #[serde(flatten)]
    pub summary: PublicInvitationSummary,
}

impl CandidateInvitation {
    fn new(invitation: &Invitation, webapp_url: &str) -> Self {
        Self {
            test_id: invitation.test_id,
            test_title: invitation.test_title.clone(),
            access_token: invitation.access_token.clone(),
            link: invitation.link(webapp_url),
            summary: PublicInvitationSummary::from(invitation),
        }
    }
}

/// Invitations addressed to the signed-in candidate, revoked ones excluded.
#[axum::debug_handler]
pub async fn my_invitations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let invitations: Vec<CandidateInvitation> = state
        .invitation_service
        .list_for_email(&claims.sub)
        .await
        .iter()
        .filter(|inv| inv.status != InvitationStatus::Revoked)
        .map(|inv| CandidateInvitation::new(inv, &state.config.webapp_url))
        .collect();
    Ok(Json(invitations))
}

#[axum::debug_handler]
pub async fn my_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.result_service.list_for_email(&claims.sub).await))
}
