use axum::{extract::State, response::IntoResponse, Json};

use crate::dto::auth_dto::{AdminLoginRequest, CandidateLoginRequest};
use crate::error::Result;
use crate::AppState;

#[axum::debug_handler]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<impl IntoResponse> {
    let token = state.auth_service.login_admin(req).await?;
    Ok(Json(token))
}

#[axum::debug_handler]
pub async fn candidate_login(
    State(state): State<AppState>,
    Json(req): Json<CandidateLoginRequest>,
) -> Result<impl IntoResponse> {
    let token = state.auth_service.login_candidate(req).await?;
    Ok(Json(token))
}
