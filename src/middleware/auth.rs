use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::models::user::Role;
use crate::AppState;

pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    require_role(&state, req, next, Role::Admin).await
}

pub async fn require_candidate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    require_role(&state, req, next, Role::Candidate).await
}

/// Checks the bearer JWT and its role, then hands the claims to the handler
/// as a request extension.
async fn require_role(state: &AppState, mut req: Request, next: Next, role: Role) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return unauthorized("missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return unauthorized("bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return unauthorized("unsupported_scheme");
    };

    match state.auth_service.verify(token.trim()) {
        Ok(claims) => {
            if claims.role != role {
                return (StatusCode::FORBIDDEN, Json(json!({"error":"forbidden"}))).into_response();
            }
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(_) => unauthorized("invalid_token"),
    }
}

fn unauthorized(reason: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))).into_response()
}
