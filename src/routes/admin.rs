use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::admin_dto::{
    CandidateSummary, CreateTestPayload, DashboardStats, InviteCandidatesPayload,
    ListInvitationsQuery, ListResultsQuery, ListTestsQuery, UpdateTestPayload,
};
use crate::error::Result;
use crate::models::invitation::InvitationStatus;
use crate::models::user::Claims;
use crate::services::export_service::ExportService;
use crate::services::test_service::TestFilter;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .create_test(payload, Some(claims.sub.clone()))
        .await?;
    state
        .audit_service
        .log(
            Some(&claims.sub),
            "test_created",
            "test",
            test.id,
            Some(json!({ "title": test.title, "questions": test.questions.len() })),
        )
        .await;
    Ok((StatusCode::CREATED, Json(test)))
}

#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Query(query): Query<ListTestsQuery>,
) -> Result<impl IntoResponse> {
    let page = state
        .test_service
        .list_tests(
            query.page,
            query.per_page,
            TestFilter {
                search: query.search,
                subject: query.subject,
            },
        )
        .await;
    Ok(Json(page))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.get_test_by_id(id).await?;
    Ok(Json(test))
}

#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTestPayload>,
) -> Result<impl IntoResponse> {
    let changes = serde_json::to_value(&payload)?;
    let test = state.test_service.update_test(id, payload).await?;
    state
        .audit_service
        .log(Some(&claims.sub), "test_updated", "test", id, Some(changes))
        .await;
    Ok(Json(test))
}

#[axum::debug_handler]
pub async fn delete_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.test_service.delete_test(id).await?;
    state
        .audit_service
        .log(Some(&claims.sub), "test_deleted", "test", id, None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn invite_candidates(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
    Json(payload): Json<InviteCandidatesPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.get_test_by_id(test_id).await?;
    let outcome = state
        .invitation_service
        .invite(&test, payload.candidates, payload.expires_in_hours)
        .await?;

    for invitation in &outcome.created {
        state
            .audit_service
            .log(
                Some(&claims.sub),
                "candidate_invited",
                "invitation",
                invitation.id,
                Some(json!({
                    "test_id": test.id,
                    "candidate_email": invitation.candidate_email,
                })),
            )
            .await;
    }
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[axum::debug_handler]
pub async fn list_invitations(
    State(state): State<AppState>,
    Query(query): Query<ListInvitationsQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.invitation_service.list(query).await))
}

#[axum::debug_handler]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let invitation = state.invitation_service.revoke(id).await?;
    state
        .audit_service
        .log(Some(&claims.sub), "invitation_revoked", "invitation", id, None)
        .await;
    Ok(Json(invitation))
}

#[axum::debug_handler]
pub async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ListResultsQuery>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.result_service.list(query).await))
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let record = state.result_service.get(id).await?;
    Ok(Json(record))
}

/// Filtered results as an XLSX download. Paging parameters are ignored.
#[axum::debug_handler]
pub async fn export_results(
    State(state): State<AppState>,
    Query(query): Query<ListResultsQuery>,
) -> Result<impl IntoResponse> {
    let results = state.result_service.filtered(&query).await;
    let buffer = ExportService::generate_results_xlsx(&results)?;
    let filename = format!("results_{}.xlsx", chrono::Utc::now().format("%Y%m%d"));
    let disposition = format!("attachment; filename=\"{}\"", filename);
    tracing::info!(rows = results.len(), "results exported");

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}

#[axum::debug_handler]
pub async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let summary = state.result_service.summary().await;
    let stats = DashboardStats {
        total_tests: state.test_service.count().await,
        invitations_by_status: state.invitation_service.counts_by_status().await,
        active_sessions: state.attempt_service.active_count().await,
        total_results: summary.total,
        passed_results: summary.passed,
        pass_rate: summary.pass_rate,
        average_percentage: summary.average_percentage,
    };
    Ok(Json(stats))
}

/// One row per invited e-mail address, most recently invited first.
#[axum::debug_handler]
pub async fn list_candidates(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let mut invitations = state.invitation_service.all().await;
    invitations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let results = state.result_service.filtered(&ListResultsQuery::default()).await;

    let mut roster: BTreeMap<String, CandidateSummary> = BTreeMap::new();
    for invitation in invitations {
        let entry = roster
            .entry(invitation.candidate_email.clone())
            .or_insert_with(|| CandidateSummary {
                email: invitation.candidate_email.clone(),
                name: None,
                invitations: 0,
                completed: 0,
                best_percentage: None,
                last_invited_at: invitation.created_at,
            });
        entry.invitations += 1;
        if invitation.status == InvitationStatus::Completed {
            entry.completed += 1;
        }
        if invitation.candidate_name.is_some() {
            entry.name = invitation.candidate_name.clone();
        }
        entry.last_invited_at = entry.last_invited_at.max(invitation.created_at);
    }
    for record in results {
        if let Some(entry) = roster.get_mut(&record.candidate_email) {
            entry.best_percentage = Some(
                entry
                    .best_percentage
                    .map_or(record.percentage, |best| best.max(record.percentage)),
            );
        }
    }

    let mut candidates: Vec<CandidateSummary> = roster.into_values().collect();
    candidates.sort_by(|a, b| b.last_invited_at.cmp(&a.last_invited_at));
    Ok(Json(candidates))
}

#[axum::debug_handler]
pub async fn recent_audit(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.audit_service.recent(100).await))
}

#[axum::debug_handler]
pub async fn list_webhooks(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.notification_service.logs().await))
}
