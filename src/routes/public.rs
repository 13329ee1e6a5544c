use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::assessment::{Session, SessionStatus};
use crate::dto::public_dto::{
    GetTestByTokenResponse, PublicInvitationSummary, PublicTestSummary, RecordAnswerRequest,
    SessionView, StatusResponse, SubmitTestResponse,
};
use crate::error::Result;
use crate::models::invitation::InvitationStatus;
use crate::utils::time::format_countdown;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_test_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let (invitation, test) = state.attempt_service.open(&token).await?;
    Ok(Json(GetTestByTokenResponse {
        test: PublicTestSummary::from(&*test),
        invitation: PublicInvitationSummary::from(&invitation),
    }))
}

#[axum::debug_handler]
pub async fn start_test(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let snapshot = state
        .attempt_service
        .start(&token, |session| SessionView::from(session))
        .await?;
    Ok(Json(snapshot.view))
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state
        .attempt_service
        .with_session(&token, |session| Ok(SessionView::from(&*session)))
        .await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn next_question(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state
        .attempt_service
        .with_session(&token, |session| {
            session.go_to_next();
            Ok(SessionView::from(&*session))
        })
        .await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn previous_question(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let view = state
        .attempt_service
        .with_session(&token, |session| {
            session.go_to_previous();
            Ok(SessionView::from(&*session))
        })
        .await?;
    Ok(Json(view))
}

/// Records the answer for the question currently on screen.
#[axum::debug_handler]
pub async fn record_answer(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse> {
    let view = state
        .attempt_service
        .with_session(&token, |session| {
            session.record_answer(req.option_index)?;
            Ok(SessionView::from(&*session))
        })
        .await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn submit_test(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let outcome = state.attempt_service.submit(&token).await?;
    if !outcome.fresh {
        tracing::info!(
            invitation_id = %outcome.record.invitation_id,
            "repeated submit answered from stored result"
        );
    }
    Ok(Json(SubmitTestResponse {
        already_submitted: !outcome.fresh,
        result: outcome.record,
    }))
}

fn progress(session: &Session) -> (u32, usize, usize, SessionStatus) {
    (
        session.remaining_seconds(),
        session.answered_count(),
        session.total_questions(),
        session.status(),
    )
}

#[axum::debug_handler]
pub async fn get_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let (invitation, live) = state.attempt_service.status(&token, progress).await?;

    let response = match live {
        Some((remaining, answered, total, status)) => StatusResponse {
            invitation_status: invitation.status,
            session_status: Some(status),
            remaining_seconds: Some(remaining),
            remaining_display: Some(format_countdown(remaining)),
            answered_count: answered,
            total_questions: total,
        },
        None if invitation.status == InvitationStatus::Completed => {
            let record = state.result_service.find_by_invitation(invitation.id).await?;
            StatusResponse {
                invitation_status: invitation.status,
                session_status: None,
                remaining_seconds: None,
                remaining_display: None,
                answered_count: record
                    .per_question
                    .iter()
                    .filter(|q| q.selection.option_index().is_some())
                    .count(),
                total_questions: record.total_questions,
            }
        }
        None => {
            let total = state
                .test_service
                .get_test_by_id(invitation.test_id)
                .await?
                .questions
                .len();
            StatusResponse {
                invitation_status: invitation.status,
                session_status: None,
                remaining_seconds: None,
                remaining_display: None,
                answered_count: 0,
                total_questions: total,
            }
        }
    };
    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    let record = state.attempt_service.result(&token).await?;
    Ok(Json(record))
}
