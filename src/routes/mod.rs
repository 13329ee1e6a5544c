pub mod admin;
pub mod auth;
pub mod candidate;
pub mod health;
pub mod public;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::middleware::{
    auth::{require_admin, require_candidate},
    cors::api_cors,
    rate_limit::{new_rps_state, rps_middleware},
};
use crate::AppState;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let base_routes = Router::new().route("/health", get(health::health));

    let admin_api = Router::new()
        .route("/api/admin/tests", get(admin::list_tests).post(admin::create_test))
        .route(
            "/api/admin/tests/:id",
            get(admin::get_test)
                .patch(admin::update_test)
                .delete(admin::delete_test),
        )
        .route(
            "/api/admin/tests/:id/invitations",
            post(admin::invite_candidates),
        )
        .route("/api/admin/invitations", get(admin::list_invitations))
        .route(
            "/api/admin/invitations/:id",
            delete(admin::revoke_invitation),
        )
        .route("/api/admin/results", get(admin::list_results))
        .route("/api/admin/results/export", get(admin::export_results))
        .route("/api/admin/results/:id", get(admin::get_result))
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/candidates", get(admin::list_candidates))
        .route("/api/admin/audit", get(admin::recent_audit))
        .route("/api/admin/webhooks", get(admin::list_webhooks))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
        .layer(from_fn_with_state(
            new_rps_state(config.admin_rps, config.trust_forwarded_for),
            rps_middleware,
        ));

    let candidate_api = Router::new()
        .route("/api/candidate/invitations", get(candidate::my_invitations))
        .route("/api/candidate/results", get(candidate::my_results))
        .route_layer(from_fn_with_state(state.clone(), require_candidate));

    let public_api = Router::new()
        .route("/api/auth/login", post(auth::admin_login))
        .route("/api/auth/candidate/login", post(auth::candidate_login))
        .route(
            "/api/public/tests/:token",
            get(public::get_test_by_token),
        )
        .route("/api/public/tests/:token/start", post(public::start_test))
        .route("/api/public/tests/:token/session", get(public::get_session))
        .route("/api/public/tests/:token/next", post(public::next_question))
        .route(
            "/api/public/tests/:token/previous",
            post(public::previous_question),
        )
        .route("/api/public/tests/:token/answer", put(public::record_answer))
        .route("/api/public/tests/:token/submit", post(public::submit_test))
        .route("/api/public/tests/:token/status", get(public::get_status))
        .route("/api/public/tests/:token/result", get(public::get_result))
        .merge(candidate_api)
        .layer(from_fn_with_state(
            new_rps_state(config.public_rps, config.trust_forwarded_for),
            rps_middleware,
        ));

    base_routes
        .merge(admin_api)
        .merge(public_api)
        .with_state(state)
        .layer(api_cors())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
}
