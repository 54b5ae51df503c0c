use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use calmline_core::policy::SafetyPolicy;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/policy", get(get_policy))
}

/// Active safety policy
///
/// The exact phrase sets (crisis, urgent, medical request, prohibited
/// response) and policy version the server is applying, so reviewers can
/// audit them without reading code.
#[utoipa::path(
    get,
    path = "/v1/policy",
    responses(
        (status = 200, description = "Active safety policy", body = SafetyPolicy)
    ),
    tag = "safety"
)]
pub async fn get_policy(State(state): State<AppState>) -> Json<SafetyPolicy> {
    Json(state.pipeline.policy().clone())
}
