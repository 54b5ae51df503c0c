use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use calmline_core::PipelineResult;
use calmline_core::error::ApiError;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub const MAX_QUESTION_CHARS: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/answer", post(answer))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AnswerRequest {
    /// The user's message, passed to the pipeline verbatim
    pub question: String,
}

fn validate_question(question: &str) -> Result<(), AppError> {
    if question.trim().is_empty() {
        return Err(AppError::Validation {
            message: "question must not be empty".to_string(),
            field: Some("question".to_string()),
            received: Some(serde_json::Value::String(question.to_string())),
            docs_hint: Some("Send the user's message as a non-blank string.".to_string()),
        });
    }

    let chars = question.chars().count();
    if chars > MAX_QUESTION_CHARS {
        return Err(AppError::Validation {
            message: format!(
                "question is {chars} characters long, the limit is {MAX_QUESTION_CHARS}"
            ),
            field: Some("question".to_string()),
            received: None,
            docs_hint: Some("Shorten the message or split it into several questions.".to_string()),
        });
    }

    Ok(())
}

/// Answer one question
///
/// Runs the full safety-gated pipeline. Crisis and medical-advice requests
/// are answered with fixed texts before any retrieval or model call; every
/// other reply carries the educational disclaimer. Collaborator failures
/// degrade to a fixed reply and still return 200.
#[utoipa::path(
    post,
    path = "/v1/answer",
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Pipeline reply with safety metadata", body = PipelineResult),
        (status = 400, description = "Blank or oversized question", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    ),
    tag = "answer"
)]
pub async fn answer(
    State(state): State<AppState>,
    AppJson(req): AppJson<AnswerRequest>,
) -> Result<Json<PipelineResult>, AppError> {
    validate_question(&req.question)?;
    Ok(Json(state.pipeline.answer_question(&req.question).await))
}
