use calmline_core::bootstrap;
use calmline_core::config::PipelineConfig;
use calmline_core::{AnswerPipeline, PipelineResult};

use crate::util::exit_error;

const ENV_HINT: &str =
    "Set GOOGLE_API_KEY (and optionally CALMLINE_* overrides) in the environment or .env.";

/// Assemble the in-process pipeline from the environment, or exit with a
/// structured error.
pub async fn local_pipeline() -> AnswerPipeline {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => exit_error(&e.to_string(), Some(ENV_HINT)),
    };
    match bootstrap::assemble(&config).await {
        Ok(assembled) => assembled.pipeline,
        Err(e) => exit_error(&e.to_string(), None),
    }
}

pub fn render(result: &PipelineResult, json: bool) -> String {
    if json {
        serde_json::to_string_pretty(result).unwrap_or_else(|_| result.reply.clone())
    } else {
        result.reply.clone()
    }
}

pub async fn run(question: &str, json: bool) -> i32 {
    if question.trim().is_empty() {
        exit_error("question must not be empty", None);
    }
    let pipeline = local_pipeline().await;
    let result = pipeline.answer_question(question).await;
    println!("{}", render(&result, json));
    0
}
