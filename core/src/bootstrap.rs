//! Process startup: resolve every collaborator from a `PipelineConfig`.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::gemini::GeminiClient;
use crate::generation::GenerationError;
use crate::index::{IndexError, VectorIndex};
use crate::interaction_log::{JsonlInteractionLog, LogError};
use crate::pipeline::AnswerPipeline;
use crate::policy::{PolicyError, SafetyPolicy};

/// Anything that prevents the pipeline from being assembled. These are the
/// only fatal errors; once running, every failure degrades instead.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("generation client error: {0}")]
    Generation(#[from] GenerationError),
    #[error("audit log error: {0}")]
    Log(#[from] LogError),
}

pub struct Assembled {
    pub pipeline: AnswerPipeline,
    pub indexed_chunks: usize,
}

/// The policy named in the config, or the built-in one.
pub fn resolve_policy(
    config_path: Option<&std::path::Path>,
) -> Result<SafetyPolicy, PolicyError> {
    match config_path {
        Some(path) => SafetyPolicy::load(path),
        None => Ok(SafetyPolicy::builtin()),
    }
}

pub async fn assemble(config: &PipelineConfig) -> Result<Assembled, StartupError> {
    let policy = resolve_policy(config.policy_path.as_deref())?;
    let index = VectorIndex::load(&config.index_path)?;
    let generator = GeminiClient::new(config)?;
    let logger = JsonlInteractionLog::open(&config.audit_log_path).await?;

    tracing::info!(
        policy_version = %policy.version,
        indexed_chunks = index.len(),
        model = %config.model,
        audit_log = %config.audit_log_path.display(),
        "answer pipeline assembled"
    );

    let indexed_chunks = index.len();
    Ok(Assembled {
        pipeline: AnswerPipeline::new(
            config,
            Arc::new(policy),
            Arc::new(index),
            Arc::new(generator),
            Arc::new(logger),
        ),
        indexed_chunks,
    })
}
