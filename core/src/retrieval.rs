use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// A passage returned by the knowledge retriever, with the document it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_id: String,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval index unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookup of the passages most relevant to a question.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` passages, best first. An empty list is a valid answer.
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError>;
}

/// Context handed to the prompt builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalResult {
    pub concatenated_context: String,
    /// Source ids in retrieval order, duplicates included.
    pub sources: Vec<String>,
    /// Context is long enough to ground the answer on.
    pub sufficient: bool,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_passages(passages: &[RetrievedPassage], min_context_length: usize) -> Self {
        if passages.is_empty() {
            return Self::empty();
        }

        let concatenated_context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let sources = passages.iter().map(|p| p.source_id.clone()).collect();
        let sufficient = concatenated_context.chars().count() > min_context_length;

        Self {
            concatenated_context,
            sources,
            sufficient,
        }
    }

    pub fn has_context(&self) -> bool {
        !self.concatenated_context.is_empty()
    }

    /// Source ids with duplicates removed, first-seen order kept.
    pub fn unique_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if !out.contains(source) {
                out.push(source.clone());
            }
        }
        out
    }
}
