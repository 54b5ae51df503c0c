use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::pipeline::PipelineResult;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to open audit log '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize audit log entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write audit log entry: {0}")]
    Write(#[source] std::io::Error),
}

fn utc_z<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// One audit record per pipeline invocation, written as a single JSON line.
/// Fields that do not apply to the path taken are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionLogEntry {
    #[serde(serialize_with = "utc_z")]
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub is_crisis: bool,
    pub is_medical_request: bool,
    pub is_urgent: bool,
    pub sources: Vec<String>,
    pub validation_failed: bool,
    /// Present when retrieval ran; true when the context was long enough to rely on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub had_pdf_content: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl InteractionLogEntry {
    pub fn new(question: &str, result: &PipelineResult) -> Self {
        Self::at(Utc::now(), question, result)
    }

    pub fn at(timestamp: DateTime<Utc>, question: &str, result: &PipelineResult) -> Self {
        let meta = &result.metadata;
        Self {
            timestamp,
            question: question.to_string(),
            answer: result.reply.clone(),
            is_crisis: meta.is_crisis,
            is_medical_request: meta.is_medical_request,
            is_urgent: meta.is_urgent,
            sources: meta.sources.clone(),
            validation_failed: meta.validation_failed,
            had_pdf_content: meta.had_source_content,
            reason: meta.validation_reason.clone(),
        }
    }

    pub fn to_json_line(&self) -> Result<String, LogError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Append-only sink for interaction records.
#[async_trait]
pub trait InteractionLogger: Send + Sync {
    async fn append(&self, entry: &InteractionLogEntry) -> Result<(), LogError>;
}

/// Line-oriented writer that keeps records whole across failed writes.
///
/// A write that fails partway leaves a fragment without its newline; the
/// next record is then preceded by a newline so it starts on its own line.
struct RecordSink<W> {
    writer: W,
    torn: bool,
}

impl<W: AsyncWrite + Unpin> RecordSink<W> {
    fn new(writer: W) -> Self {
        Self {
            writer,
            torn: false,
        }
    }

    async fn write_record(&mut self, line: &str) -> std::io::Result<()> {
        let outcome = if self.torn {
            let mut buf = String::with_capacity(line.len() + 1);
            buf.push('\n');
            buf.push_str(line);
            self.write_flushed(buf.as_bytes()).await
        } else {
            self.write_flushed(line.as_bytes()).await
        };
        self.torn = outcome.is_err();
        outcome
    }

    async fn write_flushed(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}

/// JSON-lines audit file. Each record goes out in one write while the file
/// lock is held, so concurrent invocations never interleave within a line.
pub struct JsonlInteractionLog {
    path: PathBuf,
    sink: Mutex<RecordSink<tokio::fs::File>>,
}

impl JsonlInteractionLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| LogError::Open {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(open_err)?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        Ok(Self {
            path,
            sink: Mutex::new(RecordSink::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InteractionLogger for JsonlInteractionLog {
    async fn append(&self, entry: &InteractionLogEntry) -> Result<(), LogError> {
        let line = entry.to_json_line()?;
        self.sink
            .lock()
            .await
            .write_record(&line)
            .await
            .map_err(LogError::Write)
    }
}
