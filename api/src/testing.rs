//! In-process fakes and request helpers for route tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use tower::ServiceExt;

use calmline_core::AnswerPipeline;
use calmline_core::config::PipelineSettings;
use calmline_core::generation::{GenerationError, GenerationRequest, Generator};
use calmline_core::interaction_log::{InteractionLogEntry, InteractionLogger, LogError};
use calmline_core::policy::SafetyPolicy;
use calmline_core::retrieval::{RetrievalError, RetrievedPassage, Retriever};

use crate::state::AppState;

struct NoPassages;

#[async_trait]
impl Retriever for NoPassages {
    async fn retrieve(
        &self,
        _query: &str,
        _k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        Ok(Vec::new())
    }
}

struct FixedReply(String);

#[async_trait]
impl Generator for FixedReply {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }
}

struct DiscardLog;

#[async_trait]
impl InteractionLogger for DiscardLog {
    async fn append(&self, _entry: &InteractionLogEntry) -> Result<(), LogError> {
        Ok(())
    }
}

/// App state whose generator always answers `reply`, with four indexed chunks.
pub fn state_replying(reply: &str) -> AppState {
    AppState {
        pipeline: AnswerPipeline::new(
            PipelineSettings::default(),
            Arc::new(SafetyPolicy::builtin()),
            Arc::new(NoPassages),
            Arc::new(FixedReply(reply.to_string())),
            Arc::new(DiscardLog),
        ),
        indexed_chunks: 4,
    }
}

pub async fn send(
    app: Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, serde_json::Value) {
    let response = app.oneshot(request).await.expect("request should succeed");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, headers, body)
}

pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let (status, _, body) = send(app, request).await;
    (status, body)
}

pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    let (status, _, body) = send(app, request).await;
    (status, body)
}
