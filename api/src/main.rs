use std::net::SocketAddr;
use std::process::ExitCode;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use calmline_core::bootstrap;
use calmline_core::config::PipelineConfig;

mod error;
mod extract;
mod middleware;
mod routes;
mod state;
#[cfg(test)]
mod testing;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Calmline API",
        version = "0.1.0",
        description = "Safety-gated answers to anxiety and panic coping questions. Educational information only, not a substitute for professional care."
    ),
    paths(
        routes::health::health_check,
        routes::answer::answer,
        routes::policy::get_policy,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::answer::AnswerRequest,
        calmline_core::error::ApiError,
        calmline_core::PipelineResult,
        calmline_core::PipelineMetadata,
        calmline_core::Terminal,
        calmline_core::policy::SafetyPolicy,
    ))
)]
struct ApiDoc;

fn app(app_state: state::AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::answer::router().layer(middleware::rate_limit::answer_layer()))
        .merge(routes::policy::router().layer(middleware::rate_limit::read_layer()))
        .fallback(routes::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "calmline_api=debug,calmline_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let assembled = match bootstrap::assemble(&config).await {
        Ok(assembled) => assembled,
        Err(e) => {
            tracing::error!(error = %e, "failed to start answer pipeline");
            return ExitCode::FAILURE;
        }
    };

    let app_state = state::AppState {
        pipeline: assembled.pipeline,
        indexed_chunks: assembled.indexed_chunks,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Calmline API listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %e, "server terminated");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::testing::{get_json, state_replying};

    #[tokio::test]
    async fn unknown_route_is_a_structured_not_found() {
        let (status, body) = get_json(app(state_replying("unused")), "/v1/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[test]
    fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/v1/answer", "/v1/policy"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
