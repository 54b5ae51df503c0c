use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:7860";

/// Build a CORS layer from `CALMLINE_CORS_ORIGINS` (comma-separated,
/// default `http://localhost:7860`). Only GET/POST with a JSON body are
/// needed by browser front-ends.
pub fn build_cors_layer() -> CorsLayer {
    let raw = std::env::var("CALMLINE_CORS_ORIGINS")
        .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string());

    CorsLayer::new()
        .allow_origin(parse_origins(&raw))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type")])
        .max_age(std::time::Duration::from_secs(3600))
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    let mut seen: Vec<&str> = Vec::new();
    for origin in raw.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        if !seen.iter().any(|s| s.eq_ignore_ascii_case(origin)) {
            seen.push(origin);
        }
    }
    seen.into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect()
}
