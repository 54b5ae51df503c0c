use serde_json::json;

use crate::util::api_request;

pub async fn health(api_url: &str) -> i32 {
    api_request(api_url, reqwest::Method::GET, "/health", None).await
}

pub async fn ask(api_url: &str, question: &str) -> i32 {
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/answer",
        Some(json!({ "question": question })),
    )
    .await
}
