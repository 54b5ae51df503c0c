//! `AppJson<T>`: `axum::Json<T>` whose rejections come back as `AppError`
//! bodies rather than axum's plain-text 4xx.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};

use crate::error::AppError;

pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| AppJson(value))
            .map_err(rejection_to_error)
    }
}

const BODY_HINT: &str =
    r#"Send a JSON object such as {"question": "How do I stop a panic attack?"}"#;

fn rejection_to_error(rejection: JsonRejection) -> AppError {
    let detail = rejection.body_text();
    AppError::Validation {
        field: Some(field_named_in(&detail).unwrap_or_else(|| "body".into())),
        message: format!("Invalid request body: {detail}"),
        received: None,
        docs_hint: Some(BODY_HINT.to_string()),
    }
}

/// Field name from serde's "missing field `x`" / "unknown field `x`" messages.
fn field_named_in(detail: &str) -> Option<String> {
    ["missing field `", "unknown field `"]
        .iter()
        .find_map(|marker| {
            let rest = &detail[detail.find(marker)? + marker.len()..];
            rest.find('`').map(|end| rest[..end].to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_missing_field() {
        let detail =
            "Failed to deserialize the JSON body: missing field `question` at line 1 column 2";
        assert_eq!(field_named_in(detail).as_deref(), Some("question"));
    }

    #[test]
    fn names_unknown_field() {
        assert_eq!(
            field_named_in("unknown field `prompt`, expected `question`").as_deref(),
            Some("prompt")
        );
    }

    #[test]
    fn other_messages_have_no_field() {
        assert_eq!(field_named_in("invalid type: integer, expected a string"), None);
    }
}
