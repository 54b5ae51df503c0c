use axum::http::Uri;

use crate::error::AppError;

pub mod answer;
pub mod health;
pub mod policy;

/// Fallback for unknown paths, in the same error shape as everything else.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound {
        resource: uri.path().to_string(),
    }
}
