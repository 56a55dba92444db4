//! Maps the shared `contextd_domain::Error` onto HTTP responses.
//!
//! `axum::response::IntoResponse` and `contextd_domain::Error` are both
//! foreign to this crate, so the orphan rule forces a local wrapper —
//! there's no way to `impl IntoResponse for contextd_domain::Error`
//! directly from here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

pub struct ApiError(contextd_domain::Error);

impl From<contextd_domain::Error> for ApiError {
    fn from(err: contextd_domain::Error) -> Self {
        ApiError(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError(contextd_domain::Error::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            contextd_domain::Error::NotFound(_) => StatusCode::NOT_FOUND,
            contextd_domain::Error::InvalidTransition(_) => StatusCode::CONFLICT,
            contextd_domain::Error::Validation(_) => StatusCode::BAD_REQUEST,
            contextd_domain::Error::ExternalUnavailable(_) => StatusCode::BAD_GATEWAY,
            contextd_domain::Error::StoreConflict(_) => StatusCode::CONFLICT,
            contextd_domain::Error::Io(_)
            | contextd_domain::Error::Json(_)
            | contextd_domain::Error::Sqlite(_)
            | contextd_domain::Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
