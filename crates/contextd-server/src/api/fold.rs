use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use contextd_domain::{Error, Provider};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShouldFoldBody {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub context_usage: f64,
    #[serde(default)]
    pub provider: Option<String>,
}

/// `POST /should-fold`.
pub async fn should_fold(
    State(state): State<AppState>,
    Json(body): Json<ShouldFoldBody>,
) -> ApiResult<impl IntoResponse> {
    let provider = body
        .provider
        .as_deref()
        .map(|s| Provider::parse(s).ok_or_else(|| Error::Validation(format!("unknown provider: {s}"))))
        .transpose()?;
    let rec = state.fold.should_fold(body.session_id, body.context_usage, provider);
    Ok(Json(rec))
}

#[derive(Debug, Deserialize)]
pub struct FoldBody {
    pub session_id: Uuid,
    pub trajectory: String,
    pub label: String,
}

/// `POST /fold` — executes the fold: compress, checkpoint, lower
/// `current_tokens`.
pub async fn fold(
    State(state): State<AppState>,
    Json(body): Json<FoldBody>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .fold
        .execute_fold(&state.store, body.session_id, &body.trajectory, &body.label, state.compressor.as_ref())
        .await?;
    Ok(Json(result))
}
