use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompressBody {
    pub trajectory: String,
    /// Desired compressed size in tokens; the compressor treats this as a
    /// target, not a hard cap.
    pub target_tokens: u64,
}

/// `POST /compress` — direct passthrough to the configured `Compressor`,
/// with the original/compressed token accounting the fold engine itself
/// derives from the compressor's result.
pub async fn compress(
    State(state): State<AppState>,
    Json(body): Json<CompressBody>,
) -> ApiResult<impl IntoResponse> {
    let original_tokens = (body.trajectory.len() as f64 / 4.0).round() as u64;
    let result = state.compressor.compress(&body.trajectory, body.target_tokens).await?;
    let tokens_saved = original_tokens.saturating_sub(result.compressed_tokens);
    let compression_ratio = if original_tokens == 0 {
        0.0
    } else {
        result.compressed_tokens as f64 / original_tokens as f64
    };

    Ok(Json(serde_json::json!({
        "summary": result.summary,
        "decisions": result.decisions,
        "files": result.files,
        "errors": result.errors,
        "original_tokens": original_tokens,
        "compressed_tokens": result.compressed_tokens,
        "tokens_saved": tokens_saved,
        "compression_ratio": compression_ratio,
    })))
}
