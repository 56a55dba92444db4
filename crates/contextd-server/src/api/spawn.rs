use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShouldSpawnBody {
    pub context_usage: f64,
    pub task_progress: u8,
    #[serde(default)]
    pub recent_outputs: Vec<String>,
    #[serde(default)]
    pub error_count: u32,
}

/// `POST /should-spawn`.
pub async fn should_spawn(
    State(state): State<AppState>,
    Json(body): Json<ShouldSpawnBody>,
) -> impl IntoResponse {
    let result = state.fold.should_spawn(
        body.context_usage,
        body.task_progress,
        &body.recent_outputs,
        body.error_count,
    );
    Json(result)
}

#[derive(Debug, Deserialize)]
pub struct SpawnBody {
    pub parent_session_id: Uuid,
    pub handoff_reason: String,
    #[serde(default)]
    pub task_description: Option<String>,
}

/// `POST /spawn` — checkpoint → handoff prompt → child session → lineage
/// → complete parent.
pub async fn spawn(
    State(state): State<AppState>,
    Json(body): Json<SpawnBody>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .fold
        .execute_spawn(
            &state.store,
            body.parent_session_id,
            &body.handoff_reason,
            body.task_description.as_deref(),
            state.suggester.as_ref(),
        )
        .await?;
    Ok(Json(result))
}
