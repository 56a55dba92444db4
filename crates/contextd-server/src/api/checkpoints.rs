use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCheckpointBody {
    pub session_id: Uuid,
    pub label: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `POST /checkpoints` — snapshots the session's current fields and
/// memory id list atomically.
pub async fn create_checkpoint(
    State(state): State<AppState>,
    Json(body): Json<CreateCheckpointBody>,
) -> ApiResult<impl IntoResponse> {
    let session = state.store.get_session(body.session_id)?;
    let memories_snapshot: Vec<Uuid> =
        state.store.list_memories(body.session_id)?.into_iter().map(|m| m.id).collect();
    let state_view = serde_json::to_value(&session)?;

    let checkpoint = state.store.create_checkpoint_with_metadata(
        body.session_id,
        &body.label,
        state_view,
        session.context_usage(),
        memories_snapshot,
        body.metadata,
    )?;
    Ok(Json(checkpoint))
}

/// `GET /checkpoints/:session_id`.
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let checkpoints = state.store.list_checkpoints(session_id)?;
    Ok(Json(checkpoints))
}

/// `POST /checkpoints/:id/restore` — a read view, does not mutate the
/// session. Memories the checkpoint snapshotted but that have since been
/// deleted are silently omitted rather than treated as an error.
pub async fn restore_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let checkpoint = state.store.get_checkpoint(id)?;
    let memories: Vec<_> = checkpoint
        .memories_snapshot
        .iter()
        .filter_map(|mid| state.store.get_memory(*mid).ok())
        .collect();
    Ok(Json(serde_json::json!({
        "checkpoint": checkpoint,
        "memories": memories,
    })))
}
