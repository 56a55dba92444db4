use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use contextd_domain::{Error, MemoryCategory, Priority};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddMemoryBody {
    pub session_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// `POST /memories`.
pub async fn add_memory(
    State(state): State<AppState>,
    Json(body): Json<AddMemoryBody>,
) -> ApiResult<impl IntoResponse> {
    let category = match body.category {
        Some(ref s) => MemoryCategory::parse(s)
            .ok_or_else(|| ApiError::from(Error::Validation(format!("unknown category: {s}"))))?,
        None => MemoryCategory::Other,
    };
    let priority = match body.priority {
        Some(ref s) => Priority::parse(s)
            .ok_or_else(|| ApiError::from(Error::Validation(format!("unknown priority: {s}"))))?,
        None => Priority::Normal,
    };
    let memory = state
        .store
        .add_memory(body.session_id, &body.content, category, priority, body.metadata)?;
    Ok(Json(memory))
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    pub limit: Option<usize>,
}

/// `GET /memories/session/:id?limit=`.
pub async fn list_for_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ListMemoriesQuery>,
) -> ApiResult<impl IntoResponse> {
    let mut memories = state.store.list_memories(session_id)?;
    if let Some(limit) = query.limit {
        memories.truncate(limit);
    }
    Ok(Json(memories))
}

/// `DELETE /memories/:session/:id`.
pub async fn delete_memory(
    State(state): State<AppState>,
    Path((session_id, id)): Path<(Uuid, Uuid)>,
) -> ApiResult<impl IntoResponse> {
    let memory = state.store.get_memory(id)?;
    if memory.session_id != session_id {
        return Err(Error::NotFound(format!("memory {id} in session {session_id}")).into());
    }
    state.store.delete_memory(id)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
