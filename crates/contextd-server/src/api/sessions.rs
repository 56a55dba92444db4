//! Session listing and lineage introspection. Not a scope expansion: the
//! Store already exposes `list_active`/`get_session`/`get_lineage`, this
//! just gives the dashboard an HTTP path to them.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /sessions` — all active sessions.
pub async fn list_active(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sessions = state.store.list_active()?;
    Ok(Json(sessions))
}

/// `GET /sessions/:id`.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = state.store.get_session(id)?;
    Ok(Json(session))
}

/// `GET /sessions/:id/lineage` — root-first ancestor chain, the queried
/// session last.
pub async fn get_lineage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let lineage = state.store.get_lineage(id)?;
    Ok(Json(lineage))
}
