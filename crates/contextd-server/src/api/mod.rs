pub mod checkpoints;
pub mod compress;
pub mod events;
pub mod fold;
pub mod health;
pub mod memories;
pub mod search;
pub mod sessions;
pub mod spawn;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full route table. No auth layer: the sidecar binds to
/// loopback by default and is meant to sit behind whatever the host
/// process already trusts.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/events", get(events::events_sse))
        .route("/status", get(events::status))
        .route("/v1/metrics", get(events::metrics))
        .route("/memories", post(memories::add_memory))
        .route("/memories/session/:id", get(memories::list_for_session))
        .route("/memories/:session/:id", delete(memories::delete_memory))
        .route("/search", post(search::search))
        .route("/compress", post(compress::compress))
        .route("/should-fold", post(fold::should_fold))
        .route("/fold", post(fold::fold))
        .route("/should-spawn", post(spawn::should_spawn))
        .route("/spawn", post(spawn::spawn))
        .route("/checkpoints", post(checkpoints::create_checkpoint))
        .route("/checkpoints/:session_id", get(checkpoints::list_checkpoints))
        .route("/checkpoints/:id/restore", post(checkpoints::restore_checkpoint))
        .route("/sessions", get(sessions::list_active))
        .route("/sessions/:id", get(sessions::get_session))
        .route("/sessions/:id/lineage", get(sessions::get_lineage))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
