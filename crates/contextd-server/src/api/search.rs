use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f64>,
}

/// `POST /search` — keyword search, hybridized with vector similarity
/// when an embedder is configured and `session_id` is given. Omitting
/// `session_id` means cross-session, which only the keyword layer
/// supports (embeddings are scoped per session).
pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> ApiResult<impl IntoResponse> {
    let index = state.memory_index();

    let mut hits = match body.session_id {
        Some(session_id) => {
            let query_embedding = match &state.embedder {
                Some(embedder) => embedder
                    .embed_batch(std::slice::from_ref(&body.query))
                    .await
                    .ok()
                    .and_then(|mut v| v.pop()),
                None => None,
            };
            index
                .hybrid_search(session_id, &body.query, query_embedding.as_deref(), body.top_k)
                .await?
        }
        None => index.search_index_global(&body.query, body.top_k)?,
    };

    if let Some(min_score) = body.min_score {
        hits.retain(|h| h.score >= min_score);
    }

    Ok(Json(hits))
}
