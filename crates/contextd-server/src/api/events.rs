//! Live dashboard feed: SSE stream plus its point-in-time snapshots.

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;

use contextd_bus::BusEvent;

use crate::state::AppState;

/// `GET /events` — SSE stream. Emits `init` immediately with the current
/// dashboard snapshot, then `update`/`metrics:update`/`ping` as the bus
/// broadcasts them.
pub async fn events_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let mut sub = state.bus.subscribe();
    let initial = state.watcher_status.read().clone();

    let stream = async_stream::stream! {
        if let Ok(json) = serde_json::to_string(&initial) {
            yield Ok(Event::default().event("init").data(json));
        }
        while let Some(event) = sub.rx.recv().await {
            let (event_type, payload) = match &event {
                BusEvent::Status(status) => ("update", serde_json::to_string(status)),
                BusEvent::Metrics(metrics) => ("metrics:update", serde_json::to_string(metrics)),
                BusEvent::SyncProgress(progress) => ("sync:progress", serde_json::to_string(progress)),
                BusEvent::McpStatus(status) => ("mcp:status", serde_json::to_string(status)),
                BusEvent::Keepalive => (
                    "ping",
                    serde_json::to_string(&serde_json::json!({
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    })),
                ),
            };
            if let Ok(json) = payload {
                yield Ok(Event::default().event(event_type).data(json));
            }
        }
    };

    Sse::new(stream)
}

/// `GET /status` — the most recent `update` payload.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.watcher_status.read().clone())
}

/// `GET /v1/metrics` — the most recent `metrics:update` payload, or a
/// freshly computed one if the periodic snapshot task hasn't run yet.
pub async fn metrics(State(state): State<AppState>) -> crate::error::ApiResult<impl IntoResponse> {
    if let Some(snapshot) = state.metrics.read().clone() {
        return Ok(Json(snapshot));
    }
    let snapshot = state.store.metrics_snapshot()?;
    Ok(Json(snapshot))
}
