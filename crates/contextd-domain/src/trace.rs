//! Structured trace events emitted across all contextd crates.
//!
//! These integrate with the `tracing` crate and are machine-parseable: each
//! variant is emitted as a single `tracing::info!` call carrying the
//! serialized event under the `trace_event` field, so a JSON log formatter
//! (see `contextd-server`'s `main.rs`) can be grepped or shipped without a
//! bespoke event pipeline.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        task_description: String,
        auto_detected: bool,
    },
    SessionTokensUpdated {
        session_id: String,
        current_tokens: u64,
        context_usage: f64,
    },
    SessionTransition {
        session_id: String,
        from: String,
        to: String,
    },
    MemoryAdded {
        session_id: String,
        memory_id: String,
        category: String,
    },
    MemoryCurated {
        session_id: String,
        removed: usize,
        remaining: usize,
        tokens_freed: usize,
    },
    CheckpointCreated {
        session_id: String,
        checkpoint_id: String,
        context_usage: f64,
        memory_count: usize,
    },
    LineageCreated {
        parent_session_id: String,
        child_session_id: String,
        reason: String,
    },
    FoldEvaluated {
        session_id: Option<String>,
        context_usage: f64,
        provider: String,
        should_fold: bool,
        urgency: String,
        recommended_action: String,
    },
    FoldExecuted {
        session_id: String,
        checkpoint_id: String,
        tokens_before: u64,
        tokens_after: u64,
    },
    SpawnExecuted {
        parent_session_id: String,
        child_session_id: String,
        reason: String,
    },
    WatcherSourceDiscovered {
        source_name: String,
        projects_dir: String,
    },
    WatcherTranscriptUpdate {
        source_name: String,
        project_name: String,
        current_tokens: u64,
        is_real_tokens: bool,
    },
    WatcherTranscriptInactive {
        source_name: String,
        project_name: String,
    },
    BusSubscriberAdded {
        subscriber_count: usize,
    },
    BusSubscriberRemoved {
        subscriber_count: usize,
        reason: &'static str,
    },
    BusBroadcastCoalesced {
        event: &'static str,
    },
}

impl TraceEvent {
    /// Emit this event as a tracing span event.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "contextd_event");
    }
}
