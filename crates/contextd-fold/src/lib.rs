//! Provider-aware context-usage fold decisions, compression, and the
//! spawn-a-successor-session protocol.

pub mod compress;
pub mod provider;
pub mod spawn;
pub mod thresholds;

pub use compress::{CompressedTrajectory, Compressor};
pub use spawn::{ShouldSpawnResult, SpawnResult, Suggester};
pub use thresholds::{FoldRecommendation, RecommendedAction, Urgency};

use contextd_domain::{Config, FoldConfig, Provider, Result, TraceEvent};
use contextd_store::Store;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct FoldResult {
    pub checkpoint_id: Uuid,
    pub summary: String,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub tokens_freed: i64,
}

/// Ties together provider detection, threshold evaluation, compression,
/// and the spawn protocol behind one entry point the server talks to.
pub struct FoldEngine {
    config: FoldConfig,
    detector: provider::ProviderDetector,
}

impl FoldEngine {
    pub fn new(cfg: &Config) -> Self {
        FoldEngine { config: cfg.fold.clone(), detector: provider::ProviderDetector::new(&cfg.fold) }
    }

    pub fn active_provider(&self) -> Provider {
        self.detector.detect()
    }

    /// Evaluates whether a session's current context usage warrants a
    /// fold, using the active (auto-detected or explicitly overridden)
    /// provider. Emits a `FoldEvaluated` trace event as a side effect,
    /// since every evaluation is operationally interesting even when the
    /// answer is "continue".
    pub fn should_fold(
        &self,
        session_id: Option<Uuid>,
        context_usage: f64,
        provider_override: Option<Provider>,
    ) -> FoldRecommendation {
        let provider = provider_override.unwrap_or_else(|| self.active_provider());
        let rec = thresholds::should_fold(context_usage, provider);

        TraceEvent::FoldEvaluated {
            session_id: session_id.map(|s| s.to_string()),
            context_usage,
            provider: rec.provider.clone(),
            should_fold: rec.should_fold,
            urgency: rec.urgency.as_str().to_string(),
            recommended_action: rec.recommended_action.as_str().to_string(),
        }
        .emit();

        rec
    }

    /// Compresses `trajectory`, checkpoints the result under `label`, and
    /// lowers the session's recorded token count to the compressed size.
    pub async fn execute_fold(
        &self,
        store: &Store,
        session_id: Uuid,
        trajectory: &str,
        label: &str,
        compressor: &dyn Compressor,
    ) -> Result<FoldResult> {
        let session = store.get_session(session_id)?;
        let tokens_before = session.current_tokens;
        let target_tokens = (tokens_before as f64 * 0.25) as u64;

        let compressed = compressor.compress(trajectory, target_tokens).await?;

        let checkpoint = store.create_checkpoint(
            session_id,
            label,
            serde_json::json!({
                "compressed_summary": compressed.summary,
                "decisions": compressed.decisions,
                "files": compressed.files,
                "errors": compressed.errors,
            }),
            session.context_usage(),
            vec![],
        )?;

        store.update_tokens(session_id, compressed.compressed_tokens)?;

        TraceEvent::FoldExecuted {
            session_id: session_id.to_string(),
            checkpoint_id: checkpoint.id.to_string(),
            tokens_before,
            tokens_after: compressed.compressed_tokens,
        }
        .emit();

        Ok(FoldResult {
            checkpoint_id: checkpoint.id,
            summary: compressed.summary,
            tokens_before,
            tokens_after: compressed.compressed_tokens,
            tokens_freed: tokens_before as i64 - compressed.compressed_tokens as i64,
        })
    }

    /// Evaluates the spawn decision tree against the given signals.
    pub fn should_spawn(
        &self,
        context_usage: f64,
        task_progress: u8,
        recent_outputs: &[String],
        error_count: u32,
    ) -> ShouldSpawnResult {
        spawn::should_spawn(
            context_usage,
            task_progress,
            recent_outputs,
            error_count,
            self.config.spawn_progress_ceiling,
            self.config.spawn_context_threshold,
            self.config.spawn_progress_floor,
            self.config.spawn_error_count_threshold,
        )
    }

    pub async fn execute_spawn(
        &self,
        store: &Store,
        parent_session_id: Uuid,
        handoff_reason: &str,
        task_description: Option<&str>,
        suggester: &dyn Suggester,
    ) -> Result<SpawnResult> {
        spawn::execute_spawn(store, parent_session_id, handoff_reason, task_description, suggester).await
    }
}

/// `Compressor`/`Suggester` implementation with no LLM backing: used when
/// no API key is configured, and in tests. Compression falls back to
/// `compress::parse_reply` on the raw trajectory text itself (so it still
/// extracts `FILES:`/`DECISIONS:`/etc. sections if the trajectory happens
/// to already contain them), and handoff suggestion returns an empty
/// string so the caller's task-description fallback kicks in.
pub struct NullCollaborator;

#[async_trait::async_trait]
impl Compressor for NullCollaborator {
    async fn compress(&self, trajectory: &str, _target_tokens: u64) -> Result<CompressedTrajectory> {
        Ok(compress::parse_reply(trajectory, 4.0))
    }
}

#[async_trait::async_trait]
impl Suggester for NullCollaborator {
    async fn suggest_handoff(&self, _session: &contextd_domain::Session, _reason: &str) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_domain::Config;

    fn engine_with_missing_ccs() -> FoldEngine {
        let mut cfg = Config::default();
        cfg.fold.ccs_config_path = "/nonexistent/config.json".into();
        FoldEngine::new(&cfg)
    }

    fn test_store() -> (Store, tempfile::TempDir) {
        let mut cfg = Config::default();
        let dir = tempfile::tempdir().unwrap();
        cfg.store.db_path = dir.path().join("test.sqlite3");
        cfg.store.archive_dir = dir.path().join("archive");
        (Store::open(&cfg).unwrap(), dir)
    }

    #[test]
    fn defaults_to_anthropic_without_ccs_config() {
        let engine = engine_with_missing_ccs();
        assert_eq!(engine.active_provider(), Provider::Anthropic);
    }

    #[test]
    fn should_fold_respects_provider_override() {
        let engine = engine_with_missing_ccs();
        let rec = engine.should_fold(None, 0.55, Some(Provider::Glm));
        assert!(rec.should_fold);
    }

    #[tokio::test]
    async fn execute_fold_lowers_session_tokens() {
        let (store, _dir) = test_store();
        let session = store.create_session("build the thing", 100_000).unwrap();
        store.update_tokens(session.id, 80_000).unwrap();

        let engine = engine_with_missing_ccs();
        let result = engine
            .execute_fold(&store, session.id, "SUMMARY:\nDid stuff.\n", "auto-fold", &NullCollaborator)
            .await
            .unwrap();

        assert!(result.tokens_after < result.tokens_before);
        let refreshed = store.get_session(session.id).unwrap();
        assert_eq!(refreshed.current_tokens, result.tokens_after);
    }

    #[tokio::test]
    async fn execute_spawn_completes_parent_and_links_child() {
        let (store, _dir) = test_store();
        let parent = store.create_session("long running task", 100_000).unwrap();
        store.update_tokens(parent.id, 95_000).unwrap();

        let engine = engine_with_missing_ccs();
        let result = engine
            .execute_spawn(&store, parent.id, "context_critical", None, &NullCollaborator)
            .await
            .unwrap();

        let parent_after = store.get_session(parent.id).unwrap();
        assert!(parent_after.status.is_terminal());

        let lineage = store.get_lineage_for_child(result.child_session_id).unwrap().unwrap();
        assert_eq!(lineage.parent_session_id, Some(parent.id));
    }
}
