use std::sync::Arc;

use parking_lot::RwLock;

use contextd_bus::EventBus;
use contextd_domain::{Config, DashboardUpdate, MetricsSnapshot};
use contextd_fold::{Compressor, FoldEngine, Suggester};
use contextd_memory::{Embedder, MemoryIndex};
use contextd_store::Store;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, store, event bus
/// - **Live status** — the watcher's shared dashboard snapshot, last metrics
/// - **Fold/spawn collaborators** — fold engine, compressor, handoff suggester
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,

    // ── Live status ──────────────────────────────────────────────────
    pub watcher_status: Arc<RwLock<DashboardUpdate>>,
    pub metrics: Arc<RwLock<Option<MetricsSnapshot>>>,

    // ── Fold/spawn collaborators ─────────────────────────────────────
    pub fold: Arc<FoldEngine>,
    pub compressor: Arc<dyn Compressor>,
    pub suggester: Arc<dyn Suggester>,
    pub embedder: Option<Arc<dyn Embedder>>,
}

impl AppState {
    /// Builds a [`MemoryIndex`] borrowing the shared store, configured
    /// with the weights currently in `config.memory`. Cheap enough to
    /// construct per-request since it holds no state of its own beyond
    /// the borrow and three floats.
    pub fn memory_index(&self) -> MemoryIndex<'_> {
        MemoryIndex::new(
            &self.store,
            self.config.memory.keyword_weight,
            self.config.memory.vector_weight,
            self.config.memory.rrf_k,
        )
    }
}
