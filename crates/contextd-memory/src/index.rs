//! Three-layer progressive disclosure and hybrid search over a session's
//! memories.
//!
//! Each layer trades detail for token budget: `search_index` results are
//! cheap enough to scan dozens of at once, `get_timeline` gives enough
//! surrounding context to judge relevance, and `get_full` is the raw
//! record for whichever few ids the caller actually wants to read.

use std::collections::HashMap;

use contextd_domain::{Memory, Result};
use contextd_store::vector::cosine_similarity;
use contextd_store::Store;
use uuid::Uuid;

pub const SEARCH_INDEX_TOKEN_BUDGET: usize = 50;
pub const TIMELINE_TOKEN_BUDGET: usize = 150;
pub const FULL_TOKEN_BUDGET: usize = 500;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchIndexEntry {
    pub id: Uuid,
    pub summary: String,
    pub category: String,
    pub priority: String,
    pub score: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub summary: String,
    pub category: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_after: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FullEntry {
    pub id: Uuid,
    pub content: String,
    pub category: String,
    pub priority: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Embeds arbitrary text into the store's configured vector dimension.
/// Implementations wrap an external embedding API; batched calls should
/// tolerate partial failure (see `embed_session_memories`).
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct MemoryIndex<'a> {
    store: &'a Store,
    keyword_weight: f64,
    vector_weight: f64,
    rrf_k: f64,
}

impl<'a> MemoryIndex<'a> {
    pub fn new(store: &'a Store, keyword_weight: f64, vector_weight: f64, rrf_k: f64) -> Self {
        MemoryIndex { store, keyword_weight, vector_weight, rrf_k }
    }

    /// Keyword-only layer-1 search. The store's FTS index supplies the
    /// candidate set; this computes the query's exact scoring formula on
    /// top of it since bm25 ranking alone doesn't match the spec's
    /// distinct-token-coverage metric.
    pub fn search_index(&self, session_id: Uuid, query: &str, top_k: usize) -> Result<Vec<SearchIndexEntry>> {
        let candidates = self.store.search_memories_fts(session_id, &fts_query(query), top_k.max(1) * 4)?;
        let mut scored: Vec<(Memory, f64)> = candidates
            .into_iter()
            .map(|m| {
                let score = keyword_score(query, &m.content);
                (m, score)
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap()
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(m, score)| SearchIndexEntry {
                id: m.id,
                summary: truncate_chars(&m.content, 50),
                category: m.category.as_str().to_string(),
                priority: m.priority.as_str().to_string(),
                score,
            })
            .collect())
    }

    /// Cross-session variant of [`MemoryIndex::search_index`], for callers
    /// that omit a session id and mean to search everything.
    pub fn search_index_global(&self, query: &str, top_k: usize) -> Result<Vec<SearchIndexEntry>> {
        let candidates = self.store.search_memories_fts_global(&fts_query(query), top_k.max(1) * 4)?;
        let mut scored: Vec<(Memory, f64)> = candidates
            .into_iter()
            .map(|m| {
                let score = keyword_score(query, &m.content);
                (m, score)
            })
            .collect();
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap()
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(m, score)| SearchIndexEntry {
                id: m.id,
                summary: truncate_chars(&m.content, 50),
                category: m.category.as_str().to_string(),
                priority: m.priority.as_str().to_string(),
                score,
            })
            .collect())
    }

    /// Layer-2: timeline view over specific ids, with each entry's
    /// immediate neighbors in insertion (`created_at`) order.
    pub fn get_timeline(&self, session_id: Uuid, ids: &[Uuid]) -> Result<Vec<TimelineEntry>> {
        let all = self.store.list_memories(session_id)?; // created_at DESC
        let mut ordered = all.clone();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at)); // ASC for neighbor lookup

        let position: HashMap<Uuid, usize> =
            ordered.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        let by_id: HashMap<Uuid, &Memory> = ordered.iter().map(|m| (m.id, m)).collect();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(memory) = by_id.get(id) else { continue };
            let idx = position[id];
            let context_before = idx.checked_sub(1).and_then(|i| ordered.get(i)).map(|m| truncate_chars(&m.content, 50));
            let context_after = ordered.get(idx + 1).map(|m| truncate_chars(&m.content, 50));
            out.push(TimelineEntry {
                id: memory.id,
                summary: truncate_chars(&memory.content, 150),
                category: memory.category.as_str().to_string(),
                created_at: memory.created_at,
                context_before,
                context_after,
            });
        }
        Ok(out)
    }

    /// Layer-3: full records, content capped at ~2000 chars.
    pub fn get_full(&self, session_id: Uuid, ids: &[Uuid]) -> Result<Vec<FullEntry>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let memory = self.store.get_memory(*id)?;
            if memory.session_id != session_id {
                continue;
            }
            out.push(FullEntry {
                id: memory.id,
                content: truncate_chars(&memory.content, 2000),
                category: memory.category.as_str().to_string(),
                priority: memory.priority.as_str().to_string(),
                created_at: memory.created_at,
                metadata: memory.metadata,
            });
        }
        Ok(out)
    }

    /// Hybrid search: keyword ranking fused with vector-similarity ranking
    /// via Reciprocal Rank Fusion. Falls back to keyword-only when the
    /// session has no embedded memories yet.
    pub async fn hybrid_search(
        &self,
        session_id: Uuid,
        query: &str,
        query_embedding: Option<&[f32]>,
        top_k: usize,
    ) -> Result<Vec<SearchIndexEntry>> {
        let keyword_hits = self.search_index(session_id, query, top_k.max(1) * 2)?;

        let Some(query_vec) = query_embedding else {
            let mut hits = keyword_hits;
            hits.truncate(top_k);
            return Ok(hits);
        };

        let embedded = self.store.memories_with_embeddings(session_id)?;
        let mut vector_ranked: Vec<(Uuid, f64)> = embedded
            .iter()
            .filter_map(|m| m.embedding.as_ref().map(|e| (m.id, cosine_similarity(query_vec, e))))
            .collect();
        vector_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        vector_ranked.truncate(top_k * 2);

        let kw_rank: HashMap<Uuid, usize> =
            keyword_hits.iter().enumerate().map(|(i, e)| (e.id, i + 1)).collect();
        let vec_rank: HashMap<Uuid, usize> =
            vector_ranked.iter().enumerate().map(|(i, (id, _))| (*id, i + 1)).collect();

        let mut all_ids: Vec<Uuid> = kw_rank.keys().chain(vec_rank.keys()).copied().collect();
        all_ids.sort();
        all_ids.dedup();

        let mut fused: Vec<(Uuid, f64)> = all_ids
            .into_iter()
            .map(|id| {
                let kw_score = kw_rank.get(&id).map(|r| self.keyword_weight / (self.rrf_k + *r as f64)).unwrap_or(0.0);
                let vec_score = vec_rank.get(&id).map(|r| self.vector_weight / (self.rrf_k + *r as f64)).unwrap_or(0.0);
                (id, kw_score + vec_score)
            })
            .collect();
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        fused.truncate(top_k);

        let by_id: HashMap<Uuid, &SearchIndexEntry> = keyword_hits.iter().map(|e| (e.id, e)).collect();
        let mut out = Vec::with_capacity(fused.len());
        for (id, fused_score) in fused {
            if let Some(entry) = by_id.get(&id) {
                out.push(SearchIndexEntry { score: fused_score, ..(*entry).clone() });
            } else if let Ok(memory) = self.store.get_memory(id) {
                out.push(SearchIndexEntry {
                    id,
                    summary: truncate_chars(&memory.content, 50),
                    category: memory.category.as_str().to_string(),
                    priority: memory.priority.as_str().to_string(),
                    score: fused_score,
                });
            }
        }
        Ok(out)
    }

    /// Fans out to whichever layer `depth` names and reports the token
    /// estimate callers use to plan an LLM context budget.
    pub fn progressive_search(
        &self,
        session_id: Uuid,
        query: &str,
        depth: u8,
        top_k: usize,
    ) -> Result<ProgressiveSearchResult> {
        match depth {
            1 => {
                let results = self.search_index(session_id, query, top_k)?;
                let count = results.len();
                Ok(ProgressiveSearchResult {
                    layer: "search_index".to_string(),
                    count,
                    estimated_tokens: count * SEARCH_INDEX_TOKEN_BUDGET,
                    search_index: results,
                    timeline: vec![],
                    full: vec![],
                })
            }
            2 => {
                let hits = self.search_index(session_id, query, top_k)?;
                let ids: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
                let results = self.get_timeline(session_id, &ids)?;
                let count = results.len();
                Ok(ProgressiveSearchResult {
                    layer: "get_timeline".to_string(),
                    count,
                    estimated_tokens: count * TIMELINE_TOKEN_BUDGET,
                    search_index: vec![],
                    timeline: results,
                    full: vec![],
                })
            }
            _ => {
                let hits = self.search_index(session_id, query, top_k)?;
                let ids: Vec<Uuid> = hits.iter().map(|h| h.id).collect();
                let results = self.get_full(session_id, &ids)?;
                let count = results.len();
                Ok(ProgressiveSearchResult {
                    layer: "get_full".to_string(),
                    count,
                    estimated_tokens: count * FULL_TOKEN_BUDGET,
                    search_index: vec![],
                    timeline: vec![],
                    full: results,
                })
            }
        }
    }

    /// Embeds all memories in `session_id` with no embedding yet, in
    /// batches of `batch_size`. A batch that fails to embed is skipped;
    /// memories already embedded by earlier batches stay written.
    pub async fn embed_session_memories(
        &self,
        session_id: Uuid,
        batch_size: usize,
        embedder: &dyn Embedder,
    ) -> Result<EmbeddingProgress> {
        let pending: Vec<Memory> = self
            .store
            .list_memories(session_id)?
            .into_iter()
            .filter(|m| m.embedding.is_none())
            .collect();

        let mut embedded = 0;
        let mut failed_batches = 0;
        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|m| m.content.clone()).collect();
            match embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    for (memory, vector) in batch.iter().zip(vectors) {
                        self.store.set_embedding(memory.id, &vector)?;
                        embedded += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, batch_len = batch.len(), "embedding batch failed, skipping");
                    failed_batches += 1;
                }
            }
        }
        Ok(EmbeddingProgress { embedded, failed_batches })
    }

    /// Evicts the lowest-value memories until at most `keep_top` remain.
    /// Protected categories (decision, error) never count toward the
    /// eviction pool regardless of score.
    pub fn curate(&self, session_id: Uuid, keep_top: usize) -> Result<CurationResult> {
        let all = self.store.list_memories(session_id)?;
        let mut scored: Vec<(Memory, f64)> = all
            .into_iter()
            .map(|m| {
                let score = if m.category.is_protected() {
                    f64::INFINITY
                } else {
                    m.access_count as f64 * 10.0 + if m.priority == contextd_domain::Priority::High { 50.0 } else { 0.0 }
                };
                (m, score)
            })
            .collect();
        scored.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap());

        let total = scored.len();
        let to_remove = total.saturating_sub(keep_top);
        let mut tokens_freed = 0usize;
        let mut removed = 0usize;
        for (memory, _) in scored.into_iter().take(to_remove) {
            if memory.category.is_protected() {
                continue;
            }
            tokens_freed += memory.content.len() / 4;
            self.store.delete_memory(memory.id)?;
            removed += 1;
        }

        let remaining = total - removed;
        contextd_domain::TraceEvent::MemoryCurated {
            session_id: session_id.to_string(),
            removed,
            remaining,
            tokens_freed,
        }
        .emit();

        Ok(CurationResult { removed, remaining, tokens_freed })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressiveSearchResult {
    pub layer: String,
    pub count: usize,
    pub estimated_tokens: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_index: Vec<SearchIndexEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub full: Vec<FullEntry>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EmbeddingProgress {
    pub embedded: usize,
    pub failed_batches: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CurationResult {
    pub removed: usize,
    pub remaining: usize,
    pub tokens_freed: usize,
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}…")
}

/// FTS5 MATCH needs its operators escaped/quoted; the simplest safe query
/// is a whitespace-joined OR of quoted tokens, which also widens recall
/// beyond an exact phrase match for the application-level scorer above.
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// `distinct query tokens found in content / distinct query tokens`.
fn keyword_score(query: &str, content: &str) -> f64 {
    let query_tokens: std::collections::HashSet<String> =
        query.split_whitespace().map(|t| t.to_lowercase()).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = query_tokens.iter().filter(|t| content_lower.contains(t.as_str())).count();
    hits as f64 / query_tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_domain::{Config, MemoryCategory, Priority};
    use std::collections::HashMap as Map;

    fn test_store() -> (Store, tempfile::TempDir) {
        let mut cfg = Config::default();
        let dir = tempfile::tempdir().unwrap();
        cfg.store.db_path = dir.path().join("test.sqlite3");
        cfg.store.archive_dir = dir.path().join("archive");
        (Store::open(&cfg).unwrap(), dir)
    }

    #[test]
    fn keyword_score_counts_distinct_token_coverage() {
        assert_eq!(keyword_score("axum http", "used axum for the http layer"), 1.0);
        assert_eq!(keyword_score("axum grpc", "used axum for the http layer"), 0.5);
    }

    #[test]
    fn search_index_respects_token_budget_summary_length() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        let long = "a".repeat(200);
        store.add_memory(session.id, &long, MemoryCategory::Action, Priority::Normal, Map::new()).unwrap();

        let idx = MemoryIndex::new(&store, 0.3, 0.7, 60.0);
        let hits = idx.search_index(session.id, "a", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].summary.chars().count() <= 51);
    }

    #[test]
    fn timeline_reports_adjacent_neighbors() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        let a = store.add_memory(session.id, "first decision", MemoryCategory::Decision, Priority::Normal, Map::new()).unwrap();
        let b = store.add_memory(session.id, "middle action", MemoryCategory::Action, Priority::Normal, Map::new()).unwrap();
        let c = store.add_memory(session.id, "last error", MemoryCategory::Error, Priority::Normal, Map::new()).unwrap();

        let idx = MemoryIndex::new(&store, 0.3, 0.7, 60.0);
        let timeline = idx.get_timeline(session.id, &[b.id]).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].context_before, Some("first decision".to_string()));
        assert_eq!(timeline[0].context_after, Some("last error".to_string()));
        let _ = (a.id, c.id);
    }

    #[test]
    fn curate_protects_decisions_and_errors() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        store.add_memory(session.id, "a decision", MemoryCategory::Decision, Priority::Low, Map::new()).unwrap();
        store.add_memory(session.id, "an error", MemoryCategory::Error, Priority::Low, Map::new()).unwrap();
        store.add_memory(session.id, "low value action", MemoryCategory::Action, Priority::Low, Map::new()).unwrap();

        let idx = MemoryIndex::new(&store, 0.3, 0.7, 60.0);
        let result = idx.curate(session.id, 2).unwrap();
        assert_eq!(result.removed, 1);
        assert_eq!(result.remaining, 2);

        let remaining = store.list_memories(session.id).unwrap();
        assert!(remaining.iter().any(|m| m.category == MemoryCategory::Decision));
        assert!(remaining.iter().any(|m| m.category == MemoryCategory::Error));
    }

    #[test]
    fn curate_prefers_evicting_low_access_low_priority() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        let low = store.add_memory(session.id, "rarely touched", MemoryCategory::Action, Priority::Low, Map::new()).unwrap();
        store.get_memory(low.id).unwrap(); // access_count 0 -> 1, still low
        for _ in 0..5 {
            store.get_memory(low.id).unwrap();
        }
        let high = store
            .add_memory(session.id, "frequently used", MemoryCategory::Action, Priority::High, Map::new())
            .unwrap();
        for _ in 0..20 {
            store.get_memory(high.id).unwrap();
        }

        let idx = MemoryIndex::new(&store, 0.3, 0.7, 60.0);
        let result = idx.curate(session.id, 1).unwrap();
        assert_eq!(result.removed, 1);

        let remaining = store.list_memories(session.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "frequently used");
    }

    #[tokio::test]
    async fn progressive_search_depth_one_uses_search_index_budget() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        store.add_memory(session.id, "axum router setup", MemoryCategory::Action, Priority::Normal, Map::new()).unwrap();

        let idx = MemoryIndex::new(&store, 0.3, 0.7, 60.0);
        let result = idx.progressive_search(session.id, "axum", 1, 10).unwrap();
        assert_eq!(result.layer, "search_index");
        assert_eq!(result.estimated_tokens, result.count * SEARCH_INDEX_TOKEN_BUDGET);
    }
}
