//! Three-layer progressive disclosure and hybrid search over memories.

pub mod index;

pub use index::{
    CurationResult, Embedder, EmbeddingProgress, FullEntry, MemoryIndex, ProgressiveSearchResult,
    SearchIndexEntry, TimelineEntry, FULL_TOKEN_BUDGET, SEARCH_INDEX_TOKEN_BUDGET,
    TIMELINE_TOKEN_BUDGET,
};
