//! Nested, serde-default configuration tree for every contextd component.
//!
//! Follows the teacher's convention of one struct per concern, composed
//! into a top-level `Config`, with free functions providing serde defaults
//! so a partial (or absent) TOML file still produces sane values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub watcher: WatcherConfig,
    pub fold: FoldConfig,
    pub memory: MemoryConfig,
    pub bus: BusConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            watcher: WatcherConfig::default(),
            fold: FoldConfig::default(),
            memory: MemoryConfig::default(),
            bus: BusConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults if the file does not
    /// exist. A file that exists but fails to parse is still an error.
    /// `DATABASE_URL`, if set, overrides `store.db_path` from either source
    /// (spec.md §6's one core-affecting environment variable).
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut cfg = if !path.exists() {
            Config::default()
        } else {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| crate::Error::Validation(format!("config parse: {e}")))?
        };
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.store.db_path = PathBuf::from(url);
        }
        Ok(cfg)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// Sessions archived as JSON alongside the SQLite file on completion.
    pub archive_dir: PathBuf,
    pub vector_dim: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db_path: d_db_path(),
            archive_dir: d_archive_dir(),
            vector_dim: d_vector_dim(),
        }
    }
}

fn d_db_path() -> PathBuf {
    data_dir().join("contextd.sqlite3")
}

fn d_archive_dir() -> PathBuf {
    data_dir().join("archive")
}

fn d_vector_dim() -> usize {
    384
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("contextd")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Watcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Directory name -> dashboard color, checked in order. The original
    /// ordering matters: `.claude-gml` must be checked before the
    /// shorter `.claude` prefix would otherwise match.
    pub sources: Vec<SourceSpec>,
    pub tail_size_bytes: u64,
    pub bytes_per_token: f64,
    pub system_overhead_tokens: u64,
    pub max_context_tokens: u64,
    /// Minimum interval between successive broadcasts for the same
    /// session, in milliseconds.
    pub throttle_ms: u64,
    pub throttle_gc_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            sources: default_sources(),
            tail_size_bytes: 10 * 1024,
            bytes_per_token: 6.0,
            system_overhead_tokens: 2000,
            max_context_tokens: 200_000,
            throttle_ms: 500,
            throttle_gc_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub dir_name: String,
    pub color: String,
}

fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec { dir_name: ".claude".into(), color: "#3B82F6".into() },
        SourceSpec { dir_name: ".claude-glm".into(), color: "#10B981".into() },
        SourceSpec { dir_name: ".claude-gml".into(), color: "#F59E0B".into() },
        SourceSpec { dir_name: ".opencode".into(), color: "#8B5CF6".into() },
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fold
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    /// Path to the CCS config file used for provider auto-detection.
    pub ccs_config_path: PathBuf,
    pub provider_cache_ttl_secs: u64,
    /// task_progress percentage at/above which spawning never triggers.
    pub spawn_progress_ceiling: u8,
    /// context_usage ratio at/above which a spawn triggers regardless
    /// of progress, provided progress is below `spawn_progress_floor`.
    pub spawn_context_threshold: f64,
    pub spawn_progress_floor: u8,
    pub spawn_error_count_threshold: u32,
}

impl Default for FoldConfig {
    fn default() -> Self {
        FoldConfig {
            ccs_config_path: d_ccs_config_path(),
            provider_cache_ttl_secs: 5,
            spawn_progress_ceiling: 90,
            spawn_context_threshold: 0.90,
            spawn_progress_floor: 80,
            spawn_error_count_threshold: 5,
        }
    }
}

fn d_ccs_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ccs")
        .join("config.json")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub search_index_token_budget: usize,
    pub timeline_token_budget: usize,
    pub keyword_weight: f64,
    pub vector_weight: f64,
    pub rrf_k: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            search_index_token_budget: 2_000,
            timeline_token_budget: 8_000,
            keyword_weight: 0.3,
            vector_weight: 0.7,
            rrf_k: 60.0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub subscriber_queue_depth: usize,
    pub keepalive_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig { subscriber_queue_depth: 64, keepalive_secs: 30 }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { bind_addr: "127.0.0.1:8765".into(), cors_permissive: true }
    }
}
