//! Watches every auto-detected transcript source and keeps the `Store`'s
//! session rows (and the dashboard's `EventBus`) in sync with whichever
//! project directory is actively being written to.

mod decode;
mod sources;
mod tokens;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::RwLock;
use uuid::Uuid;
use walkdir::WalkDir;

use contextd_bus::EventBus;
use contextd_domain::{Config, DashboardUpdate, ProjectStatus, Result};
use contextd_store::Store;

pub use sources::Source;

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Attached { source: String, project: String },
    Update { source: String, project: String, tokens: u64, is_real_tokens: bool },
    SessionRotated { source: String, project: String },
    Waiting { source: String },
    Error { message: String },
}

struct Throttle {
    last_sent: HashMap<String, Instant>,
    last_gc: Instant,
    gc_interval: Duration,
    min_interval: Duration,
}

impl Throttle {
    fn new(min_interval: Duration, gc_interval: Duration) -> Self {
        Throttle { last_sent: HashMap::new(), last_gc: Instant::now(), gc_interval, min_interval }
    }

    /// Returns true if enough time has passed since the last accepted
    /// update for `key` to allow another one through.
    fn allow(&mut self, key: &str) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_gc) > self.gc_interval {
            self.last_sent.retain(|_, t| now.duration_since(*t) < self.gc_interval);
            self.last_gc = now;
        }
        match self.last_sent.get(key) {
            Some(last) if now.duration_since(*last) < self.min_interval => false,
            _ => {
                self.last_sent.insert(key.to_string(), now);
                true
            }
        }
    }
}

pub struct WatcherService {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    config: Config,
    bindings: HashMap<(String, String), Uuid>,
    project_state: HashMap<(String, String), ProjectStatus>,
    throttle: Throttle,
    shared: Arc<RwLock<DashboardUpdate>>,
}

impl WatcherService {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, config: Config) -> Self {
        let throttle = Throttle::new(
            Duration::from_millis(config.watcher.throttle_ms),
            Duration::from_secs(config.watcher.throttle_gc_secs),
        );
        WatcherService {
            store,
            bus,
            config,
            bindings: HashMap::new(),
            project_state: HashMap::new(),
            throttle,
            shared: Arc::new(RwLock::new(DashboardUpdate::empty())),
        }
    }

    /// A handle the server crate can hold onto to read the latest
    /// dashboard snapshot (for `/status` and the SSE `init` event)
    /// without needing direct access to the watcher's internal state.
    pub fn shared_status(&self) -> Arc<RwLock<DashboardUpdate>> {
        self.shared.clone()
    }

    /// Walks every discovered source once at startup so the dashboard has
    /// data before the first filesystem event arrives.
    pub fn initial_sync(&mut self) -> Result<()> {
        let sources = sources::discover(&self.config.watcher.sources);
        if sources.is_empty() {
            log_event(&WatchEvent::Waiting { source: "none".into() });
        }
        let total = sources.len();
        for (done, source) in sources.iter().enumerate() {
            contextd_domain::TraceEvent::WatcherSourceDiscovered {
                source_name: source.name.clone(),
                projects_dir: source.projects_dir.display().to_string(),
            }
            .emit();
            self.sync_source(source)?;
            self.bus.broadcast_sync_progress(contextd_domain::SyncProgress {
                sources_total: total,
                sources_done: done + 1,
                current_source: source.name.clone(),
                projects_found: self.project_state.len(),
                done: done + 1 == total,
            });
        }
        if total == 0 {
            self.bus.broadcast_sync_progress(contextd_domain::SyncProgress {
                sources_total: 0,
                sources_done: 0,
                current_source: String::new(),
                projects_found: 0,
                done: true,
            });
        }
        self.broadcast_status();
        Ok(())
    }

    fn sync_source(&mut self, source: &Source) -> Result<()> {
        let project_dirs: Vec<PathBuf> = WalkDir::new(&source.projects_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.path().to_path_buf())
            .collect();

        for project_dir in project_dirs {
            if let Some(active) = active_transcript(&project_dir) {
                self.sync_project(source, &project_dir, &active)?;
            }
        }
        Ok(())
    }

    /// Re-reads the active transcript for one project directory and, if
    /// the token count changed meaningfully, updates the bound session.
    fn sync_project(&mut self, source: &Source, project_dir: &Path, transcript: &Path) -> Result<()> {
        let dir_name = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let project = decode::decode_project_name(&dir_name);
        let key = (source.name.clone(), project.clone());

        let estimate = tokens::extract(
            transcript,
            self.config.watcher.tail_size_bytes,
            self.config.watcher.bytes_per_token,
            self.config.watcher.system_overhead_tokens,
            self.config.watcher.max_context_tokens,
        )?;

        let session_id = match self.bindings.get(&key) {
            Some(id) => *id,
            None => {
                let task_description = format!("Auto-detected: {}:{}", source.name, project);
                let session = self.store.create_session(
                    &task_description,
                    self.config.watcher.max_context_tokens,
                )?;
                self.bindings.insert(key.clone(), session.id);
                log_event(&WatchEvent::Attached { source: source.name.clone(), project: project.clone() });
                session.id
            }
        };

        let session = self.store.get_session(session_id)?;
        let color = sources::color_for(&self.config.watcher.sources, &source.name);
        self.project_state.insert(
            key.clone(),
            ProjectStatus {
                name: ProjectStatus::display_name(&source.name, &project),
                project_path: project.clone(),
                current_tokens: estimate.tokens,
                max_tokens: session.max_tokens,
                context_usage: (estimate.tokens as f64 / session.max_tokens.max(1) as f64).min(1.0),
                pct: (estimate.tokens as f64 / session.max_tokens.max(1) as f64 * 100.0).min(100.0),
                last_updated: chrono::Utc::now().to_rfc3339(),
                is_real_data: estimate.is_real_tokens,
                source: contextd_domain::SourceInfo { name: source.name.clone(), color },
                transcript_path: transcript.display().to_string(),
            },
        );

        // The Store enforces `current_tokens <= max_tokens`; a transcript
        // that has genuinely blown through the window still gets recorded
        // at the ceiling rather than rejected outright.
        let tokens_to_store = estimate.tokens.min(session.max_tokens);
        if session.current_tokens == tokens_to_store {
            return Ok(());
        }

        let throttle_key = format!("{}:{}", source.name, project);
        if !self.throttle.allow(&throttle_key) {
            return Ok(());
        }

        self.store.update_tokens(session_id, tokens_to_store)?;

        contextd_domain::TraceEvent::WatcherTranscriptUpdate {
            source_name: source.name.clone(),
            project_name: project,
            current_tokens: estimate.tokens,
            is_real_tokens: estimate.is_real_tokens,
        }
        .emit();
        self.broadcast_status();
        Ok(())
    }

    fn broadcast_status(&self) {
        let status = self.current_status();
        self.bus.broadcast_status(status.clone());
        *self.shared.write() = status;
    }

    /// Builds the current dashboard snapshot from everything observed so
    /// far, without touching the store. Used both for the bus broadcast
    /// and (via `shared_status`) for late-joining SSE subscribers.
    fn current_status(&self) -> DashboardUpdate {
        let projects: Vec<ProjectStatus> = self.project_state.values().cloned().collect();
        let sources = sources::source_infos(&self.config.watcher.sources);
        DashboardUpdate::from_projects(projects, sources)
    }

    /// Blocking loop: spawns one recursive `notify` watcher per source
    /// root and reacts to filesystem events as they arrive. Intended to
    /// run on its own OS thread — callers from an async context should
    /// use `tokio::task::spawn_blocking`.
    pub fn run_blocking(mut self) -> Result<()> {
        let sources = sources::discover(&self.config.watcher.sources);
        if sources.is_empty() {
            return Ok(());
        }

        let (tx, rx) = std_mpsc::channel::<notify::Result<Event>>();
        let mut _watchers = Vec::new();
        for source in &sources {
            let tx = tx.clone();
            let mut watcher: RecommendedWatcher =
                notify::recommended_watcher(move |res| {
                    let _ = tx.send(res);
                })
                .map_err(|e| contextd_domain::Error::Internal(format!("watcher init: {e}")))?;
            watcher
                .watch(&source.projects_dir, RecursiveMode::Recursive)
                .map_err(|e| contextd_domain::Error::Internal(format!("watch {}: {e}", source.projects_dir.display())))?;
            _watchers.push(watcher);
        }

        let sources_by_root: HashMap<PathBuf, Source> =
            sources.into_iter().map(|s| (s.projects_dir.clone(), s)).collect();

        loop {
            match rx.recv() {
                Ok(Ok(event)) => match event.kind {
                    EventKind::Modify(_) | EventKind::Create(_) => {
                        for path in &event.paths {
                            if let Some((source, project_dir)) = locate(&sources_by_root, path) {
                                if let Some(active) = active_transcript(&project_dir) {
                                    if let Err(e) = self.sync_project(&source, &project_dir, &active) {
                                        contextd_domain::TraceEvent::WatcherTranscriptInactive {
                                            source_name: source.name.clone(),
                                            project_name: project_dir.display().to_string(),
                                        }
                                        .emit();
                                        tracing::warn!(error = %e, "transcript sync failed");
                                    }
                                }
                            }
                        }
                    }
                    EventKind::Remove(_) => {
                        for path in &event.paths {
                            if let Some((source, project_dir)) = locate(&sources_by_root, path) {
                                self.handle_removed_path(&source, &project_dir, path);
                            }
                        }
                    }
                    _ => continue,
                },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "watch error");
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// A path under a watched project directory disappeared. If it was the
    /// transcript currently tracked as that project's active session, the
    /// bound session is marked `inactive` and the project is dropped from
    /// the dashboard snapshot until a new transcript for it appears.
    fn handle_removed_path(&mut self, source: &Source, project_dir: &Path, removed: &Path) {
        let dir_name = project_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let project = decode::decode_project_name(&dir_name);
        let key = (source.name.clone(), project.clone());

        let Some(status) = self.project_state.get(&key) else { return };
        if status.transcript_path != removed.display().to_string() {
            return;
        }

        self.project_state.remove(&key);
        if let Some(session_id) = self.bindings.get(&key).copied() {
            if let Err(e) = self.store.mark_inactive(session_id) {
                tracing::warn!(error = %e, "failed to mark session inactive");
            }
        }
        contextd_domain::TraceEvent::WatcherTranscriptInactive {
            source_name: source.name.clone(),
            project_name: project,
        }
        .emit();
        self.broadcast_status();
    }
}

fn log_event(event: &WatchEvent) {
    match event {
        WatchEvent::Attached { source, project } => {
            tracing::info!(source, project, "transcript source attached");
        }
        WatchEvent::Update { source, project, tokens, is_real_tokens } => {
            tracing::debug!(source, project, tokens, is_real_tokens, "transcript update");
        }
        WatchEvent::SessionRotated { source, project } => {
            tracing::info!(source, project, "transcript file rotated");
        }
        WatchEvent::Waiting { source } => {
            tracing::info!(source, "no sources discovered, waiting");
        }
        WatchEvent::Error { message } => {
            tracing::warn!(message, "watcher error");
        }
    }
}

fn locate(sources_by_root: &HashMap<PathBuf, Source>, path: &Path) -> Option<(Source, PathBuf)> {
    for (root, source) in sources_by_root {
        if let Ok(rel) = path.strip_prefix(root) {
            let project_dir = root.join(rel.components().next()?);
            return Some((source.clone(), project_dir));
        }
    }
    None
}

impl Clone for Source {
    fn clone(&self) -> Self {
        Source { name: self.name.clone(), projects_dir: self.projects_dir.clone(), color: self.color.clone() }
    }
}

/// Among the `.jsonl` transcript files in a project directory, the
/// most-recently-modified one is the active session; siblings are
/// rotated-out history.
fn active_transcript(project_dir: &Path) -> Option<PathBuf> {
    WalkDir::new(project_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|x| x == "jsonl").unwrap_or(false))
        .filter(|e| {
            !e.file_name()
                .to_string_lossy()
                .starts_with("agent-")
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.path().to_path_buf(), modified))
        })
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_blocks_rapid_repeats() {
        let mut t = Throttle::new(Duration::from_millis(500), Duration::from_secs(10));
        assert!(t.allow("a"));
        assert!(!t.allow("a"));
    }

    #[test]
    fn throttle_tracks_keys_independently() {
        let mut t = Throttle::new(Duration::from_millis(500), Duration::from_secs(10));
        assert!(t.allow("a"));
        assert!(t.allow("b"));
    }

    #[test]
    fn active_transcript_picks_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.jsonl");
        let new = dir.path().join("new.jsonl");
        std::fs::write(&old, "{}").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(&new, "{}").unwrap();

        let picked = active_transcript(dir.path()).unwrap();
        assert_eq!(picked, new);
    }

    #[test]
    fn active_transcript_ignores_non_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert!(active_transcript(dir.path()).is_none());
    }

    #[test]
    fn active_transcript_ignores_agent_prefixed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("agent-worker.jsonl"), "{}").unwrap();
        assert!(active_transcript(dir.path()).is_none());
    }
}
