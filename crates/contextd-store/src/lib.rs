//! Embedded SQLite-backed store for sessions, memories, checkpoints and
//! session lineage.
//!
//! Follows a single-writer/multi-reader discipline: all mutating
//! statements go through one connection behind a `Mutex`, matching
//! SQLite's own single-writer model, while reads open their own
//! short-lived connection against the same WAL-mode file and never
//! contend with the writer.

mod migration;
pub mod vector;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use contextd_domain::{
    Checkpoint, Config, Error, Memory, MemoryCategory, Pattern, PatternSource, Priority, Result,
    Session, SessionLineage, SessionStatus,
};

pub struct Store {
    write: Mutex<Connection>,
    path: PathBuf,
    vector_dim: usize,
    archive_dir: PathBuf,
}

impl Store {
    pub fn open(cfg: &Config) -> Result<Self> {
        if let Some(parent) = cfg.store.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&cfg.store.archive_dir)?;

        let conn = Connection::open(&cfg.store.db_path)?;
        migration::run(&conn)?;

        Ok(Store {
            write: Mutex::new(conn),
            path: cfg.store.db_path.clone(),
            vector_dim: cfg.store.vector_dim,
            archive_dir: cfg.store.archive_dir.clone(),
        })
    }

    /// In-memory database, for tests. Never persisted, no archive dir.
    pub fn open_in_memory(vector_dim: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migration::run(&conn)?;
        Ok(Store {
            write: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
            vector_dim,
            archive_dir: PathBuf::from("."),
        })
    }

    fn read_conn(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Routes read-only queries through a dedicated read connection when
    /// the store is backed by a file (so reads never queue behind the
    /// writer's mutex); an in-memory store has no independent connection
    /// to open, so it falls back to the shared one.
    fn with_read<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        if self.path == Path::new(":memory:") {
            return f(&self.write.lock()).map_err(Error::from);
        }
        f(&self.read_conn()?).map_err(Error::from)
    }

    /// Vector search is only meaningful once at least one embedding has
    /// been written; callers that want a static capability flag should
    /// check `vector_dim > 0` via config instead.
    pub fn vector_capable(&self) -> bool {
        self.vector_dim > 0
    }

    // ────────────────────────────── sessions ──────────────────────────────

    pub fn create_session(&self, task_description: &str, max_tokens: u64) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            task_description: task_description.to_string(),
            max_tokens,
            current_tokens: 0,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let conn = self.write.lock();
        conn.execute(
            "INSERT INTO sessions (id, task_description, max_tokens, current_tokens, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id.to_string(),
                session.task_description,
                session.max_tokens as i64,
                session.current_tokens as i64,
                session.status.as_str(),
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )?;
        contextd_domain::TraceEvent::SessionCreated {
            session_id: session.id.to_string(),
            task_description: session.task_description.clone(),
            auto_detected: false,
        }
        .emit();
        Ok(session)
    }

    pub fn get_session(&self, id: Uuid) -> Result<Session> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, task_description, max_tokens, current_tokens, status, created_at, updated_at
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                row_to_session,
            )
            .optional()
        })?
        .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Rejects the update once the session has reached a terminal state, or
    /// if `current_tokens` would exceed `max_tokens` (the store's
    /// `current_tokens ≤ max_tokens` invariant holds after every call).
    pub fn update_tokens(&self, id: Uuid, current_tokens: u64) -> Result<Session> {
        let mut session = self.get_session(id)?;
        if session.status.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "session {id} is {}, cannot update tokens",
                session.status.as_str()
            )));
        }
        if current_tokens > session.max_tokens {
            return Err(Error::Validation(format!(
                "tokens {current_tokens} exceed max_tokens {} for session {id}",
                session.max_tokens
            )));
        }
        session.current_tokens = current_tokens;
        session.updated_at = Utc::now();

        let conn = self.write.lock();
        conn.execute(
            "UPDATE sessions SET current_tokens = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                session.current_tokens as i64,
                session.updated_at.to_rfc3339(),
                id.to_string(),
            ],
        )?;
        drop(conn);

        contextd_domain::TraceEvent::SessionTokensUpdated {
            session_id: id.to_string(),
            current_tokens,
            context_usage: session.context_usage(),
        }
        .emit();
        Ok(session)
    }

    /// Marks a session `inactive`: its bound transcript was deleted and is
    /// no longer the active one for its project. Unlike `complete`/
    /// `terminate`, this is not a terminal state — a later transcript event
    /// for the same (source, project) key can still update tokens on it.
    /// A no-op, not an error, once the session is already terminal.
    pub fn mark_inactive(&self, id: Uuid) -> Result<Session> {
        let mut session = self.get_session(id)?;
        if session.status.is_terminal() {
            return Ok(session);
        }
        let from = session.status;
        session.status = SessionStatus::Inactive;
        session.updated_at = Utc::now();

        let conn = self.write.lock();
        conn.execute(
            "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![SessionStatus::Inactive.as_str(), session.updated_at.to_rfc3339(), id.to_string()],
        )?;
        drop(conn);

        contextd_domain::TraceEvent::SessionTransition {
            session_id: id.to_string(),
            from: from.as_str().to_string(),
            to: SessionStatus::Inactive.as_str().to_string(),
        }
        .emit();
        Ok(session)
    }

    pub fn complete_session(&self, id: Uuid) -> Result<Session> {
        self.transition_terminal(id, SessionStatus::Completed)
    }

    pub fn terminate_session(&self, id: Uuid) -> Result<Session> {
        self.transition_terminal(id, SessionStatus::Terminated)
    }

    fn transition_terminal(&self, id: Uuid, to: SessionStatus) -> Result<Session> {
        let mut session = self.get_session(id)?;
        if session.status.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "session {id} already {}",
                session.status.as_str()
            )));
        }
        let from = session.status;
        session.status = to;
        session.updated_at = Utc::now();

        let conn = self.write.lock();
        conn.execute(
            "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![to.as_str(), session.updated_at.to_rfc3339(), id.to_string()],
        )?;
        drop(conn);

        self.archive_session(&session)?;

        contextd_domain::TraceEvent::SessionTransition {
            session_id: id.to_string(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
        .emit();
        Ok(session)
    }

    fn archive_session(&self, session: &Session) -> Result<()> {
        if self.path == Path::new(":memory:") {
            return Ok(());
        }
        let id8 = &session.id.to_string()[..8];
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.archive_dir.join(format!("session_{id8}_{stamp}.json"));
        let json = serde_json::to_vec_pretty(session)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn list_active(&self) -> Result<Vec<Session>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_description, max_tokens, current_tokens, status, created_at, updated_at
                 FROM sessions WHERE status = 'active' ORDER BY created_at DESC",
            )?;
            stmt.query_map([], row_to_session)?.collect()
        })
    }

    // ────────────────────────────── memories ───────────────────────────────

    pub fn add_memory(
        &self,
        session_id: Uuid,
        content: &str,
        category: MemoryCategory,
        priority: Priority,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Memory> {
        let memory = Memory {
            id: Uuid::new_v4(),
            session_id,
            content: content.to_string(),
            category,
            priority,
            embedding: None,
            metadata,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        };
        let conn = self.write.lock();
        conn.execute(
            "INSERT INTO memories (id, session_id, content, category, priority, embedding, metadata, access_count, last_accessed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, 0, NULL, ?7)",
            params![
                memory.id.to_string(),
                session_id.to_string(),
                memory.content,
                category.as_str(),
                priority.as_str(),
                serde_json::to_string(&memory.metadata)?,
                memory.created_at.to_rfc3339(),
            ],
        )?;
        drop(conn);

        contextd_domain::TraceEvent::MemoryAdded {
            session_id: session_id.to_string(),
            memory_id: memory.id.to_string(),
            category: category.as_str().to_string(),
        }
        .emit();
        Ok(memory)
    }

    pub fn set_embedding(&self, memory_id: Uuid, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.vector_dim {
            return Err(Error::Validation(format!(
                "embedding has dimension {} but store expects {}",
                embedding.len(),
                self.vector_dim
            )));
        }
        let conn = self.write.lock();
        conn.execute(
            "UPDATE memories SET embedding = ?1 WHERE id = ?2",
            params![vector::encode(embedding), memory_id.to_string()],
        )?;
        Ok(())
    }

    pub fn get_memory(&self, id: Uuid) -> Result<Memory> {
        let conn = self.write.lock();
        let memory = conn
            .query_row(
                "SELECT id, session_id, content, category, priority, embedding, metadata, access_count, last_accessed_at, created_at
                 FROM memories WHERE id = ?1",
                params![id.to_string()],
                row_to_memory,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("memory {id}")))?;

        conn.execute(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(memory)
    }

    /// Full-text search over memory content scoped to `session_id`, most
    /// relevant first per SQLite's built-in FTS5 `bm25()` ranking.
    pub fn search_memories_fts(
        &self,
        session_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.session_id, m.content, m.category, m.priority, m.embedding, m.metadata, m.access_count, m.last_accessed_at, m.created_at
                 FROM memories_fts f
                 JOIN memories m ON m.rowid = f.rowid
                 WHERE f.content MATCH ?1 AND m.session_id = ?2
                 ORDER BY bm25(f)
                 LIMIT ?3",
            )?;
            stmt.query_map(params![query, session_id.to_string(), limit as i64], row_to_memory)?
                .collect()
        })
    }

    /// Same as [`Store::search_memories_fts`] but unscoped by session, for
    /// the `/search` endpoint's cross-session mode (`session_id` omitted).
    pub fn search_memories_fts_global(&self, query: &str, limit: usize) -> Result<Vec<Memory>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.session_id, m.content, m.category, m.priority, m.embedding, m.metadata, m.access_count, m.last_accessed_at, m.created_at
                 FROM memories_fts f
                 JOIN memories m ON m.rowid = f.rowid
                 WHERE f.content MATCH ?1
                 ORDER BY bm25(f)
                 LIMIT ?2",
            )?;
            stmt.query_map(params![query, limit as i64], row_to_memory)?.collect()
        })
    }

    /// All memories for a session carrying an embedding, for vector-side
    /// ranking by the caller (`contextd-memory`'s hybrid search).
    pub fn memories_with_embeddings(&self, session_id: Uuid) -> Result<Vec<Memory>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, content, category, priority, embedding, metadata, access_count, last_accessed_at, created_at
                 FROM memories WHERE session_id = ?1 AND embedding IS NOT NULL",
            )?;
            stmt.query_map(params![session_id.to_string()], row_to_memory)?.collect()
        })
    }

    pub fn list_memories(&self, session_id: Uuid) -> Result<Vec<Memory>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, content, category, priority, embedding, metadata, access_count, last_accessed_at, created_at
                 FROM memories WHERE session_id = ?1 ORDER BY created_at DESC",
            )?;
            stmt.query_map(params![session_id.to_string()], row_to_memory)?.collect()
        })
    }

    pub fn delete_memory(&self, id: Uuid) -> Result<()> {
        let conn = self.write.lock();
        let changed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    // ──────────────────────────── checkpoints ──────────────────────────────

    pub fn create_checkpoint(
        &self,
        session_id: Uuid,
        label: &str,
        state: serde_json::Value,
        context_usage: f64,
        memories_snapshot: Vec<Uuid>,
    ) -> Result<Checkpoint> {
        self.create_checkpoint_with_metadata(session_id, label, state, context_usage, memories_snapshot, HashMap::new())
    }

    /// Same as [`Store::create_checkpoint`] but lets the caller attach
    /// arbitrary metadata (e.g. the HTTP `CreateCheckpoint` operation's
    /// optional `metadata` field), kept separate from `state` so a
    /// restore's state view always equals the session fields at creation
    /// time.
    pub fn create_checkpoint_with_metadata(
        &self,
        session_id: Uuid,
        label: &str,
        state: serde_json::Value,
        context_usage: f64,
        memories_snapshot: Vec<Uuid>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            session_id,
            label: label.to_string(),
            state,
            context_usage,
            memories_snapshot,
            metadata,
            created_at: Utc::now(),
        };
        let conn = self.write.lock();
        conn.execute(
            "INSERT INTO checkpoints (id, session_id, label, state, context_usage, memories_snapshot, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                checkpoint.id.to_string(),
                session_id.to_string(),
                checkpoint.label,
                serde_json::to_string(&checkpoint.state)?,
                checkpoint.context_usage,
                serde_json::to_string(&checkpoint.memories_snapshot)?,
                serde_json::to_string(&checkpoint.metadata)?,
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        drop(conn);

        contextd_domain::TraceEvent::CheckpointCreated {
            session_id: session_id.to_string(),
            checkpoint_id: checkpoint.id.to_string(),
            context_usage,
            memory_count: checkpoint.memories_snapshot.len(),
        }
        .emit();
        Ok(checkpoint)
    }

    pub fn get_checkpoint(&self, id: Uuid) -> Result<Checkpoint> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, session_id, label, state, context_usage, memories_snapshot, metadata, created_at
                 FROM checkpoints WHERE id = ?1",
                params![id.to_string()],
                row_to_checkpoint,
            )
            .optional()
        })?
        .ok_or_else(|| Error::NotFound(format!("checkpoint {id}")))
    }

    pub fn list_checkpoints(&self, session_id: Uuid) -> Result<Vec<Checkpoint>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, label, state, context_usage, memories_snapshot, metadata, created_at
                 FROM checkpoints WHERE session_id = ?1 ORDER BY created_at DESC",
            )?;
            stmt.query_map(params![session_id.to_string()], row_to_checkpoint)?.collect()
        })
    }

    // ──────────────────────────── lineage ──────────────────────────────────

    pub fn create_lineage(
        &self,
        parent_session_id: Option<Uuid>,
        child_session_id: Uuid,
        handoff_reason: &str,
        handoff_prompt: &str,
        checkpoint_id: Option<Uuid>,
    ) -> Result<SessionLineage> {
        let lineage = SessionLineage {
            id: Uuid::new_v4(),
            parent_session_id,
            child_session_id,
            handoff_reason: handoff_reason.to_string(),
            handoff_prompt: handoff_prompt.to_string(),
            checkpoint_id,
            created_at: Utc::now(),
        };
        let conn = self.write.lock();
        conn.execute(
            "INSERT INTO session_lineage (id, parent_session_id, child_session_id, handoff_reason, handoff_prompt, checkpoint_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                lineage.id.to_string(),
                lineage.parent_session_id.map(|u| u.to_string()),
                lineage.child_session_id.to_string(),
                lineage.handoff_reason,
                lineage.handoff_prompt,
                lineage.checkpoint_id.map(|u| u.to_string()),
                lineage.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::StoreConflict(format!("session {child_session_id} already has a lineage row"))
            } else {
                Error::from(e)
            }
        })?;
        drop(conn);

        if let Some(parent) = parent_session_id {
            contextd_domain::TraceEvent::LineageCreated {
                parent_session_id: parent.to_string(),
                child_session_id: child_session_id.to_string(),
                reason: lineage.handoff_reason.clone(),
            }
            .emit();
        }
        Ok(lineage)
    }

    pub fn get_lineage_for_child(&self, child_session_id: Uuid) -> Result<Option<SessionLineage>> {
        self.with_read(|conn| {
            conn.query_row(
                "SELECT id, parent_session_id, child_session_id, handoff_reason, handoff_prompt, checkpoint_id, created_at
                 FROM session_lineage WHERE child_session_id = ?1",
                params![child_session_id.to_string()],
                row_to_lineage,
            )
            .optional()
        })
    }

    pub fn list_lineage_for_parent(&self, parent_session_id: Uuid) -> Result<Vec<SessionLineage>> {
        self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, parent_session_id, child_session_id, handoff_reason, handoff_prompt, checkpoint_id, created_at
                 FROM session_lineage WHERE parent_session_id = ?1 ORDER BY created_at ASC",
            )?;
            stmt.query_map(params![parent_session_id.to_string()], row_to_lineage)?.collect()
        })
    }

    /// Walks the parent chain from `session_id` up to the root ancestor,
    /// then returns it root-first, the given session last. A session with
    /// no lineage row returns a single-element list containing itself.
    pub fn get_lineage(&self, session_id: Uuid) -> Result<Vec<Session>> {
        let mut chain = vec![self.get_session(session_id)?];
        let mut current = session_id;
        loop {
            let Some(lineage) = self.get_lineage_for_child(current)? else { break };
            let Some(parent_id) = lineage.parent_session_id else { break };
            chain.push(self.get_session(parent_id)?);
            current = parent_id;
        }
        chain.reverse();
        Ok(chain)
    }

    // ──────────────────────────── patterns ─────────────────────────────────

    pub fn add_pattern(&self, pattern: &Pattern) -> Result<()> {
        let conn = self.write.lock();
        conn.execute(
            "INSERT INTO patterns (id, session_id, pattern_name, pattern_description, code_example, tags, source_mode, source_files, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                pattern.id.to_string(),
                pattern.session_id.to_string(),
                pattern.pattern_name,
                pattern.pattern_description,
                pattern.code_example,
                serde_json::to_string(&pattern.tags)?,
                source_mode_str(pattern.source_mode),
                serde_json::to_string(&pattern.source_files)?,
                pattern.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ──────────────────────────── metrics ──────────────────────────────────

    pub fn metrics_snapshot(&self) -> Result<contextd_domain::MetricsSnapshot> {
        let (active_sessions, total_memories, total_checkpoints, avg_usage) =
            self.with_read(|conn| {
                let active_sessions: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sessions WHERE status = 'active'",
                    [],
                    |r| r.get(0),
                )?;
                let total_memories: i64 =
                    conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
                let total_checkpoints: i64 =
                    conn.query_row("SELECT COUNT(*) FROM checkpoints", [], |r| r.get(0))?;
                let avg_usage: Option<f64> = conn
                    .query_row(
                        "SELECT AVG(CAST(current_tokens AS REAL) / NULLIF(max_tokens, 0)) FROM sessions WHERE status = 'active'",
                        [],
                        |r| r.get(0),
                    )
                    .optional()?
                    .flatten();
                Ok((active_sessions, total_memories, total_checkpoints, avg_usage))
            })?;

        Ok(contextd_domain::MetricsSnapshot {
            active_sessions: active_sessions as u64,
            total_memories: total_memories as u64,
            total_checkpoints: total_checkpoints as u64,
            avg_context_usage: avg_usage.unwrap_or(0.0),
            recorded_at: Utc::now(),
        })
    }
}

fn source_mode_str(m: PatternSource) -> &'static str {
    match m {
        PatternSource::Manual => "manual",
        PatternSource::Llm => "llm",
        PatternSource::Generic => "generic",
    }
}

fn parse_dt(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status_raw: String = row.get(4)?;
    Ok(Session {
        id: parse_uuid(row, 0)?,
        task_description: row.get(1)?,
        max_tokens: row.get::<_, i64>(2)? as u64,
        current_tokens: row.get::<_, i64>(3)? as u64,
        status: SessionStatus::parse(&status_raw).unwrap_or(SessionStatus::Inactive),
        created_at: parse_dt(&row.get::<_, String>(5)?)?,
        updated_at: parse_dt(&row.get::<_, String>(6)?)?,
    })
}

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let category_raw: String = row.get(3)?;
    let priority_raw: String = row.get(4)?;
    let embedding_bytes: Option<Vec<u8>> = row.get(5)?;
    let metadata_raw: String = row.get(6)?;
    let last_accessed_raw: Option<String> = row.get(8)?;

    Ok(Memory {
        id: parse_uuid(row, 0)?,
        session_id: parse_uuid(row, 1)?,
        content: row.get(2)?,
        category: MemoryCategory::parse(&category_raw).unwrap_or(MemoryCategory::Other),
        priority: Priority::parse(&priority_raw).unwrap_or(Priority::Normal),
        embedding: embedding_bytes.map(|b| vector::decode(&b)),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or_default(),
        access_count: row.get::<_, i64>(7)? as u64,
        last_accessed_at: last_accessed_raw.map(|s| parse_dt(&s)).transpose()?,
        created_at: parse_dt(&row.get::<_, String>(9)?)?,
    })
}

fn row_to_checkpoint(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    let state_raw: String = row.get(3)?;
    let snapshot_raw: String = row.get(5)?;
    let metadata_raw: String = row.get(6)?;
    Ok(Checkpoint {
        id: parse_uuid(row, 0)?,
        session_id: parse_uuid(row, 1)?,
        label: row.get(2)?,
        state: serde_json::from_str(&state_raw).unwrap_or(serde_json::Value::Null),
        context_usage: row.get(4)?,
        memories_snapshot: serde_json::from_str(&snapshot_raw).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or_default(),
        created_at: parse_dt(&row.get::<_, String>(7)?)?,
    })
}

fn row_to_lineage(row: &Row<'_>) -> rusqlite::Result<SessionLineage> {
    let parent_raw: Option<String> = row.get(1)?;
    let checkpoint_raw: Option<String> = row.get(5)?;
    Ok(SessionLineage {
        id: parse_uuid(row, 0)?,
        parent_session_id: parent_raw.map(|s| s.parse()).transpose().map_err(uuid_err)?,
        child_session_id: parse_uuid(row, 2)?,
        handoff_reason: row.get(3)?,
        handoff_prompt: row.get(4)?,
        checkpoint_id: checkpoint_raw.map(|s| s.parse()).transpose().map_err(uuid_err)?,
        created_at: parse_dt(&row.get::<_, String>(6)?)?,
    })
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(uuid_err)
}

fn uuid_err(e: uuid::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

/// True for SQLite's `SQLITE_CONSTRAINT_UNIQUE`/`SQLITE_CONSTRAINT_PRIMARYKEY`,
/// the cases the Store surfaces as `Error::StoreConflict` rather than a bare
/// `Error::Sqlite`.
fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ErrorCode::ConstraintViolation, .. },
            _,
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_domain::Config;

    fn test_store() -> (Store, tempfile::TempDir) {
        let mut cfg = Config::default();
        let dir = tempfile::tempdir().unwrap();
        cfg.store.db_path = dir.path().join("test.sqlite3");
        cfg.store.archive_dir = dir.path().join("archive");
        (Store::open(&cfg).unwrap(), dir)
    }

    #[test]
    fn create_and_fetch_session() {
        let (store, _dir) = test_store();
        let session = store.create_session("write a parser", 200_000).unwrap();
        let fetched = store.get_session(session.id).unwrap();
        assert_eq!(fetched.task_description, "write a parser");
        assert_eq!(fetched.status, SessionStatus::Active);
    }

    #[test]
    fn update_tokens_rejected_after_completion() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        store.complete_session(session.id).unwrap();
        assert!(store.update_tokens(session.id, 5000).is_err());
    }

    #[test]
    fn update_tokens_rejects_values_over_max() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        let err = store.update_tokens(session.id, 100_001).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let unchanged = store.get_session(session.id).unwrap();
        assert_eq!(unchanged.current_tokens, 0);
    }

    #[test]
    fn update_tokens_accepts_value_equal_to_max() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        let updated = store.update_tokens(session.id, 100_000).unwrap();
        assert_eq!(updated.current_tokens, 100_000);
    }

    #[test]
    fn double_completion_is_invalid_transition() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        store.complete_session(session.id).unwrap();
        assert!(store.complete_session(session.id).is_err());
    }

    #[test]
    fn memory_fts_search_finds_substring_matches() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        store
            .add_memory(
                session.id,
                "decided to use axum for the http layer",
                MemoryCategory::Decision,
                Priority::High,
                HashMap::new(),
            )
            .unwrap();
        store
            .add_memory(
                session.id,
                "fixed a flaky test in the scheduler",
                MemoryCategory::Action,
                Priority::Normal,
                HashMap::new(),
            )
            .unwrap();

        let hits = store.search_memories_fts(session.id, "axum", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("axum"));
    }

    #[test]
    fn checkpoint_round_trips() {
        let (store, _dir) = test_store();
        let session = store.create_session("t", 100_000).unwrap();
        let cp = store
            .create_checkpoint(session.id, "before fold", serde_json::json!({"k": 1}), 0.7, vec![])
            .unwrap();
        let fetched = store.get_checkpoint(cp.id).unwrap();
        assert_eq!(fetched.label, "before fold");
        assert_eq!(fetched.context_usage, 0.7);
    }

    #[test]
    fn lineage_links_parent_and_child() {
        let (store, _dir) = test_store();
        let parent = store.create_session("parent", 100_000).unwrap();
        let child = store.create_session("child", 100_000).unwrap();
        store
            .create_lineage(Some(parent.id), child.id, "context_critical", "continue...", None)
            .unwrap();

        let found = store.get_lineage_for_child(child.id).unwrap().unwrap();
        assert_eq!(found.parent_session_id, Some(parent.id));
        assert_eq!(found.handoff_reason, "context_critical");
    }

    #[test]
    fn second_lineage_for_same_child_is_a_store_conflict() {
        let (store, _dir) = test_store();
        let parent_a = store.create_session("parent a", 100_000).unwrap();
        let parent_b = store.create_session("parent b", 100_000).unwrap();
        let child = store.create_session("child", 100_000).unwrap();
        store.create_lineage(Some(parent_a.id), child.id, "r1", "p1", None).unwrap();

        let err = store.create_lineage(Some(parent_b.id), child.id, "r2", "p2", None).unwrap_err();
        assert!(matches!(err, Error::StoreConflict(_)));
    }
}
