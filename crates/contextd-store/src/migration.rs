//! Schema creation and additive migrations.
//!
//! Every statement uses `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT
//! EXISTS` so opening an existing database is idempotent; there is no
//! down-migration path, matching the append-only nature of the rest of the
//! store. After the base schema is in place, `add_missing_columns` scans
//! each table with `PRAGMA table_info` and issues `ALTER TABLE ... ADD
//! COLUMN` for any column the current schema defines that an older
//! on-disk database predates — columns are only ever added, never
//! dropped or renamed.

use rusqlite::Connection;

use contextd_domain::Result;

/// `(table, column, "ADD COLUMN" clause tail)` for every column the
/// current schema expects. Kept in sync with the `CREATE TABLE` bodies
/// below; a column already present from a fresh `CREATE TABLE` is simply
/// skipped by the `PRAGMA table_info` scan.
const EXPECTED_COLUMNS: &[(&str, &str, &str)] = &[
    ("sessions", "id", "TEXT PRIMARY KEY"),
    ("sessions", "task_description", "TEXT NOT NULL DEFAULT ''"),
    ("sessions", "max_tokens", "INTEGER NOT NULL DEFAULT 0"),
    ("sessions", "current_tokens", "INTEGER NOT NULL DEFAULT 0"),
    ("sessions", "status", "TEXT NOT NULL DEFAULT 'active'"),
    ("sessions", "created_at", "TEXT NOT NULL DEFAULT ''"),
    ("sessions", "updated_at", "TEXT NOT NULL DEFAULT ''"),
    ("memories", "id", "TEXT PRIMARY KEY"),
    ("memories", "session_id", "TEXT NOT NULL DEFAULT ''"),
    ("memories", "content", "TEXT NOT NULL DEFAULT ''"),
    ("memories", "category", "TEXT NOT NULL DEFAULT ''"),
    ("memories", "priority", "TEXT NOT NULL DEFAULT ''"),
    ("memories", "embedding", "BLOB"),
    ("memories", "metadata", "TEXT NOT NULL DEFAULT '{}'"),
    ("memories", "access_count", "INTEGER NOT NULL DEFAULT 0"),
    ("memories", "last_accessed_at", "TEXT"),
    ("memories", "created_at", "TEXT NOT NULL DEFAULT ''"),
    ("checkpoints", "id", "TEXT PRIMARY KEY"),
    ("checkpoints", "session_id", "TEXT NOT NULL DEFAULT ''"),
    ("checkpoints", "label", "TEXT NOT NULL DEFAULT ''"),
    ("checkpoints", "state", "TEXT NOT NULL DEFAULT ''"),
    ("checkpoints", "context_usage", "REAL NOT NULL DEFAULT 0"),
    ("checkpoints", "memories_snapshot", "TEXT NOT NULL DEFAULT '[]'"),
    ("checkpoints", "metadata", "TEXT NOT NULL DEFAULT '{}'"),
    ("checkpoints", "created_at", "TEXT NOT NULL DEFAULT ''"),
    ("session_lineage", "id", "TEXT PRIMARY KEY"),
    ("session_lineage", "parent_session_id", "TEXT"),
    ("session_lineage", "child_session_id", "TEXT NOT NULL DEFAULT ''"),
    ("session_lineage", "handoff_reason", "TEXT NOT NULL DEFAULT ''"),
    ("session_lineage", "handoff_prompt", "TEXT NOT NULL DEFAULT ''"),
    ("session_lineage", "checkpoint_id", "TEXT"),
    ("session_lineage", "created_at", "TEXT NOT NULL DEFAULT ''"),
    ("patterns", "id", "TEXT PRIMARY KEY"),
    ("patterns", "session_id", "TEXT NOT NULL DEFAULT ''"),
    ("patterns", "pattern_name", "TEXT NOT NULL DEFAULT ''"),
    ("patterns", "pattern_description", "TEXT NOT NULL DEFAULT ''"),
    ("patterns", "code_example", "TEXT NOT NULL DEFAULT ''"),
    ("patterns", "tags", "TEXT NOT NULL DEFAULT '[]'"),
    ("patterns", "source_mode", "TEXT NOT NULL DEFAULT ''"),
    ("patterns", "source_files", "TEXT NOT NULL DEFAULT '[]'"),
    ("patterns", "created_at", "TEXT NOT NULL DEFAULT ''"),
    ("llm_configs", "provider", "TEXT PRIMARY KEY"),
    ("llm_configs", "encrypted_api_key", "TEXT NOT NULL DEFAULT ''"),
    ("llm_configs", "is_active", "INTEGER NOT NULL DEFAULT 0"),
    ("llm_configs", "created_at", "TEXT NOT NULL DEFAULT ''"),
    ("llm_configs", "updated_at", "TEXT NOT NULL DEFAULT ''"),
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            task_description TEXT NOT NULL,
            max_tokens      INTEGER NOT NULL,
            current_tokens  INTEGER NOT NULL,
            status          TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

        CREATE TABLE IF NOT EXISTS memories (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            content         TEXT NOT NULL,
            category        TEXT NOT NULL,
            priority        TEXT NOT NULL,
            embedding       BLOB,
            metadata        TEXT NOT NULL DEFAULT '{}',
            access_count    INTEGER NOT NULL DEFAULT 0,
            last_accessed_at TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);
        CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);

        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            content,
            content='memories',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
        END;
        CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
        END;
        CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
            INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
        END;

        CREATE TABLE IF NOT EXISTS checkpoints (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            label           TEXT NOT NULL,
            state           TEXT NOT NULL,
            context_usage   REAL NOT NULL,
            memories_snapshot TEXT NOT NULL DEFAULT '[]',
            metadata        TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id);

        CREATE TABLE IF NOT EXISTS session_lineage (
            id                  TEXT PRIMARY KEY,
            parent_session_id   TEXT REFERENCES sessions(id) ON DELETE SET NULL,
            child_session_id    TEXT NOT NULL UNIQUE REFERENCES sessions(id) ON DELETE CASCADE,
            handoff_reason      TEXT NOT NULL,
            handoff_prompt      TEXT NOT NULL,
            checkpoint_id       TEXT REFERENCES checkpoints(id) ON DELETE SET NULL,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_lineage_parent ON session_lineage(parent_session_id);
        CREATE INDEX IF NOT EXISTS idx_lineage_child ON session_lineage(child_session_id);

        CREATE TABLE IF NOT EXISTS patterns (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES sessions(id),
            pattern_name    TEXT NOT NULL,
            pattern_description TEXT NOT NULL,
            code_example    TEXT NOT NULL,
            tags            TEXT NOT NULL DEFAULT '[]',
            source_mode     TEXT NOT NULL,
            source_files    TEXT NOT NULL DEFAULT '[]',
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS llm_configs (
            provider            TEXT PRIMARY KEY,
            encrypted_api_key   TEXT NOT NULL,
            is_active           INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        ",
    )?;
    add_missing_columns(conn)?;
    Ok(())
}

/// A fresh database gets every column from the `CREATE TABLE` statements
/// above and this is a no-op. A database opened from an older build of
/// the schema is missing whatever columns were added since, and this
/// adds them with a default so existing rows stay valid. Primary-key
/// columns can never be missing from a table that exists, so they're
/// skipped — SQLite rejects `ALTER TABLE ADD COLUMN PRIMARY KEY`.
fn add_missing_columns(conn: &Connection) -> Result<()> {
    for (table, column, ddl) in EXPECTED_COLUMNS {
        if ddl.contains("PRIMARY KEY") {
            continue;
        }
        if !has_column(conn, table, column)? {
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {ddl};"))?;
        }
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
