use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE notebooks (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    title       TEXT NOT NULL,
    body        TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE proposed_changes (
    id              TEXT PRIMARY KEY,
    notebook_id     TEXT NOT NULL REFERENCES notebooks(id) ON DELETE CASCADE,
    proposer_id     TEXT NOT NULL,
    proposer_agent  TEXT NULL,
    line_number     INTEGER NOT NULL CHECK (line_number >= 0),
    original_text   TEXT NOT NULL,
    proposed_text   TEXT NOT NULL,
    reason          TEXT NULL,
    status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'rejected', 'completed')),
    created_at      TEXT NOT NULL,
    reviewed_at     TEXT NULL
);

CREATE INDEX proposed_changes_pending_idx
    ON proposed_changes (notebook_id, status, line_number);

CREATE TABLE collaborators (
    id          TEXT PRIMARY KEY,
    notebook_id TEXT NOT NULL REFERENCES notebooks(id) ON DELETE CASCADE,
    user_id     TEXT NULL,
    email       TEXT NULL,
    kind        TEXT NOT NULL CHECK (kind IN ('human', 'agent')),
    role        TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('pending', 'active', 'removed')),
    agent_name  TEXT NULL,
    agent_type  TEXT NULL,
    created_at  TEXT NOT NULL
);

CREATE UNIQUE INDEX collaborators_human_email_idx
    ON collaborators (notebook_id, email)
    WHERE kind = 'human' AND status IN ('pending', 'active');

CREATE UNIQUE INDEX collaborators_agent_name_idx
    ON collaborators (notebook_id, agent_name)
    WHERE kind = 'agent' AND status = 'active';

CREATE UNIQUE INDEX collaborators_owner_idx
    ON collaborators (notebook_id)
    WHERE role = 'owner';

CREATE TABLE activity_entries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    notebook_id TEXT NOT NULL REFERENCES notebooks(id) ON DELETE CASCADE,
    content     TEXT NOT NULL,
    author_kind TEXT NOT NULL CHECK (author_kind IN ('human', 'agent', 'system')),
    author_name TEXT NULL,
    role        TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    created_at  TEXT NOT NULL
);

CREATE INDEX activity_entries_notebook_idx
    ON activity_entries (notebook_id, id);

CREATE TABLE notifications (
    id              TEXT PRIMARY KEY,
    recipient_id    TEXT NOT NULL,
    kind            TEXT NOT NULL,
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    link            TEXT NULL,
    read            INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE INDEX notifications_recipient_idx
    ON notifications (recipient_id, created_at DESC);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

/// The server's durable store: a single SQLite connection guarded by a
/// mutex. Every mutating operation runs as one transaction against this
/// connection, which serializes same-notebook review/publish races.
#[derive(Debug)]
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open database at `{}`", path.display()))?;

        configure_connection(&conn)?;
        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database for tests and stub deployments.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        configure_connection(&conn)?;
        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Acquire the connection. Store calls are synchronous; the guard must
    /// not be held across an await point.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.lock())
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        ",
    )
    .context("failed to configure sqlite pragmas")
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply database migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::Db;

    const EXPECTED_TABLES: &[&str] = &[
        "schema_migrations",
        "notebooks",
        "proposed_changes",
        "collaborators",
        "activity_entries",
        "notifications",
    ];

    #[test]
    fn open_creates_schema_and_records_latest_migration() {
        let db_path = unique_temp_db_path("db-schema");
        let db = Db::open(&db_path).expect("database should open");

        {
            let conn = db.lock();
            for table in EXPECTED_TABLES {
                let exists: i64 = conn
                    .query_row(
                        "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                        [table],
                        |row| row.get(0),
                    )
                    .expect("table existence query should succeed");

                assert_eq!(exists, 1, "expected `{table}` table to exist");
            }
        }

        assert_eq!(db.schema_version().expect("schema version should be readable"), 1);

        drop(db);
        cleanup_sqlite_files(&db_path);
    }

    #[test]
    fn opening_twice_is_idempotent() {
        let db_path = unique_temp_db_path("db-idempotent");
        {
            let first = Db::open(&db_path).expect("first open should succeed");
            assert_eq!(first.schema_version().expect("schema version should be readable"), 1);
        }

        let second = Db::open(&db_path).expect("second open should succeed");
        let migration_rows: i64 = second
            .lock()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("schema migration count query should succeed");
        assert_eq!(migration_rows, 1);

        drop(second);
        cleanup_sqlite_files(&db_path);
    }

    #[test]
    fn in_memory_database_gets_full_schema() {
        let db = Db::open_in_memory().expect("in-memory database should open");
        assert_eq!(db.schema_version().expect("schema version should be readable"), 1);
    }

    fn unique_temp_db_path(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();

        std::env::temp_dir().join(format!("redline-{prefix}-{nanos}.db"))
    }

    fn cleanup_sqlite_files(path: &PathBuf) {
        let path_str = path.display().to_string();
        let wal = format!("{path_str}-wal");
        let shm = format!("{path_str}-shm");

        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(wal);
        let _ = std::fs::remove_file(shm);
    }
}
