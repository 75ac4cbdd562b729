//! SQLite database layer for the Switchboard backend.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ServerError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, ServerError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| ServerError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| ServerError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, ServerError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ServerError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ServerError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ServerError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| ServerError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| ServerError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), ServerError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS agents (
                    id              TEXT PRIMARY KEY,
                    tenant_id       TEXT NOT NULL,
                    name            TEXT NOT NULL,
                    role            TEXT,
                    status          TEXT NOT NULL DEFAULT 'active',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_agents_tenant ON agents(tenant_id);

                CREATE TABLE IF NOT EXISTS agent_allowlists (
                    id                  TEXT PRIMARY KEY,
                    agent_id            TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                    allowed_agent_id    TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                    direction           TEXT NOT NULL DEFAULT 'both',
                    created_at          INTEGER NOT NULL,
                    UNIQUE (agent_id, allowed_agent_id)
                );
                CREATE INDEX IF NOT EXISTS idx_allowlists_allowed ON agent_allowlists(allowed_agent_id);

                CREATE TABLE IF NOT EXISTS agent_messages (
                    id              TEXT PRIMARY KEY,
                    tenant_id       TEXT NOT NULL,
                    sender_id       TEXT NOT NULL,
                    recipient_id    TEXT NOT NULL,
                    type            TEXT NOT NULL,
                    payload         TEXT NOT NULL DEFAULT '{}',
                    correlation_id  TEXT,
                    status          TEXT NOT NULL DEFAULT 'pending',
                    created_at      INTEGER NOT NULL,
                    delivered_at    INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_messages_tenant_created ON agent_messages(tenant_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_messages_sender ON agent_messages(sender_id);
                CREATE INDEX IF NOT EXISTS idx_messages_recipient ON agent_messages(recipient_id);
                CREATE INDEX IF NOT EXISTS idx_messages_correlation ON agent_messages(correlation_id);

                CREATE TABLE IF NOT EXISTS workflow_templates (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    label           TEXT NOT NULL,
                    description     TEXT,
                    steps           TEXT NOT NULL DEFAULT '[]',
                    tenant_id       TEXT,
                    is_system       INTEGER NOT NULL DEFAULT 0,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_templates_tenant ON workflow_templates(tenant_id);

                CREATE TABLE IF NOT EXISTS workflow_instances (
                    id              TEXT PRIMARY KEY,
                    template_id     TEXT NOT NULL REFERENCES workflow_templates(id),
                    tenant_id       TEXT NOT NULL,
                    status          TEXT NOT NULL DEFAULT 'pending',
                    current_step    INTEGER NOT NULL DEFAULT 0,
                    triggered_by    TEXT NOT NULL,
                    input_data      TEXT NOT NULL DEFAULT '{}',
                    step_logs       TEXT NOT NULL DEFAULT '[]',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL,
                    completed_at    INTEGER,
                    failed_at       INTEGER,
                    failure_reason  TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_instances_tenant_created ON workflow_instances(tenant_id, created_at);
                "
            )
        })
    }
}
