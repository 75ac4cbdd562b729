use chrono::Utc;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::allowlist::{AllowlistDirection, AllowlistEntry, AllowlistEntryInput};

/// Persisted allowlist edges. This store is authoritative; the permission
/// cache in front of it is allowed to lag.
#[derive(Clone)]
pub struct AllowlistStore {
    db: Database,
}

impl AllowlistStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<AllowlistEntry>, ServerError> {
        let id = agent_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, allowed_agent_id, direction, created_at
                     FROM agent_allowlists WHERE agent_id = ?1
                     ORDER BY created_at ASC, allowed_agent_id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![id], |row| Ok(row_to_entry(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// All edges whose owner belongs to `tenant_id`.
    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<AllowlistEntry>, ServerError> {
        let tenant = tenant_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT l.id, l.agent_id, l.allowed_agent_id, l.direction, l.created_at
                     FROM agent_allowlists l
                     JOIN agents a ON a.id = l.agent_id
                     WHERE a.tenant_id = ?1
                     ORDER BY l.agent_id ASC, l.allowed_agent_id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![tenant], |row| Ok(row_to_entry(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Replace every outbound edge of `agent_id` in one transaction.
    ///
    /// Later duplicates of the same counterpart win.
    pub async fn replace_for_agent(
        &self,
        agent_id: &str,
        entries: Vec<AllowlistEntryInput>,
    ) -> Result<Vec<AllowlistEntry>, ServerError> {
        let id = agent_id.to_string();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let tx = conn.unchecked_transaction()?;
                tx.execute(
                    "DELETE FROM agent_allowlists WHERE agent_id = ?1",
                    rusqlite::params![id],
                )?;
                {
                    let mut insert = tx.prepare(
                        "INSERT INTO agent_allowlists (id, agent_id, allowed_agent_id, direction, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(agent_id, allowed_agent_id) DO UPDATE SET
                           direction = excluded.direction",
                    )?;
                    for entry in &entries {
                        insert.execute(rusqlite::params![
                            Uuid::new_v4().to_string(),
                            id,
                            entry.allowed_agent_id,
                            entry.direction.as_str(),
                            now,
                        ])?;
                    }
                }
                let stored = {
                    let mut stmt = tx.prepare(
                        "SELECT id, agent_id, allowed_agent_id, direction, created_at
                         FROM agent_allowlists WHERE agent_id = ?1
                         ORDER BY created_at ASC, allowed_agent_id ASC",
                    )?;
                    let rows = stmt
                        .query_map(rusqlite::params![id], |row| Ok(row_to_entry(row)))?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                };
                tx.commit()?;
                Ok(stored)
            })
            .await
    }

    /// Direction of the edge `owner -> counterpart`, if one exists.
    pub async fn direction(
        &self,
        owner_id: &str,
        counterpart_id: &str,
    ) -> Result<Option<AllowlistDirection>, ServerError> {
        let owner = owner_id.to_string();
        let counterpart = counterpart_id.to_string();
        let raw: Option<String> = self
            .db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT direction FROM agent_allowlists
                     WHERE agent_id = ?1 AND allowed_agent_id = ?2",
                    rusqlite::params![owner, counterpart],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(raw.as_deref().and_then(AllowlistDirection::from_str))
    }
}

fn row_to_entry(row: &Row<'_>) -> AllowlistEntry {
    let created_ms: i64 = row.get(4).unwrap_or(0);
    AllowlistEntry {
        id: row.get(0).unwrap_or_default(),
        agent_id: row.get(1).unwrap_or_default(),
        allowed_agent_id: row.get(2).unwrap_or_default(),
        direction: AllowlistDirection::from_str(&row.get::<_, String>(3).unwrap_or_default())
            .unwrap_or_default(),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
    }
}
