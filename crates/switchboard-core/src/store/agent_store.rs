use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ServerError;
use crate::models::agent::{Agent, AgentStatus};

/// Read access to the tenant's agent directory.
///
/// Agent administration lives outside this crate; `save` exists for seeding.
#[derive(Clone)]
pub struct AgentStore {
    db: Database,
}

impl AgentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, agent: &Agent) -> Result<(), ServerError> {
        let a = agent.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO agents (id, tenant_id, name, role, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       role = excluded.role,
                       status = excluded.status,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        a.id,
                        a.tenant_id,
                        a.name,
                        a.role,
                        a.status.as_str(),
                        a.created_at.timestamp_millis(),
                        a.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Fetch an agent only if it belongs to `tenant_id`.
    pub async fn get_in_tenant(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Option<Agent>, ServerError> {
        let id = agent_id.to_string();
        let tenant = tenant_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT id, tenant_id, name, role, status, created_at, updated_at
                     FROM agents WHERE id = ?1 AND tenant_id = ?2",
                    rusqlite::params![id, tenant],
                    |row| Ok(row_to_agent(row)),
                )
                .optional()
            })
            .await
    }

    /// Like `get_in_tenant`, but a missing or foreign agent is `NotFound`.
    pub async fn require_in_tenant(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Agent, ServerError> {
        self.get_in_tenant(agent_id, tenant_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("Agent {} not found", agent_id)))
    }

    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Agent>, ServerError> {
        let tenant = tenant_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, tenant_id, name, role, status, created_at, updated_at
                     FROM agents WHERE tenant_id = ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![tenant], |row| Ok(row_to_agent(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Return the subset of `agent_ids` that do not belong to `tenant_id`,
    /// in input order and without duplicates.
    pub async fn missing_in_tenant(
        &self,
        agent_ids: &[String],
        tenant_id: &str,
    ) -> Result<Vec<String>, ServerError> {
        let ids = agent_ids.to_vec();
        let tenant = tenant_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT 1 FROM agents WHERE id = ?1 AND tenant_id = ?2")?;
                let mut seen = HashSet::new();
                let mut missing = Vec::new();
                for id in ids {
                    if !seen.insert(id.clone()) {
                        continue;
                    }
                    if !stmt.exists(rusqlite::params![id, tenant])? {
                        missing.push(id);
                    }
                }
                Ok(missing)
            })
            .await
    }
}

fn row_to_agent(row: &Row<'_>) -> Agent {
    let created_ms: i64 = row.get(5).unwrap_or(0);
    let updated_ms: i64 = row.get(6).unwrap_or(0);

    Agent {
        id: row.get(0).unwrap_or_default(),
        tenant_id: row.get(1).unwrap_or_default(),
        name: row.get(2).unwrap_or_default(),
        role: row.get(3).unwrap_or(None),
        status: AgentStatus::from_str(&row.get::<_, String>(4).unwrap_or_default())
            .unwrap_or(AgentStatus::Active),
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms).unwrap_or_else(Utc::now),
    }
}
