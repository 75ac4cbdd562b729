use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ServerError;
use crate::models::message::{Message, MessageFilter, MessageStats, MessageStatus, MessageType};

const MESSAGE_COLUMNS: &str = "id, tenant_id, sender_id, recipient_id, type, payload, \
     correlation_id, status, created_at, delivered_at";

/// Which messages a listing may see.
#[derive(Debug, Clone)]
pub enum MessageScope {
    Tenant { tenant_id: String },
    /// Messages the agent sent or received.
    Agent { tenant_id: String, agent_id: String },
}

impl MessageScope {
    fn tenant_id(&self) -> &str {
        match self {
            Self::Tenant { tenant_id } | Self::Agent { tenant_id, .. } => tenant_id,
        }
    }
}

/// Durable message log.
#[derive(Clone)]
pub struct MessageStore {
    db: Database,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert(&self, message: &Message) -> Result<(), ServerError> {
        let m = message.clone();
        let payload = serde_json::to_string(&m.payload)?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO agent_messages (id, tenant_id, sender_id, recipient_id, type, payload, \
                     correlation_id, status, created_at, delivered_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        m.id,
                        m.tenant_id,
                        m.sender_id,
                        m.recipient_id,
                        m.message_type.as_str(),
                        payload,
                        m.correlation_id,
                        m.status.as_str(),
                        m.created_at.timestamp_millis(),
                        m.delivered_at.map(|t| t.timestamp_millis()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Message>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM agent_messages WHERE id = ?1", MESSAGE_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_message(row)),
                )
                .optional()
            })
            .await
    }

    /// pending → delivered. Returns `None` when the message is missing or has
    /// already left `pending`.
    pub async fn mark_delivered(&self, id: &str) -> Result<Option<Message>, ServerError> {
        self.transition(id, MessageStatus::Delivered, Some(Utc::now())).await
    }

    /// pending → failed. Returns `None` when the message is missing or has
    /// already left `pending`.
    pub async fn mark_failed(&self, id: &str) -> Result<Option<Message>, ServerError> {
        self.transition(id, MessageStatus::Failed, None).await
    }

    async fn transition(
        &self,
        id: &str,
        to: MessageStatus,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Message>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE agent_messages SET status = ?2, delivered_at = ?3
                     WHERE id = ?1 AND status = 'pending'",
                    rusqlite::params![
                        id,
                        to.as_str(),
                        delivered_at.map(|t| t.timestamp_millis())
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                conn.query_row(
                    &format!("SELECT {} FROM agent_messages WHERE id = ?1", MESSAGE_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_message(row)),
                )
                .optional()
            })
            .await
    }

    /// Keyset page ordered by `created_at DESC, id DESC`.
    ///
    /// Fetches up to `fetch` rows strictly after the `cursor` row. An unknown
    /// cursor is a `BadRequest`.
    pub async fn list_page(
        &self,
        scope: MessageScope,
        filter: MessageFilter,
        cursor: Option<String>,
        fetch: usize,
    ) -> Result<Vec<Message>, ServerError> {
        let cursor_key = match cursor {
            Some(cursor_id) => {
                let tenant = scope.tenant_id().to_string();
                let id = cursor_id.clone();
                let created: Option<i64> = self
                    .db
                    .with_conn_async(move |conn| {
                        conn.query_row(
                            "SELECT created_at FROM agent_messages WHERE id = ?1 AND tenant_id = ?2",
                            rusqlite::params![id, tenant],
                            |row| row.get(0),
                        )
                        .optional()
                    })
                    .await?;
                let created = created.ok_or_else(|| {
                    ServerError::BadRequest(format!("Invalid cursor: {}", cursor_id))
                })?;
                Some((created, cursor_id))
            }
            None => None,
        };

        let mut query = QueryBuilder::scoped(&scope);
        query.apply_filter(&filter);
        if let Some((created, id)) = cursor_key {
            query.push(
                "(created_at < ? OR (created_at = ? AND id < ?))",
                vec![Value::Integer(created), Value::Integer(created), Value::Text(id)],
            );
        }
        let sql = format!(
            "SELECT {} FROM agent_messages WHERE {} ORDER BY created_at DESC, id DESC LIMIT {}",
            MESSAGE_COLUMNS,
            query.where_clause(),
            fetch
        );
        self.query_messages(sql, query.params).await
    }

    /// Newest-first bulk read of at most `limit` rows.
    pub async fn list_recent(
        &self,
        tenant_id: &str,
        filter: MessageFilter,
        limit: usize,
    ) -> Result<Vec<Message>, ServerError> {
        let mut query = QueryBuilder::scoped(&MessageScope::Tenant {
            tenant_id: tenant_id.to_string(),
        });
        query.apply_filter(&filter);
        let sql = format!(
            "SELECT {} FROM agent_messages WHERE {} ORDER BY created_at DESC, id DESC LIMIT {}",
            MESSAGE_COLUMNS,
            query.where_clause(),
            limit
        );
        self.query_messages(sql, query.params).await
    }

    /// Oldest-first read of messages created at or after `since`.
    pub async fn list_since(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, ServerError> {
        let sql = format!(
            "SELECT {} FROM agent_messages WHERE tenant_id = ? AND created_at >= ? \
             ORDER BY created_at ASC, id ASC LIMIT {}",
            MESSAGE_COLUMNS, limit
        );
        self.query_messages(
            sql,
            vec![
                Value::Text(tenant_id.to_string()),
                Value::Integer(since.timestamp_millis()),
            ],
        )
        .await
    }

    /// Aggregate statistics over the `row_limit` most recent messages.
    pub async fn stats(
        &self,
        tenant_id: &str,
        row_limit: usize,
        threads_since: DateTime<Utc>,
        latency_sample: usize,
    ) -> Result<MessageStats, ServerError> {
        let tenant = tenant_id.to_string();
        let threads_since_ms = threads_since.timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let (total, pending, delivered, failed, active_threads): (i64, i64, i64, i64, i64) =
                    conn.query_row(
                        "SELECT COUNT(*),
                                COALESCE(SUM(status = 'pending'), 0),
                                COALESCE(SUM(status = 'delivered'), 0),
                                COALESCE(SUM(status = 'failed'), 0),
                                COUNT(DISTINCT CASE WHEN created_at >= ?3 THEN correlation_id END)
                         FROM (SELECT status, correlation_id, created_at FROM agent_messages
                               WHERE tenant_id = ?1 ORDER BY created_at DESC LIMIT ?2)",
                        rusqlite::params![tenant, row_limit as i64, threads_since_ms],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                    )?;
                let avg_latency: Option<f64> = conn.query_row(
                    "SELECT AVG(delivered_at - created_at)
                     FROM (SELECT delivered_at, created_at FROM agent_messages
                           WHERE tenant_id = ?1 AND status = 'delivered' AND delivered_at IS NOT NULL
                           ORDER BY delivered_at DESC LIMIT ?2)",
                    rusqlite::params![tenant, latency_sample as i64],
                    |row| row.get(0),
                )?;
                Ok(MessageStats {
                    total: total as u64,
                    pending: pending as u64,
                    delivered: delivered as u64,
                    failed: failed as u64,
                    active_threads: active_threads as u64,
                    avg_delivery_latency_ms: avg_latency,
                })
            })
            .await
    }

    async fn query_messages(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<Vec<Message>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), |row| {
                        Ok(row_to_message(row))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

/// Accumulates `AND`-joined conditions with positional parameters.
struct QueryBuilder {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl QueryBuilder {
    fn scoped(scope: &MessageScope) -> Self {
        let mut q = Self {
            clauses: Vec::new(),
            params: Vec::new(),
        };
        match scope {
            MessageScope::Tenant { tenant_id } => {
                q.push("tenant_id = ?", vec![Value::Text(tenant_id.clone())]);
            }
            MessageScope::Agent {
                tenant_id,
                agent_id,
            } => {
                q.push("tenant_id = ?", vec![Value::Text(tenant_id.clone())]);
                q.push(
                    "(sender_id = ? OR recipient_id = ?)",
                    vec![Value::Text(agent_id.clone()), Value::Text(agent_id.clone())],
                );
            }
        }
        q
    }

    fn push(&mut self, clause: &str, params: Vec<Value>) {
        self.clauses.push(clause.to_string());
        self.params.extend(params);
    }

    fn apply_filter(&mut self, filter: &MessageFilter) {
        if let Some(t) = filter.message_type {
            self.push("type = ?", vec![Value::Text(t.as_str().to_string())]);
        }
        if let Some(s) = filter.status {
            self.push("status = ?", vec![Value::Text(s.as_str().to_string())]);
        }
        if let Some(ref c) = filter.correlation_id {
            self.push("correlation_id = ?", vec![Value::Text(c.clone())]);
        }
        if let Some(ref s) = filter.sender_id {
            self.push("sender_id = ?", vec![Value::Text(s.clone())]);
        }
        if let Some(ref r) = filter.recipient_id {
            self.push("recipient_id = ?", vec![Value::Text(r.clone())]);
        }
        if let Some(from) = filter.from {
            self.push("created_at >= ?", vec![Value::Integer(from.timestamp_millis())]);
        }
        if let Some(to) = filter.to {
            self.push("created_at <= ?", vec![Value::Integer(to.timestamp_millis())]);
        }
        if let Some(ref search) = filter.search {
            if !search.is_empty() {
                self.push(
                    "payload LIKE ? ESCAPE '\\'",
                    vec![Value::Text(format!("%{}%", escape_like(search)))],
                );
            }
        }
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn row_to_message(row: &Row<'_>) -> Message {
    use chrono::TimeZone;
    let to_dt = |ms: Option<i64>| ms.and_then(|v| Utc.timestamp_millis_opt(v).single());

    let payload_str: String = row.get(5).unwrap_or_default();
    Message {
        id: row.get(0).unwrap_or_default(),
        tenant_id: row.get(1).unwrap_or_default(),
        sender_id: row.get(2).unwrap_or_default(),
        recipient_id: row.get(3).unwrap_or_default(),
        message_type: MessageType::from_str(&row.get::<_, String>(4).unwrap_or_default())
            .unwrap_or(MessageType::Notification),
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        correlation_id: row.get(6).unwrap_or(None),
        status: MessageStatus::from_str(&row.get::<_, String>(7).unwrap_or_default())
            .unwrap_or(MessageStatus::Pending),
        created_at: to_dt(row.get(8).ok()).unwrap_or_else(Utc::now),
        delivered_at: to_dt(row.get(9).unwrap_or(None)),
    }
}
