use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ServerError;
use crate::workflow::schema::{
    InstanceFilter, InstanceStatus, WorkflowInstance, WorkflowTemplate,
};

const TEMPLATE_COLUMNS: &str =
    "id, name, label, description, steps, tenant_id, is_system, created_at, updated_at";

const INSTANCE_COLUMNS: &str = "id, template_id, tenant_id, status, current_step, triggered_by, \
     input_data, step_logs, created_at, updated_at, completed_at, failed_at, failure_reason";

/// Templates and run state of workflow instances.
#[derive(Clone)]
pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ─── Templates ──────────────────────────────────────────────────────

    pub async fn save_template(&self, template: &WorkflowTemplate) -> Result<(), ServerError> {
        let t = template.clone();
        let steps = serde_json::to_string(&t.steps)?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_templates (id, name, label, description, steps, tenant_id, \
                     is_system, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT(id) DO UPDATE SET \
                       name = excluded.name, \
                       label = excluded.label, \
                       description = excluded.description, \
                       steps = excluded.steps, \
                       is_system = excluded.is_system, \
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        t.id,
                        t.name,
                        t.label,
                        t.description,
                        steps,
                        t.tenant_id,
                        t.is_system as i64,
                        t.created_at.timestamp_millis(),
                        t.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_template(&self, id: &str) -> Result<Option<WorkflowTemplate>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM workflow_templates WHERE id = ?1", TEMPLATE_COLUMNS),
                    rusqlite::params![id],
                    row_to_template,
                )
                .optional()
            })
            .await
    }

    /// Shared templates plus the ones owned by `tenant_id`.
    pub async fn list_templates_visible(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<WorkflowTemplate>, ServerError> {
        let tenant = tenant_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM workflow_templates
                     WHERE tenant_id IS NULL OR tenant_id = ?1
                     ORDER BY is_system DESC, name ASC",
                    TEMPLATE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![tenant], row_to_template)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    // ─── Instances ──────────────────────────────────────────────────────

    pub async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), ServerError> {
        let i = instance.clone();
        let input = serde_json::to_string(&i.input_data)?;
        let logs = serde_json::to_string(&i.step_logs)?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO workflow_instances ({}) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        INSTANCE_COLUMNS
                    ),
                    rusqlite::params![
                        i.id,
                        i.template_id,
                        i.tenant_id,
                        i.status.as_str(),
                        i.current_step as i64,
                        i.triggered_by,
                        input,
                        logs,
                        i.created_at.timestamp_millis(),
                        i.updated_at.timestamp_millis(),
                        i.completed_at.map(|t| t.timestamp_millis()),
                        i.failed_at.map(|t| t.timestamp_millis()),
                        i.failure_reason,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Unscoped lookup, for background jobs that carry only an instance id.
    pub async fn get_instance(&self, id: &str) -> Result<Option<WorkflowInstance>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM workflow_instances WHERE id = ?1", INSTANCE_COLUMNS),
                    rusqlite::params![id],
                    row_to_instance,
                )
                .optional()
            })
            .await
    }

    pub async fn get_instance_in_tenant(
        &self,
        id: &str,
        tenant_id: &str,
    ) -> Result<Option<WorkflowInstance>, ServerError> {
        let id = id.to_string();
        let tenant = tenant_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {} FROM workflow_instances WHERE id = ?1 AND tenant_id = ?2",
                        INSTANCE_COLUMNS
                    ),
                    rusqlite::params![id, tenant],
                    row_to_instance,
                )
                .optional()
            })
            .await
    }

    /// Keyset page ordered by `created_at DESC, id DESC`.
    pub async fn list_instances(
        &self,
        tenant_id: &str,
        filter: InstanceFilter,
        cursor: Option<String>,
        fetch: usize,
    ) -> Result<Vec<WorkflowInstance>, ServerError> {
        let mut clauses = vec!["tenant_id = ?".to_string()];
        let mut params = vec![Value::Text(tenant_id.to_string())];
        if let Some(status) = filter.status {
            clauses.push("status = ?".into());
            params.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(template_id) = filter.template_id {
            clauses.push("template_id = ?".into());
            params.push(Value::Text(template_id));
        }
        if let Some(cursor_id) = cursor {
            let id = cursor_id.clone();
            let tenant = tenant_id.to_string();
            let created: Option<i64> = self
                .db
                .with_conn_async(move |conn| {
                    conn.query_row(
                        "SELECT created_at FROM workflow_instances WHERE id = ?1 AND tenant_id = ?2",
                        rusqlite::params![id, tenant],
                        |row| row.get(0),
                    )
                    .optional()
                })
                .await?;
            let created = created
                .ok_or_else(|| ServerError::BadRequest(format!("Invalid cursor: {}", cursor_id)))?;
            clauses.push("(created_at < ? OR (created_at = ? AND id < ?))".into());
            params.push(Value::Integer(created));
            params.push(Value::Integer(created));
            params.push(Value::Text(cursor_id));
        }
        let sql = format!(
            "SELECT {} FROM workflow_instances WHERE {} ORDER BY created_at DESC, id DESC LIMIT {}",
            INSTANCE_COLUMNS,
            clauses.join(" AND "),
            fetch
        );
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), row_to_instance)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Compare-and-set write of the mutable instance fields.
    ///
    /// The row is only updated while its stored status is one of `expected`
    /// and its stored `current_step` equals `expected_step`. Returns whether
    /// the write happened.
    pub async fn update_instance_if(
        &self,
        instance: &WorkflowInstance,
        expected: &[InstanceStatus],
        expected_step: usize,
    ) -> Result<bool, ServerError> {
        let i = instance.clone();
        let logs = serde_json::to_string(&i.step_logs)?;
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        self.db
            .with_conn_async(move |conn| {
                let placeholders = (0..expected.len())
                    .map(|n| format!("?{}", n + 9))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "UPDATE workflow_instances SET status = ?2, current_step = ?3, step_logs = ?4, \
                     updated_at = ?5, completed_at = ?6, failed_at = ?7, failure_reason = ?8 \
                     WHERE id = ?1 AND current_step = ?{} AND status IN ({})",
                    expected.len() + 9,
                    placeholders
                );
                let mut params: Vec<Value> = vec![
                    Value::Text(i.id.clone()),
                    Value::Text(i.status.as_str().to_string()),
                    Value::Integer(i.current_step as i64),
                    Value::Text(logs),
                    Value::Integer(i.updated_at.timestamp_millis()),
                    opt_ms(i.completed_at),
                    opt_ms(i.failed_at),
                    i.failure_reason.clone().map(Value::Text).unwrap_or(Value::Null),
                ];
                params.extend(expected.into_iter().map(Value::Text));
                params.push(Value::Integer(expected_step as i64));
                let changed = conn.execute(&sql, rusqlite::params_from_iter(params))?;
                Ok(changed > 0)
            })
            .await
    }
}

fn opt_ms(t: Option<DateTime<Utc>>) -> Value {
    t.map(|t| Value::Integer(t.timestamp_millis()))
        .unwrap_or(Value::Null)
}

fn to_dt(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|v| Utc.timestamp_millis_opt(v).single())
}

/// Decode a JSON column into its typed form, surfacing bad data as a
/// conversion error instead of silently defaulting.
fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<WorkflowTemplate> {
    Ok(WorkflowTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
        description: row.get(3)?,
        steps: json_column(row, 4)?,
        tenant_id: row.get(5)?,
        is_system: row.get::<_, i64>(6)? != 0,
        created_at: to_dt(row.get(7)?).unwrap_or_else(Utc::now),
        updated_at: to_dt(row.get(8)?).unwrap_or_else(Utc::now),
    })
}

fn row_to_instance(row: &Row<'_>) -> rusqlite::Result<WorkflowInstance> {
    let status_raw: String = row.get(3)?;
    let status = InstanceStatus::from_str(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown instance status '{}'", status_raw).into(),
        )
    })?;
    Ok(WorkflowInstance {
        id: row.get(0)?,
        template_id: row.get(1)?,
        tenant_id: row.get(2)?,
        status,
        current_step: row.get::<_, i64>(4)?.max(0) as usize,
        triggered_by: row.get(5)?,
        input_data: json_column(row, 6)?,
        step_logs: json_column(row, 7)?,
        created_at: to_dt(row.get(8)?).unwrap_or_else(Utc::now),
        updated_at: to_dt(row.get(9)?).unwrap_or_else(Utc::now),
        completed_at: to_dt(row.get(10)?),
        failed_at: to_dt(row.get(11)?),
        failure_reason: row.get(12)?,
    })
}
