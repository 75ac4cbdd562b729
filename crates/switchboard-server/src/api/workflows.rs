use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use switchboard_core::models::message::{Page, PageRequest};
use switchboard_core::state::AppState;
use switchboard_core::workflow::{
    InstanceFilter, InstanceStatus, TriggerWorkflowInput, WorkflowInstance, WorkflowTemplate,
};
use switchboard_core::ServerError;

use super::auth::Tenant;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/{id}/trigger", post(trigger_workflow))
        .route("/instances", get(list_instances))
        .route("/instances/{id}", get(get_instance))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInstancesQuery {
    status: Option<InstanceStatus>,
    template_id: Option<String>,
    cursor: Option<String>,
    limit: Option<usize>,
}

async fn list_templates(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
) -> Result<Json<Vec<WorkflowTemplate>>, ServerError> {
    let templates = state.orchestrator.list_templates(&ctx.tenant_id).await?;
    Ok(Json(templates))
}

async fn create_template(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Json(body): Json<WorkflowTemplate>,
) -> Result<(StatusCode, Json<WorkflowTemplate>), ServerError> {
    let template = state
        .orchestrator
        .create_template(body, &ctx.tenant_id)
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn trigger_workflow(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(template_id): Path<String>,
    Json(body): Json<TriggerWorkflowInput>,
) -> Result<(StatusCode, Json<WorkflowInstance>), ServerError> {
    let instance = state
        .orchestrator
        .trigger_workflow(&template_id, body, &ctx.tenant_id, &ctx.actor_id)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

async fn list_instances(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Query(query): Query<ListInstancesQuery>,
) -> Result<Json<Page<WorkflowInstance>>, ServerError> {
    let filter = InstanceFilter {
        status: query.status,
        template_id: query.template_id,
    };
    let page = PageRequest {
        cursor: query.cursor,
        limit: query.limit,
    };
    let page = state
        .orchestrator
        .list_instances(&ctx.tenant_id, filter, page)
        .await?;
    Ok(Json(page))
}

async fn get_instance(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(id): Path<String>,
) -> Result<Json<WorkflowInstance>, ServerError> {
    let instance = state.orchestrator.get_instance(&id, &ctx.tenant_id).await?;
    Ok(Json(instance))
}
