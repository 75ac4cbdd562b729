use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use switchboard_core::models::message::{
    Message, MessageExport, MessageFilter, MessageStats, MessageStatus, MessageType, Page,
    PageRequest, SendMessageInput,
};
use switchboard_core::state::AppState;
use switchboard_core::ServerError;

use super::auth::Tenant;

/// Routes nested under `/api/agents`.
pub fn agent_router() -> Router<AppState> {
    Router::new().route("/{id}/messages", get(list_agent_messages).post(send_message))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", get(list_tenant_messages))
        .route("/api/messages/export", get(export_messages))
        .route("/api/messages/stats", get(message_stats))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    #[serde(rename = "type")]
    message_type: Option<MessageType>,
    status: Option<MessageStatus>,
    correlation_id: Option<String>,
    sender_id: Option<String>,
    recipient_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    search: Option<String>,
    cursor: Option<String>,
    limit: Option<usize>,
}

impl ListMessagesQuery {
    fn split(self) -> (MessageFilter, PageRequest) {
        let filter = MessageFilter {
            message_type: self.message_type,
            status: self.status,
            correlation_id: self.correlation_id,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            from: self.from,
            to: self.to,
            search: self.search.filter(|s| !s.is_empty()),
        };
        let page = PageRequest {
            cursor: self.cursor,
            limit: self.limit,
        };
        (filter, page)
    }
}

async fn send_message(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(agent_id): Path<String>,
    Json(body): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<Message>), ServerError> {
    let message = state
        .messaging
        .send_message(&agent_id, body, &ctx.tenant_id, &ctx.actor_id)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_agent_messages(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Path(agent_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Page<Message>>, ServerError> {
    let (filter, page) = query.split();
    let page = state
        .messaging
        .get_agent_messages(&agent_id, &ctx.tenant_id, filter, page)
        .await?;
    Ok(Json(page))
}

async fn list_tenant_messages(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Page<Message>>, ServerError> {
    let (filter, page) = query.split();
    let page = state
        .messaging
        .get_tenant_messages(&ctx.tenant_id, filter, page)
        .await?;
    Ok(Json(page))
}

async fn export_messages(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageExport>, ServerError> {
    let (filter, _) = query.split();
    let export = state
        .messaging
        .export_tenant_messages(&ctx.tenant_id, filter)
        .await?;
    Ok(Json(export))
}

async fn message_stats(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
) -> Result<Json<MessageStats>, ServerError> {
    let stats = state.messaging.get_message_stats(&ctx.tenant_id).await?;
    Ok(Json(stats))
}
