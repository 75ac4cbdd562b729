//! Tenant-scoped realtime channel.
//!
//! Each socket joins its tenant's broadcast room and receives every
//! `message_sent` / `message_delivered` / `message_failed` event as a JSON
//! text frame. A client coming back from a gap sends
//! `{"type":"catch-up","since":"<rfc3339>"}` and gets the missed events
//! replayed to it alone, followed by a `catch-up-complete` frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use switchboard_core::auth::TenantContext;
use switchboard_core::events::catch_up;
use switchboard_core::state::AppState;

use super::auth::SocketAuth;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ws", get(realtime_ws))
}

/// Client → server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientFrame {
    #[serde(rename = "catch-up")]
    CatchUp { since: DateTime<Utc> },
}

/// Server → client control frames. Message events are sent as-is.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ControlFrame {
    #[serde(rename = "catch-up-complete", rename_all = "camelCase")]
    CatchUpComplete { count: usize },
    #[serde(rename = "error")]
    Error { message: String },
}

// `SocketAuth` runs before the upgrade, so a bad token is a plain 401.
async fn realtime_ws(
    State(state): State<AppState>,
    SocketAuth(ctx): SocketAuth,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ctx))
}

async fn handle_socket(socket: WebSocket, state: AppState, ctx: TenantContext) {
    let mut events = state.broadcaster.subscribe(&ctx.tenant_id);
    let (mut sink, mut stream) = socket.split();

    tracing::info!(
        "[Realtime] {} joined tenant room {}",
        ctx.actor_id,
        ctx.tenant_id
    );

    // Single writer: broadcast forwarding and catch-up replies share the sink.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let mut write_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let forward_tx = out_tx.clone();
    let tenant_id = ctx.tenant_id.clone();
    let mut forward_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(t) => t,
                        Err(_) => continue,
                    };
                    if forward_tx.send(text).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[Realtime] Subscriber of tenant {} lagged, {} events skipped",
                        tenant_id,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!("[Realtime] Receive error: {}", e);
                        break;
                    }
                };
                if !handle_client_frame(text.as_str(), &state, &ctx, &out_tx).await {
                    break;
                }
            }
            _ = &mut write_task => break,
            _ = &mut forward_task => break,
        }
    }

    forward_task.abort();
    write_task.abort();
    tracing::info!(
        "[Realtime] {} left tenant room {}",
        ctx.actor_id,
        ctx.tenant_id
    );
}

/// Returns false once the writer is gone.
async fn handle_client_frame(
    text: &str,
    state: &AppState,
    ctx: &TenantContext,
    out: &mpsc::UnboundedSender<String>,
) -> bool {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            return send_control(
                out,
                ControlFrame::Error {
                    message: format!("Invalid frame: {}", e),
                },
            );
        }
    };

    match frame {
        ClientFrame::CatchUp { since } => {
            let replay = catch_up(
                &state.message_store,
                &ctx.tenant_id,
                since,
                state.config.catch_up_window,
                state.config.catch_up_limit,
            )
            .await;
            match replay {
                Ok(events) => {
                    let count = events.len();
                    for event in events {
                        let Ok(text) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if out.send(text).is_err() {
                            return false;
                        }
                    }
                    send_control(out, ControlFrame::CatchUpComplete { count })
                }
                Err(e) => {
                    tracing::error!(
                        "[Realtime] Catch-up failed for tenant {}: {}",
                        ctx.tenant_id,
                        e
                    );
                    send_control(
                        out,
                        ControlFrame::Error {
                            message: "Catch-up failed".to_string(),
                        },
                    )
                }
            }
        }
    }
}

fn send_control(out: &mpsc::UnboundedSender<String>, frame: ControlFrame) -> bool {
    match serde_json::to_string(&frame) {
        Ok(text) => out.send(text).is_ok(),
        Err(_) => true,
    }
}
