//! HTTP and WebSocket tests against the full router.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

use switchboard_core::models::{Agent, MessageStatus};
use switchboard_core::state::AppState;
use switchboard_server::{build_router, create_app_state, start_server_with_state, ServerConfig};

const TENANT: &str = "tenant-a";
const OTHER_TENANT: &str = "tenant-b";

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        db_path: ":memory:".to_string(),
        jwt_secret: "api-test-secret".to_string(),
        ..ServerConfig::default()
    }
}

async fn setup() -> (AppState, Router) {
    let state = create_app_state(&test_config()).await.unwrap();
    for (id, tenant) in [
        ("agent-a", TENANT),
        ("agent-b", TENANT),
        ("agent-c", TENANT),
        ("agent-x", OTHER_TENANT),
    ] {
        state
            .agent_store
            .save(&Agent::new(id.to_string(), tenant.to_string(), id.to_string(), None))
            .await
            .unwrap();
    }
    let app = build_router(state.clone());
    (state, app)
}

fn token(state: &AppState, tenant: &str) -> String {
    state
        .token_verifier
        .issue("user-1", tenant, chrono::Duration::hours(1))
        .unwrap()
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn allow_both(app: &Router, token: &str, owner: &str, others: &[&str]) {
    let entries: Vec<Value> = others
        .iter()
        .map(|id| json!({ "allowedAgentId": id, "direction": "both" }))
        .collect();
    let (status, _) = call(
        app,
        "PUT",
        &format!("/api/agents/{}/allowlist", owner),
        Some(token),
        Some(json!({ "entries": entries })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let (_state, app) = setup().await;
    let (status, body) = call(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let (state, app) = setup().await;

    let (status, body) = call(&app, "GET", "/api/messages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, "GET", "/api/messages", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = switchboard_core::auth::TokenVerifier::new("other-secret")
        .issue("user-1", TENANT, chrono::Duration::hours(1))
        .unwrap();
    let (status, _) = call(&app, "GET", "/api/messages", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let valid = token(&state, TENANT);
    let (status, _) = call(&app, "GET", "/api/messages", Some(&valid), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_send_requires_allowlist_and_lists_messages() {
    let (state, app) = setup().await;
    let token = token(&state, TENANT);
    let send = json!({ "recipientId": "agent-b", "type": "data_request", "payload": { "q": 1 } });

    let (status, _) = call(
        &app,
        "POST",
        "/api/agents/agent-a/messages",
        Some(&token),
        Some(send.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    allow_both(&app, &token, "agent-a", &["agent-b"]).await;

    let (status, body) = call(
        &app,
        "GET",
        "/api/agents/agent-a/allowlist",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app,
        "POST",
        "/api/agents/agent-a/messages",
        Some(&token),
        Some(send),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["type"], "data_request");

    let (status, body) = call(
        &app,
        "GET",
        "/api/agents/agent-b/messages?limit=10",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["pageInfo"]["hasNextPage"], false);

    let (status, body) = call(
        &app,
        "GET",
        "/api/messages?type=notification",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());

    let (status, body) = call(&app, "GET", "/api/messages/export", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["truncated"], false);

    let (status, body) = call(&app, "GET", "/api/messages/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = call(
        &app,
        "GET",
        "/api/communication-graph",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(body["edges"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cross_tenant_access_is_not_found() {
    let (state, app) = setup().await;
    let other = token(&state, OTHER_TENANT);

    let (status, _) = call(
        &app,
        "GET",
        "/api/agents/agent-a/messages",
        Some(&other),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/agents/agent-x/messages",
        Some(&other),
        Some(json!({ "recipientId": "agent-a", "type": "notification" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "PUT",
        "/api/agents/agent-a/allowlist",
        Some(&other),
        Some(json!({ "entries": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_query_is_bad_request() {
    let (state, app) = setup().await;
    let token = token(&state, TENANT);

    let (status, _) = call(
        &app,
        "GET",
        "/api/messages?cursor=does-not-exist",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_workflow_trigger_runs_to_completion() {
    let (state, app) = setup().await;
    let token = token(&state, TENANT);
    allow_both(&app, &token, "agent-a", &["agent-b", "agent-c"]).await;

    let (status, body) = call(&app, "GET", "/api/workflows/templates", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, body) = call(
        &app,
        "POST",
        "/api/workflows/templates/system-status-broadcast/trigger",
        Some(&token),
        Some(json!({ "agentIds": ["agent-a", "agent-b", "agent-c"], "inputData": { "note": "hi" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    let instance_id = body["id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/workflows/instances/{}", instance_id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        last = body;
        if last["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last["status"], "completed");
    assert_eq!(
        last["stepLogs"][0]["messageIds"].as_array().unwrap().len(),
        2
    );

    let (status, body) = call(
        &app,
        "GET",
        "/api/workflows/instances?status=completed",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let other = token_for_other(&state);
    let (status, _) = call(
        &app,
        "GET",
        &format!("/api/workflows/instances/{}", instance_id),
        Some(&other),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn token_for_other(state: &AppState) -> String {
    token(state, OTHER_TENANT)
}

#[tokio::test]
async fn test_workflow_validation_errors() {
    let (state, app) = setup().await;
    let token = token(&state, TENANT);

    let (status, _) = call(
        &app,
        "POST",
        "/api/workflows/templates/system-status-broadcast/trigger",
        Some(&token),
        Some(json!({ "agentIds": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/api/workflows/templates/no-such-template/trigger",
        Some(&token),
        Some(json!({ "agentIds": ["agent-a", "agent-b"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        "POST",
        "/api/workflows/templates",
        Some(&token),
        Some(json!({
            "id": "handoff",
            "name": "handoff",
            "label": "Handoff",
            "steps": [{ "name": "handoff", "type": "task_handoff", "timeoutMs": 1000 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tenantId"], TENANT);
    assert_eq!(body["isSystem"], false);

    let (status, _) = call(
        &app,
        "POST",
        "/api/workflows/templates",
        Some(&token),
        Some(json!({ "id": "empty", "name": "empty", "label": "Empty", "steps": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_socket_without_token_is_rejected_before_upgrade() {
    let (_state, app) = setup().await;
    let request = Request::builder()
        .uri("/api/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_socket_catch_up_and_live_events() {
    let state = create_app_state(&test_config()).await.unwrap();
    for id in ["agent-a", "agent-b"] {
        state
            .agent_store
            .save(&Agent::new(id.to_string(), TENANT.to_string(), id.to_string(), None))
            .await
            .unwrap();
    }
    state
        .allowlist
        .update_allowlist(
            "agent-a",
            vec![serde_json::from_value(json!({ "allowedAgentId": "agent-b" })).unwrap()],
            TENANT,
            "user-1",
        )
        .await
        .unwrap();
    let sent = state
        .messaging
        .send_message(
            "agent-a",
            serde_json::from_value(json!({ "recipientId": "agent-b", "type": "notification" }))
                .unwrap(),
            TENANT,
            "user-1",
        )
        .await
        .unwrap();

    // Settle the first message so any later frame about it can only be a replay.
    let settle = async {
        loop {
            let stored = state.message_store.get(&sent.id).await.unwrap().unwrap();
            if stored.status == MessageStatus::Delivered {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), settle)
        .await
        .unwrap();

    let token = token(&state, TENANT);
    let addr = start_server_with_state(test_config(), state.clone())
        .await
        .unwrap();

    // A second client of the same tenant that never asks for catch-up.
    let (mut observer, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/api/ws?token={}", addr, token))
            .await
            .unwrap();
    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/api/ws?token={}", addr, token))
            .await
            .unwrap();

    let since = (chrono::Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
    socket
        .send(WsMessage::Text(
            json!({ "type": "catch-up", "since": since }).to_string(),
        ))
        .await
        .unwrap();

    // The delivery job may land before or after the replay, so skip live
    // events until the replay frames arrive.
    let mut replayed = Vec::new();
    loop {
        let frame = next_json(&mut socket).await;
        if frame["type"] == "catch-up-complete" {
            assert_eq!(frame["count"], 1);
            break;
        }
        replayed.push(frame);
    }
    assert!(replayed
        .iter()
        .any(|f| f["message"]["id"] == sent.id.as_str()));

    let (status, body) = {
        let app = build_router(state.clone());
        call(
            &app,
            "POST",
            "/api/agents/agent-b/messages",
            Some(&token),
            Some(json!({ "recipientId": "agent-a", "type": "status_update" })),
        )
        .await
    };
    assert_eq!(status, StatusCode::CREATED);
    let live_id = body["id"].as_str().unwrap().to_string();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let frame = next_json(&mut socket).await;
        if frame["message"]["id"] == live_id.as_str() {
            seen.push(frame["type"].as_str().unwrap().to_string());
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["message_delivered", "message_sent"]);

    // The observer gets the same live events but none of the replay.
    let mut observed = Vec::new();
    while observed.len() < 2 {
        let frame = next_json(&mut observer).await;
        assert_ne!(frame["type"], "catch-up-complete");
        assert_ne!(frame["message"]["id"], sent.id.as_str(), "{}", frame);
        if frame["message"]["id"] == live_id.as_str() {
            observed.push(frame["type"].as_str().unwrap().to_string());
        }
    }
    observed.sort();
    assert_eq!(observed, seen);

    socket
        .send(WsMessage::Text("{\"type\":\"nope\"}".to_string()))
        .await
        .unwrap();
    loop {
        let frame = next_json(&mut socket).await;
        if frame["type"] == "error" {
            break;
        }
    }
}
