//! Request authentication extractors.
//!
//! HTTP routes read `Authorization: Bearer <token>`. The realtime socket
//! additionally accepts `?token=` since browsers cannot set headers on a
//! WebSocket handshake.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;

use switchboard_core::auth::TenantContext;
use switchboard_core::state::AppState;
use switchboard_core::ServerError;

/// Verified tenant and actor of an HTTP request.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantContext);

impl FromRequestParts<AppState> for Tenant {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ServerError::Unauthorized("Missing bearer token".to_string()))?;
        state.token_verifier.verify(token).map(Tenant)
    }
}

/// Verified identity of a socket handshake.
#[derive(Debug, Clone)]
pub struct SocketAuth(pub TenantContext);

impl FromRequestParts<AppState> for SocketAuth {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts) {
            Some(token) => token.to_string(),
            None => query_token(parts)
                .ok_or_else(|| ServerError::Unauthorized("Missing token".to_string()))?,
        };
        state.token_verifier.verify(&token).map(SocketAuth)
    }
}

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn query_token(parts: &Parts) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(&parts.uri).ok()?;
    query.token.filter(|t| !t.is_empty())
}
