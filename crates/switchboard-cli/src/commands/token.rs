//! `switchboard token` - Mint a bearer token for local testing.

use switchboard_core::auth::TokenVerifier;

pub fn issue(
    jwt_secret: &str,
    tenant_id: &str,
    actor_id: &str,
    ttl_hours: i64,
) -> Result<serde_json::Value, String> {
    if ttl_hours <= 0 {
        return Err("--ttl-hours must be positive".to_string());
    }
    let token = TokenVerifier::new(jwt_secret)
        .issue(actor_id, tenant_id, chrono::Duration::hours(ttl_hours))
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "token": token,
        "tenantId": tenant_id,
        "actorId": actor_id,
        "expiresInHours": ttl_hours,
    }))
}
