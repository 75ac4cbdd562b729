//! Bearer token verification.
//!
//! Identity is issued upstream; this module only checks an HS256 JWT and
//! turns its claims into the tenant/actor pair every operation is scoped by.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// JWT claims carried by API and socket tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Actor id
    pub sub: String,
    #[serde(rename = "tenantId", default)]
    pub tenant_id: Option<String>,
    pub exp: i64,
}

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub actor_id: String,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify signature and expiry, and require a non-empty tenant claim.
    pub fn verify(&self, token: &str) -> Result<TenantContext, ServerError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| ServerError::Unauthorized(format!("Invalid token: {}", e)))?;
        let claims = data.claims;
        let tenant_id = claims
            .tenant_id
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServerError::Unauthorized("Token has no tenant claim".to_string()))?;
        Ok(TenantContext {
            tenant_id,
            actor_id: claims.sub,
        })
    }

    /// Mint a token for local tooling and tests.
    pub fn issue(
        &self,
        actor_id: &str,
        tenant_id: &str,
        ttl: chrono::Duration,
    ) -> Result<String, ServerError> {
        let claims = Claims {
            sub: actor_id.to_string(),
            tenant_id: Some(tenant_id.to_string()),
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ServerError::Internal(format!("Failed to sign token: {}", e)))
    }
}
