use std::sync::Arc;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    http::StatusCode,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::api::ApiState;
use crate::error::{Error, Result};
use crate::types::timestamp::Timestamp;

/// Roles allowed to issue manual overrides.
const ADMIN_ROLES: [&str; 2] = ["admin", "operator"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Operator name
    pub exp: u64,     // Expiration time
    pub iat: u64,     // Issued at
    pub role: String,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.contains(&self.role.as_str())
    }
}

pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        JwtAuth {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, subject: &str, role: &str, duration_secs: u64) -> Result<String> {
        let now = Timestamp::now().as_millis() / 1_000;

        let claims = Claims {
            sub: subject.to_string(),
            exp: now + duration_secs,
            iat: now,
            role: role.to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::AuthenticationError(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::default(),
        ).map_err(|e| Error::AuthenticationError(e.to_string()))?;

        Ok(token_data.claims)
    }
}

/// Guards `/admin/*`. Without a configured secret every request passes.
pub async fn admin_auth_middleware(
    State(state): State<Arc<ApiState>>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let Some(auth) = &state.admin_auth else {
        return Ok(next.run(request).await);
    };

    // Extract token from "Bearer <token>"
    let token = request.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = auth.verify_token(token).map_err(|e| {
        warn!(error = %e, path = %request.uri().path(), "Rejected admin token");
        StatusCode::UNAUTHORIZED
    })?;

    if !claims.is_admin() {
        warn!(sub = %claims.sub, role = %claims.role, "Admin request without admin role");
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
