//! Caller identity extraction.
//!
//! The hosted auth provider issues HS256 access tokens. Handlers receive
//! the verified identity as a request-scoped [`AuthContext`] argument;
//! requests without a valid token are rejected before the handler runs.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::AppState;

/// Claims in the provider's access token.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user id).
    pub sub: String,
    pub email: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

/// Verified caller identity for one request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!("Missing Authorization header"))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::AuthError(anyhow::anyhow!("Expected a Bearer token"))
        })?;

        // The provider sets an audience claim we do not pin; expiry is
        // still enforced.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(state.config.auth.jwt_secret.expose_secret().as_bytes()),
            &validation,
        )?;

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| {
            AppError::AuthError(anyhow::anyhow!("Token subject is not a user id"))
        })?;

        let span = tracing::Span::current();
        span.record("user_id", data.claims.sub.as_str());

        Ok(AuthContext {
            user_id,
            email: data.claims.email.unwrap_or_default(),
        })
    }
}
