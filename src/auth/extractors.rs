use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use uuid::Uuid;

use super::services::{JwtKeys, TokenKind};
use crate::state::AppState;

/// Extracts and validates the access JWT, returning the user ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".into()))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".into()))?;

        let claims = JwtKeys::from_ref(state)
            .verify(token)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid or expired token".into()))?;
        if claims.kind != TokenKind::Access {
            return Err((StatusCode::UNAUTHORIZED, "access token required".into()));
        }

        Ok(AuthUser(claims.sub))
    }
}
