// [[PAWS]]/apps/inference-server/src/security.rs
// Purpose: Bearer token guard for the /api routes.
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use std::sync::Arc;

use crate::server::AppState;

/// Proof that the request carried the configured API token.
pub struct Authorized;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            Some(token) if constant_time_eq(token.as_bytes(), state.api_token.as_bytes()) => {
                Ok(Authorized)
            }
            Some(_) => {
                tracing::warn!("Rejected request with invalid bearer token");
                Err(StatusCode::UNAUTHORIZED)
            }
            None => Err(StatusCode::UNAUTHORIZED),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
