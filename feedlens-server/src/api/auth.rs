//! Bearer-token authentication for protected routes
//!
//! The token is looked up in `api_tokens`; the owner it maps to is attached
//! to the request as an `Owner` extension. Unknown or missing tokens get 401
//! before any handler runs.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::ingest::webhook::bearer_token;
use crate::AppState;

/// Account every request is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolve a token to its owner or fail with 401
pub async fn resolve_owner(pool: &SqlitePool, token: &str) -> ApiResult<Owner> {
    match db::tokens::owner_for_token(pool, token).await? {
        Some(owner_id) => Ok(Owner(owner_id)),
        None => {
            debug!("Rejected unknown API token");
            Err(ApiError::Unauthorized("Invalid API token".to_string()))
        }
    }
}

/// Authentication middleware
///
/// Applied to protected routes only; `/health`, the waitlist and the webhook
/// do not use it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let owner = resolve_owner(&state.db, &token).await?;
    request.extensions_mut().insert(owner);

    Ok(next.run(request).await)
}
