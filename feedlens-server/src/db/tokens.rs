//! API tokens
//!
//! Issued from the command line (`feedlens-server --add-token OWNER`) and
//! resolved on every protected request.

use feedlens_common::{time, Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Prefix of generated tokens
const TOKEN_PREFIX: &str = "flk_";

/// Resolve a bearer token to its owner
pub async fn owner_for_token(pool: &SqlitePool, token: &str) -> Result<Option<String>> {
    let owner = sqlx::query_scalar::<_, String>("SELECT owner_id FROM api_tokens WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    Ok(owner)
}

/// Register a token for an owner (replaces an existing entry for the token)
pub async fn insert_token(
    pool: &SqlitePool,
    token: &str,
    owner_id: &str,
    label: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO api_tokens (token, owner_id, label, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(token) DO UPDATE SET
            owner_id = excluded.owner_id,
            label = excluded.label
        "#,
    )
    .bind(token)
    .bind(owner_id)
    .bind(label)
    .bind(time::to_db_string(&time::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Generate and store a fresh token for `owner_id`
///
/// The token is 64 hex characters from two v4 UUIDs behind a short prefix,
/// well above the webhook minimum length.
pub async fn issue_token(pool: &SqlitePool, owner_id: &str, label: Option<&str>) -> Result<String> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(Error::InvalidInput("Token owner must not be empty".to_string()));
    }

    let token = format!(
        "{}{}{}",
        TOKEN_PREFIX,
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    insert_token(pool, &token, owner_id, label).await?;
    Ok(token)
}
