//! Database access for feedlens-server
//!
//! One SQLite file holds feedback, clusters, API tokens and the waitlist.
//! Tables are created on startup and every statement is idempotent.

pub mod clusters;
pub mod feedback;
pub mod tokens;

use feedlens_common::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database and ensure the schema exists
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    create_feedback_table(pool).await?;
    create_clusters_table(pool).await?;
    create_api_tokens_table(pool).await?;
    create_waitlist_table(pool).await?;
    Ok(())
}

async fn create_feedback_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            user_segment TEXT,
            product_area TEXT,
            priority TEXT NOT NULL CHECK (priority IN ('low', 'medium', 'high', 'critical')),
            priority_rank INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            analysis_state TEXT NOT NULL DEFAULT 'pending'
                CHECK (analysis_state IN ('pending', 'analyzed', 'failed')),
            sentiment REAL,
            urgency REAL,
            business_impact INTEGER,
            theme TEXT,
            insights TEXT,
            analysis_origin TEXT,
            analyzed_at TEXT,
            failure_reason TEXT,
            embedding BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_feedback_owner_created ON feedback(owner_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_feedback_owner_state ON feedback(owner_id, analysis_state)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_clusters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            member_ids TEXT NOT NULL,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_clusters_owner ON clusters(owner_id, position)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_api_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_tokens (
            token TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            label TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_waitlist_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS waitlist (
            email TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
