//! Cluster persistence
//!
//! Clusters are derived data: a rebuild replaces all of an owner's clusters
//! in a single transaction.

use feedlens_common::models::Cluster;
use feedlens_common::{time, Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Replace every cluster of `owner_id` with `clusters`
pub async fn replace_clusters(pool: &SqlitePool, owner_id: &str, clusters: &[Cluster]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM clusters WHERE owner_id = ?")
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

    for (position, cluster) in clusters.iter().enumerate() {
        let member_ids = serde_json::to_string(&cluster.member_ids)
            .map_err(|e| Error::Internal(format!("Serialize cluster members failed: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO clusters (id, owner_id, title, member_ids, position, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cluster.id.to_string())
        .bind(owner_id)
        .bind(&cluster.title)
        .bind(member_ids)
        .bind(position as i64)
        .bind(time::to_db_string(&cluster.created_at))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// The owner's clusters in the order they were produced
pub async fn list_clusters(pool: &SqlitePool, owner_id: &str) -> Result<Vec<Cluster>> {
    let rows = sqlx::query(
        "SELECT id, title, member_ids, created_at FROM clusters WHERE owner_id = ? ORDER BY position",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            let member_ids: String = row.try_get("member_ids")?;
            let created_at: String = row.try_get("created_at")?;

            Ok(Cluster {
                id: Uuid::parse_str(&id)
                    .map_err(|e| Error::Internal(format!("Invalid cluster id '{}': {}", id, e)))?,
                owner_id: owner_id.to_string(),
                title: row.try_get("title")?,
                member_ids: serde_json::from_str(&member_ids)
                    .map_err(|e| Error::Internal(format!("Invalid cluster members: {}", e)))?,
                created_at: time::from_db_string(&created_at)?,
            })
        })
        .collect()
}
