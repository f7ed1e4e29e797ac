//! Cluster listing and rebuild

use axum::{extract::State, Extension, Json};
use feedlens_common::models::Cluster;
use serde::Serialize;

use super::Owner;
use crate::clustering;
use crate::db;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ClustersResponse {
    pub clusters: Vec<Cluster>,
}

/// GET /api/clusters
pub async fn list_clusters(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> ApiResult<Json<ClustersResponse>> {
    let clusters = db::clusters::list_clusters(&state.db, owner.as_str()).await?;
    Ok(Json(ClustersResponse { clusters }))
}

/// POST /api/clusters/rebuild
///
/// Always succeeds unless the store fails; an unavailable or confused model
/// produces an empty set.
pub async fn rebuild_clusters(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
) -> ApiResult<Json<ClustersResponse>> {
    let clusters = clustering::rebuild_clusters(
        &state.db,
        &state.analyzer,
        owner.as_str(),
        state.limits.cluster_window,
    )
    .await?;
    Ok(Json(ClustersResponse { clusters }))
}
