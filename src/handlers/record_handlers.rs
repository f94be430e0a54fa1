//! Read-only query endpoints over the metadata table.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::record::MetadataRecord,
    services::metadata_store::MetadataStore,
};
use axum::{
    Json,
    extract::{Path, State},
};

/// `GET /records/{*id}`: the id is a read set ARN and may contain `/`.
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MetadataRecord>, AppError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("record `{}` not found", id)))
}

/// `GET /stores/{store_id}/records`
pub async fn list_store_records(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> Result<Json<Vec<MetadataRecord>>, AppError> {
    Ok(Json(state.store.list_by_container(&store_id).await?))
}
