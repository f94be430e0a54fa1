//! Queue trigger endpoint: applies a batch of read set status-change events.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::event::{BatchResponse, QueueBatch},
};
use axum::{Json, extract::State};

/// `POST /events`
///
/// Returns 200 with the batch response when the batch is accepted. A batch
/// with failed messages returns 500 unless partial batch responses are
/// enabled, in which case the failed message ids are listed in
/// `batchItemFailures`.
pub async fn receive_events(
    State(state): State<AppState>,
    Json(batch): Json<QueueBatch>,
) -> Result<Json<BatchResponse>, AppError> {
    let response = state.reconciler.handle_batch(&batch).await?;
    Ok(Json(response))
}
