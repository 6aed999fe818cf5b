//! API route definitions.

use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::error::ApiError;
use super::state::AppState;
use crate::config::AppConfig;
use crate::detect::{self, ScoredBatch};
use crate::ingest;
use crate::store;

/// File name offered for the results download.
pub const DOWNLOAD_FILE_NAME: &str = "anomaly_results.csv";

/// Multipart field carrying the CSV upload.
const UPLOAD_FIELD: &str = "file";

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/upload_csv", post(upload_csv))
        .route("/download_csv", get(download_csv))
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": state.results.len().await,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    }))
}

/// Submit: parse, score, store under the session, and return the rows.
async fn upload_csv(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let session = store::session_key(query.session.as_deref());
    let data = read_upload(&mut multipart).await?;

    let config = state.config.clone();
    let scored = tokio::task::spawn_blocking(move || score_upload(&data, &config))
        .await
        .map_err(|e| ApiError::Processing(e.to_string()))??;

    let results = scored.to_json_records();
    let submission_id = state.results.put(&session, scored).await;
    info!(%session, %submission_id, rows = results.len(), "stored scored results");

    Ok(Json(json!({
        "session": session,
        "submission_id": submission_id,
        "results": results,
    })))
}

/// Retrieve: the session's latest result set as a CSV attachment.
async fn download_csv(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = store::session_key(query.session.as_deref());
    let stored = state
        .results
        .get(&session)
        .await
        .ok_or(ApiError::NoResultAvailable)?;

    let body = stored.batch.to_csv()?;
    info!(%session, submission_id = %stored.submission_id, bytes = body.len(), "serving results download");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILE_NAME}\""),
            ),
        ],
        body,
    ))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Multipart(e.to_string()))?;
        info!(?file_name, ?content_type, bytes = data.len(), "received upload");
        return Ok(data);
    }
    Err(ApiError::NoFile)
}

fn score_upload(data: &[u8], config: &AppConfig) -> Result<ScoredBatch, ApiError> {
    let batch = ingest::parse_csv(data)?;
    Ok(detect::detect_anomalies(
        &batch,
        &config.features,
        &config.model,
    )?)
}
