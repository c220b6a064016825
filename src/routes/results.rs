//! Collected download results

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::registry::{FailureRecord, RegisteredDownload};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_results))
        .route("/lookup", get(lookup_result))
        .route("/failures", get(list_failures))
}

#[derive(Debug, Serialize)]
pub struct DownloadSummary {
    pub access_url: String,
    pub sender: String,
    pub dialogue_reference: (String, String),
    pub message_id: u64,
    pub target: u64,
    pub size: usize,
    pub received_at: DateTime<Utc>,
}

impl From<&RegisteredDownload> for DownloadSummary {
    fn from(download: &RegisteredDownload) -> Self {
        let reference = download.message.dialogue_reference();
        Self {
            access_url: download.access_url().to_string(),
            sender: download.sender.clone(),
            dialogue_reference: (reference.0.clone(), reference.1.clone()),
            message_id: download.message.message_id(),
            target: download.message.target(),
            size: download.content().len(),
            received_at: download.received_at,
        }
    }
}

/// Single result including its content, base64 encoded
#[derive(Debug, Serialize)]
pub struct DownloadDetail {
    #[serde(flatten)]
    pub summary: DownloadSummary,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct FailureSummary {
    pub sender: String,
    pub error_code: String,
    pub error_msg: String,
    pub key: Option<String>,
    pub filename: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl From<FailureRecord> for FailureSummary {
    fn from(record: FailureRecord) -> Self {
        Self {
            sender: record.sender,
            error_code: record.error_code.to_string(),
            error_msg: record.error_msg,
            key: record.key,
            filename: record.filename,
            received_at: record.received_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub access_url: String,
}

/// List every registered download in arrival order
async fn list_results(State(state): State<AppState>) -> Json<Vec<DownloadSummary>> {
    let downloads = state.registry().list().await;
    Json(downloads.iter().map(DownloadSummary::from).collect())
}

/// Fetch one download by its access URL
async fn lookup_result(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<DownloadDetail>> {
    let download = state
        .registry()
        .get(&query.access_url)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No result for {}", query.access_url)))?;

    Ok(Json(DownloadDetail {
        summary: DownloadSummary::from(&download),
        content: STANDARD.encode(download.content()),
    }))
}

async fn list_failures(State(state): State<AppState>) -> Json<Vec<FailureSummary>> {
    let failures = state.registry().failures().await;
    Json(failures.into_iter().map(FailureSummary::from).collect())
}
