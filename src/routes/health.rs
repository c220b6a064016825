//! Health check endpoint

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::runtime::AgentStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub agent_id: String,
    pub connection_id: String,
    pub agent: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_error: Option<String>,
}

/// Healthy only while the agent loop is running
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let config = state.config();
    let agent = state.agent_status();

    let (code, status) = match agent {
        AgentStatus::Running => (StatusCode::OK, "healthy"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            service: "file-storage-agent",
            agent_id: config.uploader.agent_id.clone(),
            connection_id: config.connector.connection_id.clone(),
            agent: agent.as_str(),
            agent_error: agent.error().map(str::to_string),
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
