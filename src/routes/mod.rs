//! HTTP routes for the file storage agent

pub mod health;
pub mod messages;
pub mod results;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/api/v1/results", results::router())
        .nest("/api/v1/messages", messages::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::registry::ResultRegistry;
    use crate::runtime::{channel, AgentStatus};

    async fn health(status: AgentStatus) -> (StatusCode, serde_json::Value) {
        let (outbox, _inbox) = channel();
        let state = AppState::new(
            Config::default(),
            ResultRegistry::new(),
            outbox,
            watch::channel(status).1,
        );

        let response = app(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let code = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (code, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (code, body) = health(AgentStatus::Running).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["agent"], "running");
        assert_eq!(body["connection_id"], "connection/storage");
    }

    #[tokio::test]
    async fn test_health_reports_failed_agent() {
        let (code, body) = health(AgentStatus::Failed("Access denied".to_string())).await;

        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["agent"], "failed");
        assert_eq!(body["agent_error"], "Access denied");
    }
}
