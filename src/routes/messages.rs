//! Inbound protocol messages
//!
//! Accepts a JSON wire envelope, validates it, and hands it to the agent's
//! message bus. Delivery is asynchronous: `202 Accepted` means queued.

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;

use crate::error::{AppError, Result, RuntimeError};
use crate::protocol::codec;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(accept_message))
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub to: String,
    pub performative: String,
    pub dialogue_reference: (String, String),
    pub message_id: u64,
}

async fn accept_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AcceptedResponse>)> {
    let envelope = codec::decode(&body)?;

    let config = state.config();
    let known = [
        config.connector.connection_id.as_str(),
        config.uploader.agent_id.as_str(),
    ];
    if !known.contains(&envelope.to.as_str()) {
        return Err(AppError::Runtime(RuntimeError::UnknownRecipient(envelope.to)));
    }

    let reference = envelope.message.dialogue_reference();
    let response = AcceptedResponse {
        status: "accepted",
        to: envelope.to.clone(),
        performative: envelope.performative().to_string(),
        dialogue_reference: (reference.0.clone(), reference.1.clone()),
        message_id: envelope.message.message_id(),
    };

    state.outbox().send(envelope)?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
