//! API routes

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{GenerationRequest, GenerationResponse};
use crate::error::RelayError;
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: format!(
            "Bedrock relay {} is running with {}",
            env!("CARGO_PKG_VERSION"),
            state.config.model_id
        ),
    })
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, RelayError> {
    let Json(request) = payload.map_err(|e| RelayError::MalformedRequest(e.body_text()))?;

    let span = tracing::info_span!("generate", request_id = %Uuid::new_v4());
    let response = state
        .chat_engine
        .generate(request)
        .instrument(span)
        .await?;

    Ok(Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health).post(generate))
}
