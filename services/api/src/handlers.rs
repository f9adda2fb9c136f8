//! Axum Handlers for the REST API
//!
//! This module contains the logic for the server-mediated generate endpoint
//! and the settings endpoints. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tutor_core::image::ImageAttachment;
use tutor_core::message::HistoryEntry;
use tutor_core::provider::GenerateRequest;

use crate::{
    models::{ErrorResponse, GeneratePayload, GenerateResponse, Settings},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    /// A failure whose message is meant for the caller.
    Upstream(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Upstream(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let error = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { error }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Generate a tutor response with the server's own Gemini key.
#[utoipa::path(
    post,
    path = "/api/gemini",
    request_body = GeneratePayload,
    responses(
        (status = 200, description = "Generated text", body = GenerateResponse),
        (status = 400, description = "Prompt missing or image invalid", body = ErrorResponse),
        (status = 500, description = "Server key missing or provider failure", body = ErrorResponse)
    )
)]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GeneratePayload>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let prompt = payload
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Prompt required".to_string()))?;

    let api_key = state.config.require_gemini_key().map_err(|e| {
        warn!(error = %e, "Generate request without a server key");
        ApiError::Upstream("Server AI key missing".to_string())
    })?;

    let image = payload
        .image_base64
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(ImageAttachment::from_data_url)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let system_prompt = payload
        .system_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.system_prompt.as_ref().clone());

    let request = GenerateRequest {
        system_prompt,
        prompt: prompt.to_string(),
        image,
        history: payload.history.iter().map(HistoryEntry::from).collect(),
    };

    let text = state.proxy.generate(api_key, &request).await.map_err(|e| {
        error!(error = %e, "Server-mediated generation failed");
        ApiError::Upstream(e.to_string())
    })?;

    info!(chars = text.len(), "Server-mediated generation succeeded");
    Ok(Json(GenerateResponse { text }))
}

/// Read the persisted tutor settings.
#[utoipa::path(
    get,
    path = "/settings",
    responses(
        (status = 200, description = "Current settings", body = Settings)
    )
)]
pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.settings.current().into())
}

/// Replace the persisted tutor settings.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = Settings,
    responses(
        (status = 200, description = "Settings saved", body = Settings),
        (status = 500, description = "Settings could not be written", body = ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    let saved = state.settings.update(settings.into())?;
    info!(provider = %saved.provider, "Settings updated");
    Ok(Json(saved.into()))
}
