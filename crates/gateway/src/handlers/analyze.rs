//! Ad-hoc text analysis handler
//!
//! Runs the recognition engine synchronously over caller-supplied text.
//! Only request-shape problems are surfaced as errors; capability
//! failures degrade to an empty mention list.

use crate::services::recognition::Mention;
use crate::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tacforge_common::errors::{AppError, Result};
use tracing::instrument;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub mentions: Vec<Mention>,
}

#[instrument(skip(state, payload))]
pub async fn analyze_text(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>> {
    if payload.text.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Text to analyze is required".to_string(),
        ));
    }

    let mentions = state.recognition.recognize(&payload.text).await;
    Ok(Json(AnalyzeResponse { mentions }))
}
