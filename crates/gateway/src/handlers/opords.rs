//! OPORD management handlers
//!
//! Creating or updating an OPORD enqueues a background analysis job after
//! the write commits; callers get their response immediately and tolerate
//! the annotation field being stale or absent until the worker catches up.

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tacforge_common::db::Opord;
use tacforge_common::errors::{AppError, Result};
use tacforge_common::not_found;
use tacforge_common::queue::AnalysisJob;
use tracing::instrument;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateOpordRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateOpordRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct OpordResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// Annotation blob from the latest completed background analysis:
    /// a JSON array of mentions, an error-marker object, or null when
    /// no run has finished yet.
    pub analysis_results: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Opord> for OpordResponse {
    fn from(opord: Opord) -> Self {
        let analysis_results = opord
            .analysis_results
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Self {
            id: opord.id,
            title: opord.title,
            content: opord.content,
            analysis_results,
            created_at: opord.created_at.to_rfc3339(),
            updated_at: opord.updated_at.to_rfc3339(),
        }
    }
}

/// Create an OPORD and trigger background analysis
#[instrument(skip(state, payload))]
pub async fn create_opord(
    State(state): State<AppState>,
    Json(payload): Json<CreateOpordRequest>,
) -> Result<(StatusCode, Json<OpordResponse>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::ValidationError("Title is required".to_string()));
    }

    let opord = state
        .repo
        .create_opord(payload.title, payload.content)
        .await?;

    tracing::info!(opord_id = %opord.id, "OPORD created");
    state.queue.enqueue(AnalysisJob { opord_id: opord.id });

    Ok((StatusCode::CREATED, Json(OpordResponse::from(opord))))
}

/// Fetch an OPORD, including its latest annotations
#[instrument(skip(state))]
pub async fn get_opord(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OpordResponse>> {
    let opord = state
        .repo
        .find_opord(id)
        .await?
        .ok_or_else(|| not_found!("opord", id))?;

    Ok(Json(OpordResponse::from(opord)))
}

/// Replace an OPORD's content and trigger re-analysis
#[instrument(skip(state, payload))]
pub async fn update_opord(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOpordRequest>,
) -> Result<Json<OpordResponse>> {
    let opord = state
        .repo
        .update_opord_content(id, payload.content)
        .await?
        .ok_or_else(|| not_found!("opord", id))?;

    tracing::info!(opord_id = %opord.id, "OPORD content updated");
    state.queue.enqueue(AnalysisJob { opord_id: opord.id });

    Ok(Json(OpordResponse::from(opord)))
}
