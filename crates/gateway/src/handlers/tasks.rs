//! Tactical task read handlers

use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tacforge_common::errors::{AppError, Result};
use tacforge_common::not_found;
use tacforge_common::{EmbedTask, KnowledgeStore, TaskDetails};
use tracing::instrument;

#[derive(Serialize)]
pub struct ListTasksResponse {
    pub names: Vec<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct TaskMatch {
    pub task: TaskDetails,
    pub distance: f64,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<TaskMatch>,
}

/// List all known task names
#[instrument(skip(state))]
pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<ListTasksResponse>> {
    let names = state.store.list_names().await?;
    Ok(Json(ListTasksResponse { names }))
}

/// Fetch one task by name. The name is normalized before lookup, so
/// `/v1/tasks/seize` and `/v1/tasks/SEIZE` are equivalent.
#[instrument(skip(state))]
pub async fn get_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TaskDetails>> {
    let normalized = name.trim().to_uppercase();
    let record = state
        .store
        .get_by_name(&normalized)
        .await?
        .ok_or_else(|| not_found!("tactical_task", normalized))?;

    Ok(Json(TaskDetails::from(record)))
}

/// Nearest-neighbor lookup: embed the query text and rank stored tasks
/// by ascending cosine distance.
#[instrument(skip(state, params))]
pub async fn search_tasks(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    if params.q.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Query string cannot be empty".to_string(),
        ));
    }

    let limit = params.limit.unwrap_or(5).min(25);
    let embedding = state.embedder.embed(&params.q, EmbedTask::Query).await;
    let matches = state.store.nearest(&embedding, limit).await?;

    Ok(Json(SearchResponse {
        results: matches
            .into_iter()
            .map(|(record, distance)| TaskMatch {
                task: TaskDetails::from(record),
                distance,
            })
            .collect(),
    }))
}
