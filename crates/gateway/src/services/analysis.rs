//! Background OPORD analysis worker
//!
//! Drains the in-process analysis queue: for each job it fetches the
//! OPORD, runs the recognition engine over its content, and persists the
//! resulting annotation list back onto the document. Runs detached from
//! the requests that enqueue jobs; successive jobs for one OPORD are
//! last-write-wins on the annotation field.

use crate::services::recognition::RecognitionService;
use std::sync::Arc;
use tacforge_common::db::Repository;
use tacforge_common::metrics::METRICS_PREFIX;
use tacforge_common::queue::{AnalysisJob, AnalysisReceiver};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Worker loop. Ends on shutdown signal or when the queue closes.
pub async fn run_worker(
    mut rx: AnalysisReceiver,
    recognition: Arc<RecognitionService>,
    repo: Repository,
) {
    info!("Analysis worker started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping analysis worker");
                break;
            }
            job = rx.recv() => {
                match job {
                    Some(job) => process_job(&job, &recognition, &repo).await,
                    None => {
                        info!("Analysis queue closed, stopping worker");
                        break;
                    }
                }
            }
        }
    }
}

/// Process a single analysis job. Never propagates an error: everything
/// that can go wrong is logged, and persistence failures are retried once.
#[instrument(skip(recognition, repo), fields(opord_id = %job.opord_id))]
pub(crate) async fn process_job(
    job: &AnalysisJob,
    recognition: &RecognitionService,
    repo: &Repository,
) {
    metrics::counter!(format!("{}_analysis_jobs_total", METRICS_PREFIX)).increment(1);

    let opord = match repo.find_opord(job.opord_id).await {
        Ok(Some(opord)) => opord,
        Ok(None) => {
            error!("OPORD not found for background analysis, skipping");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch OPORD for analysis");
            return;
        }
    };

    let payload = annotation_payload(&opord.content, recognition).await;
    persist_with_retry(repo, job.opord_id, payload).await;
}

/// Produce the annotation blob for an OPORD's content. Blank content
/// yields an empty list without invoking the recognition engine.
pub(crate) async fn annotation_payload(
    content: &str,
    recognition: &RecognitionService,
) -> String {
    if content.trim().is_empty() {
        info!("OPORD has no content, storing empty analysis results");
        return "[]".to_string();
    }

    let mentions = recognition.recognize(content).await;
    match serde_json::to_string(&mentions) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to serialize analysis results, storing error marker");
            serde_json::json!({
                "error": { "message": format!("analysis failed: {}", e) }
            })
            .to_string()
        }
    }
}

/// Persist the annotation blob, retrying exactly once on failure.
async fn persist_with_retry(repo: &Repository, opord_id: Uuid, payload: String) {
    if let Err(first) = repo.update_opord_analysis(opord_id, payload.clone()).await {
        warn!(error = %first, "Persisting analysis results failed, retrying once");
        if let Err(second) = repo.update_opord_analysis(opord_id, payload).await {
            metrics::counter!(format!("{}_analysis_persist_failures_total", METRICS_PREFIX))
                .increment(1);
            error!(error = %second, "Persisting analysis results failed again, giving up");
            return;
        }
    }
    info!("Stored analysis results");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacforge_common::db::NewTaskRecord;
    use tacforge_common::genai::MockGenerator;
    use tacforge_common::store::{KnowledgeStore, MemoryStore};

    #[tokio::test]
    async fn test_blank_content_skips_recognition() {
        let generator = Arc::new(MockGenerator::new("[]"));
        let store = Arc::new(MemoryStore::new());
        let recognition = RecognitionService::new(generator.clone(), store, false);

        let payload = annotation_payload("   ", &recognition).await;

        assert_eq!(payload, "[]");
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_content_with_mentions_serializes_list() {
        let generator = Arc::new(MockGenerator::new(
            r#"[{"task_name":"SEIZE","start_index":18,"end_index":23}]"#,
        ));
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(&NewTaskRecord {
                name: "SEIZE".to_string(),
                definition: "To take possession of a designated area.".to_string(),
                page_number: "B-11".to_string(),
                source_reference: "FM 3-90".to_string(),
                related_figures: vec![],
                image_path: None,
                embedding: vec![0.0; 4],
            })
            .await
            .unwrap();
        let recognition = RecognitionService::new(generator, store, false);

        let payload = annotation_payload("The platoon will SEIZE the bridge.", &recognition).await;

        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["task_name"], "SEIZE");
        assert_eq!(parsed[0]["details"]["page_number"], "B-11");
    }

    #[tokio::test]
    async fn test_unusable_reply_yields_empty_list_payload() {
        let generator = Arc::new(MockGenerator::new("not json"));
        let store = Arc::new(MemoryStore::new());
        let recognition = RecognitionService::new(generator, store, false);

        let payload = annotation_payload("Some order text.", &recognition).await;
        assert_eq!(payload, "[]");
    }
}
