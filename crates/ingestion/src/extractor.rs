//! Tactical task extraction engine
//!
//! Per source page: asks the generative capability to enumerate the
//! tactical tasks on the page, validates each candidate, embeds its
//! definition, associates an extracted figure image when one is
//! available, and upserts the result into the knowledge store. Failures
//! are page-local: a bad reply, a rejected candidate, or a store error
//! never aborts the rest of the run.

use crate::images::ImageStore;
use crate::pdf::PageUnit;
use std::sync::Arc;
use tacforge_common::db::NewTaskRecord;
use tacforge_common::genai::{parse_json_array, Candidate, TextGenerator};
use tacforge_common::metrics::METRICS_PREFIX;
use tacforge_common::store::KnowledgeStore;
use tacforge_common::{EmbedTask, EmbeddingGenerator};
use tracing::{info, instrument, warn};

/// A structurally valid extraction candidate
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCandidate {
    pub name: String,
    pub definition: String,
    pub figure_references: Vec<String>,
    pub document_page_number: String,
}

pub struct TaskExtractor {
    generator: Arc<dyn TextGenerator>,
    embedder: EmbeddingGenerator,
    store: Arc<dyn KnowledgeStore>,
    images: ImageStore,
    source_reference: String,
}

impl TaskExtractor {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: EmbeddingGenerator,
        store: Arc<dyn KnowledgeStore>,
        images: ImageStore,
        source_reference: String,
    ) -> Self {
        Self {
            generator,
            embedder,
            store,
            images,
            source_reference,
        }
    }

    /// Process one page, returning the number of tasks upserted.
    #[instrument(skip(self, unit), fields(page = unit.number))]
    pub async fn process_page(&self, unit: &PageUnit) -> usize {
        if unit.text.trim().is_empty() {
            info!("Page has no text, skipping");
            return 0;
        }

        let prompt = extraction_prompt(&unit.text, unit.number);
        let reply = match self.generator.generate(&prompt).await {
            Ok(reply) => reply,
            Err(kind) => {
                warn!(error = %kind, "Extraction call failed for page");
                metrics::counter!(format!("{}_extraction_failures_total", METRICS_PREFIX))
                    .increment(1);
                return 0;
            }
        };

        let items = match parse_json_array(&reply) {
            Ok(items) => items,
            Err(kind) => {
                warn!(error = %kind, "Unparseable extraction reply for page");
                metrics::counter!(format!("{}_extraction_failures_total", METRICS_PREFIX))
                    .increment(1);
                return 0;
            }
        };

        let mut stored = 0;
        for item in &items {
            let candidate = match validate_task(item) {
                Candidate::Valid(candidate) => candidate,
                Candidate::Rejected { reason } => {
                    warn!(%reason, "Dropping task candidate");
                    metrics::counter!(format!(
                        "{}_extraction_candidates_rejected_total",
                        METRICS_PREFIX
                    ))
                    .increment(1);
                    continue;
                }
            };

            let embedding = self
                .embedder
                .embed(&candidate.definition, EmbedTask::Document)
                .await;

            let image_path = candidate
                .figure_references
                .first()
                .and_then(|figure_ref| self.images.save_first(unit, figure_ref));

            let record = NewTaskRecord {
                name: candidate.name.to_uppercase(),
                definition: candidate.definition,
                page_number: candidate.document_page_number,
                source_reference: self.source_reference.clone(),
                related_figures: candidate.figure_references,
                image_path,
                embedding,
            };

            match self.store.upsert(&record).await {
                Ok(()) => {
                    info!(task = %record.name, page_label = %record.page_number, "Task stored");
                    metrics::counter!(format!("{}_tasks_extracted_total", METRICS_PREFIX))
                        .increment(1);
                    stored += 1;
                }
                Err(e) => {
                    warn!(task = %record.name, error = %e, "Failed to store task, skipping");
                }
            }
        }

        stored
    }
}

/// Validate one raw reply element into a task candidate. Name,
/// definition, and document page label are required; figure references
/// default to an empty list.
fn validate_task(value: &serde_json::Value) -> Candidate<TaskCandidate> {
    let Some(object) = value.as_object() else {
        return Candidate::rejected("candidate is not an object");
    };

    let Some(name) = object
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
    else {
        return Candidate::rejected("missing name");
    };

    let Some(definition) = object
        .get("definition")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
    else {
        return Candidate::rejected("missing definition");
    };

    let document_page_number = match object.get("document_page_number") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Candidate::rejected("missing document_page_number"),
    };

    let figure_references = object
        .get("figure_references")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Candidate::Valid(TaskCandidate {
        name: name.to_string(),
        definition: definition.to_string(),
        figure_references,
        document_page_number,
    })
}

/// Build the per-page extraction prompt
fn extraction_prompt(page_text: &str, physical_page: u32) -> String {
    format!(
        r#"You are an expert military doctrine analyst. From the following text, extracted from a page of a military field manual, please identify all distinct tactical tasks.

This text is from physical PDF page number: {physical_page}.

For each tactical task, provide:
1. Its name (e.g., "SEIZE", "OCCUPY").
2. Its full definition.
3. A list of any explicit figure references (e.g., ["Figure B-1", "Figure B-23"]) mentioned in its definition or closely associated text. If none, use an empty list.
4. The document's internal page number string as it appears on the page or is most relevant to this task (e.g., "B-11", "A-5"). If not clearly discernible for a specific task, use the most prominent page number on the physical page.

Input Text:
---
{page_text}
---

Output the results as a JSON list of objects. Each object in the list should represent a single tactical task and have the following keys:
- "name": The tactical task name.
- "definition": The full definition of the task.
- "figure_references": A list of strings for figure references.
- "document_page_number": The extracted page number string from the document (e.g., "B-11").

If no tactical tasks are found on this page, return an empty JSON list: []."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tacforge_common::config::ImagesConfig;
    use tacforge_common::embeddings::MockEmbedder;
    use tacforge_common::genai::MockGenerator;
    use tacforge_common::store::MemoryStore;
    use tacforge_common::EMBEDDING_DIM;

    fn test_extractor(reply: &str, store: Arc<MemoryStore>) -> TaskExtractor {
        TaskExtractor::new(
            Arc::new(MockGenerator::new(reply)),
            EmbeddingGenerator::new(Arc::new(MockEmbedder::new(8)), EMBEDDING_DIM),
            store,
            ImageStore::new(&ImagesConfig {
                output_dir: "target/test-task-images".to_string(),
                public_prefix: "public/task_images".to_string(),
            }),
            "FM 3-90".to_string(),
        )
    }

    fn page(text: &str) -> PageUnit {
        PageUnit {
            number: 411,
            text: text.to_string(),
            images: vec![],
        }
    }

    #[tokio::test]
    async fn test_extracts_and_stores_task_with_normalized_embedding() {
        let store = Arc::new(MemoryStore::new());
        let extractor = test_extractor(
            r#"[{"name":"seize","definition":"To take possession of a designated area.","figure_references":[],"document_page_number":"B-11"}]"#,
            store.clone(),
        );

        let stored = extractor
            .process_page(&page("SEIZE. To take possession of a designated area..."))
            .await;

        assert_eq!(stored, 1);
        let record = store.get_by_name("SEIZE").await.unwrap().unwrap();
        assert_eq!(record.page_number, "B-11");
        assert_eq!(record.embedding.unwrap().len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn test_non_json_reply_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let extractor = test_extractor("not json", store.clone());

        let stored = extractor.process_page(&page("Some page text")).await;

        assert_eq!(stored, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_candidates_dropped_without_aborting_page() {
        let store = Arc::new(MemoryStore::new());
        let extractor = test_extractor(
            r#"[
                {"definition":"No name here.","document_page_number":"B-11"},
                {"name":"OCCUPY","document_page_number":"B-12"},
                {"name":"SEIZE","definition":"To take possession.","figure_references":[],"document_page_number":"B-11"}
            ]"#,
            store.clone(),
        );

        let stored = extractor.process_page(&page("Some page text")).await;

        assert_eq!(stored, 1);
        assert!(store.get_by_name("SEIZE").await.unwrap().is_some());
        assert!(store.get_by_name("OCCUPY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_page_skips_generation() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(MockGenerator::new("[]"));
        let extractor = TaskExtractor::new(
            generator.clone(),
            EmbeddingGenerator::new(Arc::new(MockEmbedder::new(8)), EMBEDDING_DIM),
            store,
            ImageStore::new(&ImagesConfig {
                output_dir: "target/test-task-images".to_string(),
                public_prefix: "public/task_images".to_string(),
            }),
            "FM 3-90".to_string(),
        );

        assert_eq!(extractor.process_page(&page("   ")).await, 0);
        assert_eq!(generator.call_count(), 0);
    }

    #[test]
    fn test_validate_task_requires_core_fields() {
        assert!(matches!(
            validate_task(&json!({"name":"SEIZE","definition":"..."})),
            Candidate::Rejected { .. }
        ));
        assert!(matches!(
            validate_task(&json!({"name":"","definition":"...","document_page_number":"B-1"})),
            Candidate::Rejected { .. }
        ));
        assert!(matches!(
            validate_task(&json!("SEIZE")),
            Candidate::Rejected { .. }
        ));
    }

    #[test]
    fn test_validate_task_defaults_missing_figures_to_empty() {
        let candidate = validate_task(&json!({
            "name": "SEIZE",
            "definition": "To take possession.",
            "document_page_number": "B-11"
        }));
        match candidate {
            Candidate::Valid(task) => assert!(task.figure_references.is_empty()),
            Candidate::Rejected { reason } => panic!("unexpected rejection: {}", reason),
        }
    }

    #[test]
    fn test_validate_task_accepts_numeric_page_label() {
        let candidate = validate_task(&json!({
            "name": "SEIZE",
            "definition": "To take possession.",
            "document_page_number": 411
        }));
        match candidate {
            Candidate::Valid(task) => assert_eq!(task.document_page_number, "411"),
            Candidate::Rejected { reason } => panic!("unexpected rejection: {}", reason),
        }
    }
}
