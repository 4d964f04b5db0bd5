//! Recognition engine
//!
//! Identifies tactical-task mentions in arbitrary text via the generative
//! capability, validates each candidate, resolves it against the knowledge
//! store by exact name, and enriches resolved mentions with the stored
//! record's public fields. This component never fails: capability and
//! parse failures degrade to an empty list, invalid or unresolved
//! candidates are dropped one by one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tacforge_common::genai::{parse_json_array, Candidate, TextGenerator};
use tacforge_common::store::KnowledgeStore;
use tacforge_common::{metrics, TaskDetails};
use tracing::instrument;

/// A resolved occurrence of a known task name in analyzed text.
///
/// Offsets are 0-based character indices into the analyzed text, half-open:
/// `start_index` is the first character of the mention and `end_index` is
/// one past the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub task_name: String,
    pub start_index: usize,
    pub end_index: usize,
    pub details: TaskDetails,
}

/// A structurally valid mention candidate, prior to store resolution
#[derive(Debug, Clone, PartialEq)]
struct MentionCandidate {
    task_name: String,
    start_index: usize,
    end_index: usize,
}

pub struct RecognitionService {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn KnowledgeStore>,
    closed_vocabulary: bool,
}

impl RecognitionService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn KnowledgeStore>,
        closed_vocabulary: bool,
    ) -> Self {
        Self {
            generator,
            store,
            closed_vocabulary,
        }
    }

    /// Recognize task mentions in `text`. Always returns a (possibly
    /// empty) list, in the order the capability reported the candidates.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn recognize(&self, text: &str) -> Vec<Mention> {
        let start = Instant::now();

        let prompt = if self.closed_vocabulary {
            let known = match self.store.list_names().await {
                Ok(names) => names,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to list known task names, using empty vocabulary");
                    Vec::new()
                }
            };
            closed_prompt(text, &known)
        } else {
            open_prompt(text)
        };

        let reply = match self.generator.generate(&prompt).await {
            Ok(reply) => reply,
            Err(kind) => {
                tracing::warn!(error = %kind, "Recognition call failed, returning no mentions");
                metrics::record_recognition(start.elapsed().as_secs_f64(), 0, 0);
                return Vec::new();
            }
        };

        let items = match parse_json_array(&reply) {
            Ok(items) => items,
            Err(kind) => {
                tracing::warn!(error = %kind, "Unparseable recognition reply, returning no mentions");
                metrics::record_recognition(start.elapsed().as_secs_f64(), 0, 0);
                return Vec::new();
            }
        };

        let mut mentions = Vec::new();
        let mut dropped = 0usize;

        for item in &items {
            let candidate = match validate_mention(item) {
                Candidate::Valid(candidate) => candidate,
                Candidate::Rejected { reason } => {
                    tracing::warn!(%reason, "Dropping mention candidate");
                    dropped += 1;
                    continue;
                }
            };

            match self.store.get_by_name(&candidate.task_name).await {
                Ok(Some(record)) => {
                    tracing::debug!(task = %candidate.task_name, "Resolved mention against knowledge base");
                    mentions.push(Mention {
                        task_name: candidate.task_name,
                        start_index: candidate.start_index,
                        end_index: candidate.end_index,
                        details: record.into(),
                    });
                }
                Ok(None) => {
                    tracing::info!(
                        task = %candidate.task_name,
                        "Recognized name not in knowledge base, ignoring"
                    );
                    dropped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        task = %candidate.task_name,
                        error = %e,
                        "Knowledge base lookup failed, dropping mention"
                    );
                    dropped += 1;
                }
            }
        }

        metrics::record_recognition(start.elapsed().as_secs_f64(), mentions.len(), dropped);
        mentions
    }
}

/// Validate one raw reply element into a mention candidate. The name is
/// upper-cased here; empty names after normalization are rejected.
fn validate_mention(value: &serde_json::Value) -> Candidate<MentionCandidate> {
    let Some(object) = value.as_object() else {
        return Candidate::rejected("candidate is not an object");
    };

    let Some(task_name) = object.get("task_name").and_then(|v| v.as_str()) else {
        return Candidate::rejected("missing task_name");
    };

    let Some(start_index) = object.get("start_index").and_then(|v| v.as_u64()) else {
        return Candidate::rejected("missing or non-integer start_index");
    };

    let Some(end_index) = object.get("end_index").and_then(|v| v.as_u64()) else {
        return Candidate::rejected("missing or non-integer end_index");
    };

    let normalized = task_name.trim().to_uppercase();
    if normalized.is_empty() {
        return Candidate::rejected("empty task_name after normalization");
    }

    Candidate::Valid(MentionCandidate {
        task_name: normalized,
        start_index: start_index as usize,
        end_index: end_index as usize,
    })
}

/// Open-vocabulary prompt: recognize anything task-like; results are
/// filtered against the store afterwards.
fn open_prompt(text: &str) -> String {
    format!(
        r#"You are an expert military doctrine analyst specializing in Named Entity Recognition (NER).
Your task is to identify occurrences of specific military tactical tasks (e.g., "SEIZE", "OCCUPY", "ATTACK BY FIRE", "CONDUCT RECONNAISSANCE") within the provided text.
These tasks are typically verbs or short verb phrases describing a specific military action.

For each identified tactical task, provide the exact task name and the starting and ending character index of the mention in the input text.

Input Text:
---
{text}
---

Output the results as a JSON list of objects. Each object should represent a single recognized task instance and have the following keys:
- "task_name": The recognized tactical task name.
- "start_index": The starting character index of the mention.
- "end_index": The ending character index of the mention.

If no tactical tasks are found in the text, return an empty JSON list: []."#
    )
}

/// Closed-vocabulary prompt: constrain recognition to the names currently
/// in the knowledge store.
fn closed_prompt(text: &str, known: &[String]) -> String {
    let vocabulary = known.join(", ");
    format!(
        r#"You are an expert military doctrine analyst specializing in Named Entity Recognition (NER).
Your task is to identify occurrences of the following tactical tasks within the provided text, and no others:
{vocabulary}

Input Text:
---
{text}
---

Output the results as a JSON list of objects. Each object should represent a single recognized task instance and have the following keys:
- "task_name": The recognized tactical task name, exactly as listed above.
- "start_index": The starting character index of the mention.
- "end_index": The ending character index of the mention.

If none of the listed tasks occur in the text, return an empty JSON list: []."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tacforge_common::db::NewTaskRecord;
    use tacforge_common::genai::MockGenerator;
    use tacforge_common::store::MemoryStore;

    async fn seeded_store(names: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for name in names {
            let record = NewTaskRecord {
                name: name.to_string(),
                definition: format!("To {} a designated objective.", name.to_lowercase()),
                page_number: "B-11".to_string(),
                source_reference: "FM 3-90".to_string(),
                related_figures: vec![],
                image_path: None,
                embedding: vec![0.0; 4],
            };
            store.upsert(&record).await.unwrap();
        }
        store
    }

    fn service(reply: &str, store: Arc<MemoryStore>) -> RecognitionService {
        RecognitionService::new(Arc::new(MockGenerator::new(reply)), store, false)
    }

    #[tokio::test]
    async fn test_resolves_known_mention_with_details() {
        let store = seeded_store(&["SEIZE"]).await;
        let svc = service(
            r#"[{"task_name":"SEIZE","start_index":18,"end_index":23}]"#,
            store,
        );

        let mentions = svc.recognize("The platoon will SEIZE the bridge.").await;

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].task_name, "SEIZE");
        assert_eq!(mentions[0].start_index, 18);
        assert_eq!(mentions[0].end_index, 23);
        assert!(mentions[0].details.definition.contains("seize"));
    }

    #[tokio::test]
    async fn test_unresolved_mention_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(
            r#"[{"task_name":"SEIZE","start_index":18,"end_index":23}]"#,
            store,
        );

        let mentions = svc.recognize("The platoon will SEIZE the bridge.").await;
        assert!(mentions.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_reply_degrades_to_empty_list() {
        let store = seeded_store(&["SEIZE"]).await;
        let svc = service("not json", store);

        let mentions = svc.recognize("The platoon will SEIZE the bridge.").await;
        assert!(mentions.is_empty());
    }

    #[tokio::test]
    async fn test_lowercase_names_are_normalized_before_lookup() {
        let store = seeded_store(&["SEIZE"]).await;
        let svc = service(
            r#"[{"task_name":"seize","start_index":18,"end_index":23}]"#,
            store,
        );

        let mentions = svc.recognize("The platoon will seize the bridge.").await;
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].task_name, "SEIZE");
    }

    #[tokio::test]
    async fn test_output_preserves_candidate_order() {
        let store = seeded_store(&["SEIZE", "OCCUPY"]).await;
        let svc = service(
            r#"[
                {"task_name":"OCCUPY","start_index":44,"end_index":50},
                {"task_name":"SEIZE","start_index":17,"end_index":22}
            ]"#,
            store,
        );

        let mentions = svc
            .recognize("The platoon will SEIZE the bridge and OCCUPY Hill 405.")
            .await;
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].task_name, "OCCUPY");
        assert_eq!(mentions[1].task_name, "SEIZE");
    }

    #[tokio::test]
    async fn test_invalid_candidates_are_dropped_individually() {
        let store = seeded_store(&["SEIZE"]).await;
        let svc = service(
            r#"[
                {"start_index":0,"end_index":5},
                {"task_name":"SEIZE","start_index":"x","end_index":23},
                {"task_name":"  ","start_index":0,"end_index":2},
                {"task_name":"SEIZE","start_index":18,"end_index":23}
            ]"#,
            store,
        );

        let mentions = svc.recognize("The platoon will SEIZE the bridge.").await;
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].start_index, 18);
    }

    #[test]
    fn test_validate_mention_rejects_missing_fields() {
        assert!(matches!(
            validate_mention(&json!({"task_name": "SEIZE"})),
            Candidate::Rejected { .. }
        ));
        assert!(matches!(
            validate_mention(&json!("SEIZE")),
            Candidate::Rejected { .. }
        ));
        assert!(matches!(
            validate_mention(&json!({"task_name": "SEIZE", "start_index": -1, "end_index": 4})),
            Candidate::Rejected { .. }
        ));
    }

    #[test]
    fn test_closed_prompt_lists_known_names() {
        let prompt = closed_prompt("some text", &["SEIZE".into(), "OCCUPY".into()]);
        assert!(prompt.contains("SEIZE, OCCUPY"));
        assert!(prompt.contains("some text"));
    }
}
