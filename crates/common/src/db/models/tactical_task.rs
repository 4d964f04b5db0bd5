//! Tactical task record types
//!
//! The `tactical_tasks` table carries a pgvector `embedding` column and a
//! JSON-encoded figure list, both of which SeaORM entities do not map
//! natively. All reads and writes therefore go through raw SQL in the
//! repository; these types are the decoded row shapes.

use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

/// A canonical named task and its definition as stored in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i32,
    /// Unique upper-cased lookup key
    pub name: String,
    pub definition: String,
    /// Document-internal page label, e.g. "B-11"
    pub page_number: String,
    /// Source document identifier, e.g. "FM 3-90"
    pub source_reference: String,
    pub related_figures: Vec<String>,
    pub image_path: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Public fields of a task record, snapshotted onto recognition results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub id: i32,
    pub name: String,
    pub definition: String,
    pub page_number: String,
    pub source_reference: String,
    pub related_figures: Vec<String>,
    pub image_path: Option<String>,
}

impl From<TaskRecord> for TaskDetails {
    fn from(record: TaskRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            definition: record.definition,
            page_number: record.page_number,
            source_reference: record.source_reference,
            related_figures: record.related_figures,
            image_path: record.image_path,
        }
    }
}

/// Payload for inserting or merging a task record.
#[derive(Debug, Clone)]
pub struct NewTaskRecord {
    pub name: String,
    pub definition: String,
    pub page_number: String,
    pub source_reference: String,
    pub related_figures: Vec<String>,
    pub image_path: Option<String>,
    pub embedding: Vec<f32>,
}

/// Raw row as selected from Postgres, with the vector cast to text
/// (`embedding::text`) and the figure list still JSON-encoded.
#[derive(Debug, FromQueryResult)]
pub(crate) struct TaskRow {
    pub id: i32,
    pub name: String,
    pub definition: String,
    pub page_number: String,
    pub source_reference: String,
    pub related_figures: String,
    pub image_path: Option<String>,
    pub embedding: Option<String>,
}

impl From<TaskRow> for TaskRecord {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            definition: row.definition,
            page_number: row.page_number,
            source_reference: row.source_reference,
            related_figures: serde_json::from_str(&row.related_figures).unwrap_or_default(),
            image_path: row.image_path,
            embedding: row.embedding.as_deref().map(parse_vector_text),
        }
    }
}

/// Raw nearest-neighbor row including the computed cosine distance.
#[derive(Debug, FromQueryResult)]
pub(crate) struct NearestTaskRow {
    pub id: i32,
    pub name: String,
    pub definition: String,
    pub page_number: String,
    pub source_reference: String,
    pub related_figures: String,
    pub image_path: Option<String>,
    pub embedding: Option<String>,
    pub distance: f64,
}

impl From<NearestTaskRow> for (TaskRecord, f64) {
    fn from(row: NearestTaskRow) -> Self {
        let distance = row.distance;
        let record = TaskRecord {
            id: row.id,
            name: row.name,
            definition: row.definition,
            page_number: row.page_number,
            source_reference: row.source_reference,
            related_figures: serde_json::from_str(&row.related_figures).unwrap_or_default(),
            image_path: row.image_path,
            embedding: row.embedding.as_deref().map(parse_vector_text),
        };
        (record, distance)
    }
}

/// Encode a vector as a pgvector literal, e.g. "[0.1,0.2,0.3]"
pub(crate) fn encode_vector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Decode a pgvector text representation back into a vector
pub(crate) fn parse_vector_text(text: &str) -> Vec<f32> {
    text.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|part| part.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_roundtrip() {
        let original = vec![0.25, -1.5, 3.0];
        let encoded = encode_vector(&original);
        assert_eq!(encoded, "[0.25,-1.5,3]");
        assert_eq!(parse_vector_text(&encoded), original);
    }

    #[test]
    fn test_parse_vector_text_tolerates_whitespace() {
        assert_eq!(parse_vector_text("[1.0, 2.0, 3.0]"), vec![1.0, 2.0, 3.0]);
        assert!(parse_vector_text("[]").is_empty());
    }

    #[test]
    fn test_row_decoding_defaults_bad_figures_to_empty() {
        let row = TaskRow {
            id: 1,
            name: "SEIZE".into(),
            definition: "To clear a designated area...".into(),
            page_number: "B-11".into(),
            source_reference: "FM 3-90".into(),
            related_figures: "not json".into(),
            image_path: None,
            embedding: None,
        };
        let record = TaskRecord::from(row);
        assert!(record.related_figures.is_empty());
        assert!(record.embedding.is_none());
    }
}
