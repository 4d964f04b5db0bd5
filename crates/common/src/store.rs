//! Knowledge-store abstraction
//!
//! One trait over the set of uniquely-named task records, implemented by
//! the Postgres `Repository` for production and by `MemoryStore` for tests
//! and mock deployments. Names are upper-cased by callers before storage
//! and lookup; `get_by_name` matches exactly.

use crate::db::{NewTaskRecord, Repository, TaskRecord};
use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Mutex;

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert a record, or merge-update all mutable fields of the record
    /// with the same name. Idempotent for identical payloads.
    async fn upsert(&self, task: &NewTaskRecord) -> Result<()>;

    /// Exact, case-sensitive lookup on the normalized name key
    async fn get_by_name(&self, name: &str) -> Result<Option<TaskRecord>>;

    /// All known task names, in insertion order
    async fn list_names(&self) -> Result<Vec<String>>;

    /// At most `k` stored records ranked by ascending cosine distance to
    /// the query embedding; ties break on insertion order
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(TaskRecord, f64)>>;
}

#[async_trait]
impl KnowledgeStore for Repository {
    async fn upsert(&self, task: &NewTaskRecord) -> Result<()> {
        self.upsert_task(task).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TaskRecord>> {
        self.find_task_by_name(name).await
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        self.list_task_names().await
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(TaskRecord, f64)>> {
        self.nearest_tasks(embedding, k).await
    }
}

/// In-memory knowledge store preserving insertion order
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<TaskRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().expect("store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine distance matching pgvector's `<=>` operator; zero-magnitude
/// vectors are treated as maximally distant.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn upsert(&self, task: &NewTaskRecord) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("store poisoned");

        if let Some(existing) = tasks.iter_mut().find(|t| t.name == task.name) {
            existing.definition = task.definition.clone();
            existing.page_number = task.page_number.clone();
            existing.source_reference = task.source_reference.clone();
            existing.related_figures = task.related_figures.clone();
            existing.image_path = task.image_path.clone();
            existing.embedding = Some(task.embedding.clone());
        } else {
            let id = tasks.len() as i32 + 1;
            tasks.push(TaskRecord {
                id,
                name: task.name.clone(),
                definition: task.definition.clone(),
                page_number: task.page_number.clone(),
                source_reference: task.source_reference.clone(),
                related_figures: task.related_figures.clone(),
                image_path: task.image_path.clone(),
                embedding: Some(task.embedding.clone()),
            });
        }
        Ok(())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TaskRecord>> {
        let tasks = self.tasks.lock().expect("store poisoned");
        Ok(tasks.iter().find(|t| t.name == name).cloned())
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let tasks = self.tasks.lock().expect("store poisoned");
        Ok(tasks.iter().map(|t| t.name.clone()).collect())
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<(TaskRecord, f64)>> {
        let tasks = self.tasks.lock().expect("store poisoned");

        let mut scored: Vec<(TaskRecord, f64)> = tasks
            .iter()
            .filter_map(|t| {
                let stored = t.embedding.as_ref()?;
                Some((t.clone(), cosine_distance(embedding, stored)))
            })
            .collect();

        // Stable sort keeps insertion order for equal distances
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, embedding: Vec<f32>) -> NewTaskRecord {
        NewTaskRecord {
            name: name.to_string(),
            definition: format!("Definition of {}", name),
            page_number: "B-11".to_string(),
            source_reference: "FM 3-90".to_string(),
            related_figures: vec![],
            image_path: None,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let record = task("SEIZE", vec![1.0, 0.0]);

        store.upsert(&record).await.unwrap();
        let first = store.get_by_name("SEIZE").await.unwrap().unwrap();

        store.upsert(&record).await.unwrap();
        let second = store.get_by_name("SEIZE").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict() {
        let store = MemoryStore::new();
        store.upsert(&task("SEIZE", vec![1.0, 0.0])).await.unwrap();

        let mut updated = task("SEIZE", vec![0.0, 1.0]);
        updated.definition = "To clear a designated area and obtain control of it.".to_string();
        updated.page_number = "B-12".to_string();
        store.upsert(&updated).await.unwrap();

        let record = store.get_by_name("SEIZE").await.unwrap().unwrap();
        assert_eq!(record.page_number, "B-12");
        assert_eq!(record.embedding, Some(vec![0.0, 1.0]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_is_exact_on_normalized_key() {
        let store = MemoryStore::new();
        store.upsert(&task("SEIZE", vec![1.0])).await.unwrap();

        assert!(store.get_by_name("SEIZE").await.unwrap().is_some());
        assert!(store.get_by_name("seize").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_names_in_insertion_order() {
        let store = MemoryStore::new();
        store.upsert(&task("SEIZE", vec![1.0])).await.unwrap();
        store.upsert(&task("OCCUPY", vec![1.0])).await.unwrap();
        store.upsert(&task("ATTACK BY FIRE", vec![1.0])).await.unwrap();

        assert_eq!(
            store.list_names().await.unwrap(),
            vec!["SEIZE", "OCCUPY", "ATTACK BY FIRE"]
        );
    }

    #[tokio::test]
    async fn test_nearest_ranks_by_distance_and_caps_at_k() {
        let store = MemoryStore::new();
        store.upsert(&task("FAR", vec![0.0, 1.0])).await.unwrap();
        store.upsert(&task("NEAR", vec![1.0, 0.1])).await.unwrap();
        store.upsert(&task("EXACT", vec![1.0, 0.0])).await.unwrap();

        let results = store.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.name, "EXACT");
        assert!(results[0].1 < results[1].1);
        assert_eq!(results[1].0.name, "NEAR");
    }

    #[tokio::test]
    async fn test_nearest_ties_break_on_insertion_order() {
        let store = MemoryStore::new();
        store.upsert(&task("FIRST", vec![1.0, 0.0])).await.unwrap();
        store.upsert(&task("SECOND", vec![1.0, 0.0])).await.unwrap();

        let results = store.nearest(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results[0].0.name, "FIRST");
        assert_eq!(results[1].0.name, "SECOND");
    }

    #[tokio::test]
    async fn test_nearest_with_fewer_records_than_k() {
        let store = MemoryStore::new();
        store.upsert(&task("SEIZE", vec![1.0])).await.unwrap();

        let results = store.nearest(&[1.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_cosine_distance_of_zero_vector_is_maximal() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
