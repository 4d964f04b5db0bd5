//! Repository for database operations
//!
//! Task-record access is raw SQL throughout: the `embedding` column is a
//! pgvector type, bound as a `[..]::vector` literal on writes and read back
//! through an `embedding::text` cast.

use crate::config::DatabaseConfig;
use crate::db::models::tactical_task::{encode_vector, NearestTaskRow, TaskRow};
use crate::db::models::{opord, NewTaskRecord, Opord, OpordEntity, TaskRecord};
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    FromQueryResult, Set, Statement,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct Repository {
    db: DatabaseConnection,
}

impl Repository {
    /// Connect to the database described by the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut opt = sea_orm::ConnectOptions::new(&config.url);
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        let db = sea_orm::Database::connect(opt)
            .await
            .map_err(|e| AppError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self { db })
    }

    /// Wrap an existing connection
    pub fn with_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.db
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnectionError(e.to_string()))?;
        Ok(())
    }

    // ========================================================================
    // Tactical task operations
    // ========================================================================

    /// Insert a task record, or merge-update every mutable field of the
    /// existing record with the same name. Idempotent for identical payloads.
    pub async fn upsert_task(&self, task: &NewTaskRecord) -> Result<()> {
        let figures_json = serde_json::to_string(&task.related_figures)
            .map_err(|e| AppError::SerializationError(e.to_string()))?;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO tactical_tasks
                (name, definition, page_number, source_reference, related_figures, image_path, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7::vector)
            ON CONFLICT (name) DO UPDATE SET
                definition = EXCLUDED.definition,
                page_number = EXCLUDED.page_number,
                source_reference = EXCLUDED.source_reference,
                related_figures = EXCLUDED.related_figures,
                image_path = EXCLUDED.image_path,
                embedding = EXCLUDED.embedding
            "#,
            vec![
                task.name.clone().into(),
                task.definition.clone().into(),
                task.page_number.clone().into(),
                task.source_reference.clone().into(),
                figures_json.into(),
                task.image_path.clone().into(),
                encode_vector(&task.embedding).into(),
            ],
        );

        self.db.execute(stmt).await?;
        Ok(())
    }

    /// Exact lookup on the (upper-cased) name key
    pub async fn find_task_by_name(&self, name: &str) -> Result<Option<TaskRecord>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT id, name, definition, page_number, source_reference,
                   related_figures, image_path, embedding::text AS embedding
            FROM tactical_tasks
            WHERE name = $1
            "#,
            vec![name.into()],
        );

        let row = TaskRow::find_by_statement(stmt).one(&self.db).await?;
        Ok(row.map(TaskRecord::from))
    }

    /// All task names, in insertion order
    pub async fn list_task_names(&self) -> Result<Vec<String>> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT name FROM tactical_tasks ORDER BY id ASC",
        );

        let rows = self.db.query_all(stmt).await?;
        let names = rows
            .into_iter()
            .map(|row| row.try_get_by_index::<String>(0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sea_orm::DbErr::from)?;
        Ok(names)
    }

    /// Nearest stored tasks by ascending cosine distance to the query
    /// embedding; ties break on insertion order. Rows without an
    /// embedding are excluded.
    pub async fn nearest_tasks(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(TaskRecord, f64)>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT id, name, definition, page_number, source_reference,
                   related_figures, image_path, embedding::text AS embedding,
                   embedding <=> $1::vector AS distance
            FROM tactical_tasks
            WHERE embedding IS NOT NULL
            ORDER BY distance ASC, id ASC
            LIMIT $2
            "#,
            vec![encode_vector(embedding).into(), (limit as i64).into()],
        );

        let rows = NearestTaskRow::find_by_statement(stmt).all(&self.db).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ========================================================================
    // OPORD operations
    // ========================================================================

    pub async fn create_opord(&self, title: String, content: String) -> Result<Opord> {
        let now = chrono::Utc::now();
        let opord = opord::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title),
            content: Set(content),
            analysis_results: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        opord.insert(&self.db).await.map_err(Into::into)
    }

    pub async fn find_opord(&self, id: Uuid) -> Result<Option<Opord>> {
        OpordEntity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Replace an OPORD's content; returns None when the id is unknown
    pub async fn update_opord_content(&self, id: Uuid, content: String) -> Result<Option<Opord>> {
        let Some(existing) = OpordEntity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut active: opord::ActiveModel = existing.into();
        active.content = Set(content);
        active.updated_at = Set(chrono::Utc::now().into());

        let updated = active.update(&self.db).await?;
        Ok(Some(updated))
    }

    /// Persist the annotation blob produced by a background analysis run
    pub async fn update_opord_analysis(&self, id: Uuid, analysis_json: String) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE opords SET analysis_results = $1, updated_at = NOW() WHERE id = $2",
            vec![analysis_json.into(), id.into()],
        );

        self.db.execute(stmt).await?;
        Ok(())
    }
}
