//! TacForge Common Library
//!
//! Shared code for the TacForge services including:
//! - Database models and repository
//! - Knowledge-store abstraction with Postgres and in-memory backends
//! - Embedding and generative-text capability clients
//! - Error types and handling
//! - Configuration management
//! - In-process analysis job queue
//! - Metrics helpers

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod genai;
pub mod metrics;
pub mod queue;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{Repository, TaskDetails, TaskRecord};
pub use embeddings::{EmbedTask, Embedder, EmbeddingGenerator};
pub use errors::{AppError, Result};
pub use genai::{Candidate, TextGenerator};
pub use store::KnowledgeStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default generative text model
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";

/// Fixed embedding dimensionality; stored and query vectors are
/// padded or truncated to this length
pub const EMBEDDING_DIM: usize = 1536;

/// Default source document identifier stamped onto extracted tasks
pub const DEFAULT_SOURCE_REFERENCE: &str = "FM 3-90";
