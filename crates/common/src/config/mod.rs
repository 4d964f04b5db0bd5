//! Configuration management for TacForge services
//!
//! Defaults are set in code and can be overridden by environment
//! variables with an `APP` prefix and `__` separator, e.g.
//! `APP_SERVER__PORT=8081` or `APP_GENAI__API_KEY=...`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub genai: GenAiConfig,
    pub images: ImagesConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Generative AI capability configuration (text generation + embeddings).
///
/// An `api_key` of `"mock"` selects the in-process mock capabilities;
/// an empty `api_key` leaves the text capability unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct GenAiConfig {
    pub api_url: String,
    pub api_key: String,
    pub text_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    /// Local directory where extracted figure images are written
    pub output_dir: String,
    /// Public-facing path prefix recorded on task records
    pub public_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// When true, the recognition prompt is constrained to the task
    /// names currently in the knowledge store; when false the prompt is
    /// open-vocabulary and results are filtered against the store.
    pub closed_vocabulary: bool,
}

impl AppConfig {
    /// Load configuration from defaults and environment
    pub fn build() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.rust_log", "info,tacforge=debug")?
            .set_default("database.url", "postgres://localhost/tacforge")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.connect_timeout_secs", 10)?
            .set_default("database.idle_timeout_secs", 300)?
            .set_default(
                "genai.api_url",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("genai.api_key", "mock")?
            .set_default("genai.text_model", crate::DEFAULT_TEXT_MODEL)?
            .set_default("genai.embedding_model", crate::DEFAULT_EMBEDDING_MODEL)?
            .set_default("genai.embedding_dim", crate::EMBEDDING_DIM as i64)?
            .set_default("genai.timeout_secs", 30)?
            .set_default("images.output_dir", "public/task_images")?
            .set_default("images.public_prefix", "public/task_images")?
            .set_default("analysis.closed_vocabulary", false)?
            .add_source(Environment::default().separator("__").prefix("APP"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::build().expect("default config should build");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.genai.embedding_dim, crate::EMBEDDING_DIM);
        assert!(!config.analysis.closed_vocabulary);
    }
}
