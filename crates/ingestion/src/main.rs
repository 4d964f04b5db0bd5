//! TacForge Ingestion
//!
//! Batch CLI that builds the tactical-task knowledge base from a
//! field-manual PDF:
//! 1. Loads the PDF and walks a physical page range
//! 2. Extracts per-page text and image assets
//! 3. Runs the extraction engine against each page
//! 4. Upserts validated tasks (with embeddings and figure images)
//!
//! Usage: ingestion <pdf-path> [start-page] [end-page]
//! Page numbers are 1-based physical pages; the range defaults to the
//! whole document.

mod errors;
mod extractor;
mod images;
mod pdf;

use crate::errors::IngestionError;
use crate::extractor::TaskExtractor;
use crate::images::ImageStore;
use std::path::PathBuf;
use std::sync::Arc;
use tacforge_common::{
    config::AppConfig,
    db::Repository,
    embeddings::{create_embedder, EmbeddingGenerator},
    genai::create_generator,
    store::KnowledgeStore,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::build()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.rust_log))
        .init();

    info!("Starting TacForge ingestion v{}", tacforge_common::VERSION);

    let args: Vec<String> = std::env::args().collect();
    let Some(pdf_path) = args.get(1).map(PathBuf::from) else {
        eprintln!("Usage: ingestion <pdf-path> [start-page] [end-page]");
        std::process::exit(1);
    };

    if !pdf_path.exists() {
        return Err(IngestionError::FileNotFound(pdf_path.display().to_string()).into());
    }

    let start_page: Option<u32> = args.get(2).and_then(|s| s.parse().ok());
    let end_page: Option<u32> = args.get(3).and_then(|s| s.parse().ok());

    // Initialize database and capabilities
    info!("Connecting to database...");
    let repo = Repository::connect(&config.database).await?;
    let store: Arc<dyn KnowledgeStore> = Arc::new(repo);

    let generator = create_generator(&config.genai);
    let embedder = EmbeddingGenerator::new(
        create_embedder(&config.genai),
        config.genai.embedding_dim,
    );

    let extractor = TaskExtractor::new(
        generator,
        embedder,
        store,
        ImageStore::new(&config.images),
        tacforge_common::DEFAULT_SOURCE_REFERENCE.to_string(),
    );

    // Walk the requested page range
    info!(path = %pdf_path.display(), "Loading PDF");
    let doc = pdf::load_document(&pdf_path)?;
    let pages = doc.get_pages();

    let first = start_page.unwrap_or(1);
    let last = end_page.unwrap_or_else(|| pages.keys().max().copied().unwrap_or(0));
    info!(first, last, total = pages.len(), "Processing page range");

    let mut pages_processed = 0usize;
    let mut tasks_stored = 0usize;

    for (number, page_id) in pages {
        if number < first || number > last {
            continue;
        }

        let unit = pdf::extract_page(&doc, number, page_id);
        if unit.text.trim().is_empty() {
            info!(page = number, "Page is empty or has no text, skipping");
            continue;
        }

        let stored = extractor.process_page(&unit).await;
        if stored == 0 {
            warn!(page = number, "No tasks stored for page");
        }

        pages_processed += 1;
        tasks_stored += stored;
    }

    if pages_processed == 0 {
        error!(first, last, "No pages with text in the requested range");
    }

    info!(pages_processed, tasks_stored, "Ingestion run complete");
    Ok(())
}
