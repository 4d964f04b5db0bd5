//! Ingestion error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {path}: {message}")]
    PdfParseError { path: String, message: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tacforge_common::errors::AppError> for IngestionError {
    fn from(e: tacforge_common::errors::AppError) -> Self {
        IngestionError::DatabaseError(e.to_string())
    }
}
