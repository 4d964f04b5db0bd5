//! Database layer for TacForge
//!
//! Provides:
//! - SeaORM entity models
//! - Repository for all data access, with raw-SQL vector operations

pub mod models;
mod repository;

pub use models::{NewTaskRecord, Opord, TaskDetails, TaskRecord};
pub use repository::Repository;
