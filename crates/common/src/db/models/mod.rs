//! Database models for TacForge
//!
//! The `opords` table is a plain SeaORM entity. The `tactical_tasks`
//! table is accessed through raw SQL because of its pgvector column;
//! its row types live in `tactical_task`.

pub mod opord;
pub mod tactical_task;

pub use opord::ActiveModel as OpordActiveModel;
pub use opord::Entity as OpordEntity;
pub use opord::Model as Opord;

pub use tactical_task::{NewTaskRecord, TaskDetails, TaskRecord};
