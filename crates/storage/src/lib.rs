//! Storage Layer
//!
//! The logging collaborator the pipeline writes to (`DetectionLog`) and an
//! in-memory repository with retention limits and read queries.

mod repository;

pub use repository::{
    AlertRecord, ClassStatistics, DetectionLog, DetectionRecord, Repository, RetentionConfig, MAX_ALERT_QUERY,
    MAX_DETECTION_QUERY,
};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Record not found")]
    NotFound,
}
