//! Persistence layer for shared enrolments
//!
//! Provides:
//! - Enrolment instances and user enrolments
//! - Paged scan of expired user enrolments
//! - Audit log (append-only)
//! - Scheduled task state

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use shared_enrol_api::UnknownCode;
use shared_enrol_util::EnrolError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<UnknownCode> for StoreError {
    fn from(e: UnknownCode) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for EnrolError {
    fn from(e: StoreError) -> Self {
        EnrolError::StoreError(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
