//! Error types for enrolment operations

use thiserror::Error;

use crate::CourseId;

/// Core error type for enrolment operations
#[derive(Debug, Error)]
pub enum EnrolError {
    /// Instance belongs to another method, or targets a course that cannot
    /// take enrolments (the site course)
    #[error("Invalid enrol instance: {0}")]
    InvalidInstance(String),

    #[error("Course context not found: {0}")]
    MissingContext(CourseId),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Host error: {0}")]
    HostError(String),
}

impl EnrolError {
    pub fn invalid_instance(msg: impl Into<String>) -> Self {
        Self::InvalidInstance(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::HostError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EnrolError>;
